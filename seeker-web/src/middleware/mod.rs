//! Middlewares specific to Seeker.

mod metrics;

pub use self::metrics::Metrics;
