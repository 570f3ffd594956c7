//! Utilities for the integration tests.

pub mod exchanges;
pub mod logging;
pub mod metrics;
pub mod test_tools;
