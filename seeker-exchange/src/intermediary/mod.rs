//! Exchanges that wrap another exchange.
//!
//! Every intermediary invokes its inner exchange at most once, and returns the
//! inner status unchanged unless it short-circuits before the call. None of
//! them turn a failure into a success.

mod access_log;
mod auth_gate;
mod timeout;

pub use self::access_log::AccessLog;
pub use self::auth_gate::{AllowAll, AuthCheck, AuthGate};
pub use self::timeout::HostTimeout;

#[cfg(test)]
pub(crate) mod testing {
    //! Fake exchanges for tests.

    use crate::{Exchange, ExchangeRequest, ExchangeResponse, Status};
    use async_trait::async_trait;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    /// Answers every request with a fixed response and status, after an
    /// optional delay, and counts how many times it was called.
    #[derive(Clone)]
    pub(crate) struct CountingExchange {
        pub(crate) calls: Arc<AtomicUsize>,
        pub(crate) body: String,
        pub(crate) status: Status,
        pub(crate) delay: Option<Duration>,
    }

    impl CountingExchange {
        pub(crate) fn ok(body: impl Into<String>) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                body: body.into(),
                status: Status::ok(),
                delay: None,
            }
        }

        pub(crate) fn failing(status: Status) -> Self {
            Self {
                status,
                ..Self::ok("")
            }
        }

        pub(crate) fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::ok("slow")
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Exchange for CountingExchange {
        fn name(&self) -> String {
            "CountingExchange".to_string()
        }

        async fn exchange(&self, _request: ExchangeRequest) -> (ExchangeResponse, Status) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            (ExchangeResponse::new(self.body.clone()), self.status.clone())
        }
    }
}
