//! Bound how long an exchange may take.

use crate::{Exchange, ExchangeRequest, ExchangeResponse, Status};
use async_trait::async_trait;
use std::time::Duration;

/// Answers with a timeout status if the wrapped exchange takes longer than the
/// host budget.
///
/// When the budget runs out the inner future is dropped, which cancels any
/// I/O it has in flight.
pub struct HostTimeout {
    /// The time to wait before giving up.
    budget: Duration,

    /// The exchange to time.
    inner: Box<dyn Exchange>,
}

impl HostTimeout {
    /// Wrap `inner` with a time budget.
    pub fn new(budget: Duration, inner: Box<dyn Exchange>) -> Self {
        Self { budget, inner }
    }

    /// Construct a new, boxed timeout intermediary.
    #[must_use]
    pub fn new_boxed(budget: Duration, inner: Box<dyn Exchange>) -> Box<Self> {
        Box::new(Self::new(budget, inner))
    }
}

#[async_trait]
impl Exchange for HostTimeout {
    fn name(&self) -> String {
        format!("timeout({})", self.inner.name())
    }

    async fn exchange(&self, request: ExchangeRequest) -> (ExchangeResponse, Status) {
        tokio::time::timeout(self.budget, self.inner.exchange(request))
            .await
            .unwrap_or_else(|_elapsed| {
                tracing::warn!(
                    r#type = "exchange.timeout",
                    budget_ms = self.budget.as_millis() as u64,
                    inner = %self.inner.name(),
                    "Exchange exceeded its time budget"
                );
                (ExchangeResponse::empty(), Status::deadline_exceeded())
            })
    }
}
