//! Gate an exchange behind an authentication check.

use crate::{Exchange, ExchangeRequest, ExchangeResponse, Status};
use async_trait::async_trait;
use std::sync::Arc;

/// Decides whether a request may proceed to its exchange.
///
/// A non-OK status rejects the request. The response returned with it is
/// sent to the caller as is.
#[async_trait]
pub trait AuthCheck: Send + Sync {
    /// Check `request`.
    async fn check(&self, request: &ExchangeRequest) -> (ExchangeResponse, Status);
}

/// An auth check that admits every request and inspects nothing.
///
/// This is a placeholder, not a security policy. Deployments that need
/// authentication must supply their own [`AuthCheck`].
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl AuthCheck for AllowAll {
    async fn check(&self, _request: &ExchangeRequest) -> (ExchangeResponse, Status) {
        (ExchangeResponse::empty(), Status::ok())
    }
}

/// Runs an [`AuthCheck`] before the wrapped exchange.
///
/// If the check fails, its response and status are returned and the inner
/// exchange is never called. Otherwise the check's response is discarded and
/// the inner exchange's result is returned unchanged.
pub struct AuthGate {
    /// The check to run first.
    check: Arc<dyn AuthCheck>,

    /// The exchange to protect.
    inner: Box<dyn Exchange>,
}

impl AuthGate {
    /// Wrap `inner` behind `check`.
    pub fn new(check: Arc<dyn AuthCheck>, inner: Box<dyn Exchange>) -> Self {
        Self { check, inner }
    }

    /// Construct a new, boxed auth gate.
    #[must_use]
    pub fn new_boxed(check: Arc<dyn AuthCheck>, inner: Box<dyn Exchange>) -> Box<Self> {
        Box::new(Self::new(check, inner))
    }
}

#[async_trait]
impl Exchange for AuthGate {
    fn name(&self) -> String {
        format!("auth({})", self.inner.name())
    }

    async fn exchange(&self, request: ExchangeRequest) -> (ExchangeResponse, Status) {
        let (response, status) = self.check.check(&request).await;
        if !status.is_ok() {
            tracing::debug!(
                r#type = "exchange.auth.rejected",
                %status,
                inner = %self.inner.name(),
                "Auth check rejected request"
            );
            return (response, status);
        }
        self.inner.exchange(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::{AllowAll, AuthCheck, AuthGate};
    use crate::{
        intermediary::testing::CountingExchange, Exchange, ExchangeRequest, ExchangeResponse,
        Failure, Status,
    };
    use async_trait::async_trait;
    use http::{StatusCode, Uri};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    /// Rejects everything, with a recognizable body.
    struct DenyAll;

    #[async_trait]
    impl AuthCheck for DenyAll {
        async fn check(&self, _request: &ExchangeRequest) -> (ExchangeResponse, Status) {
            (ExchangeResponse::new("denied"), Status::unauthorized())
        }
    }

    /// Approves with a response body that must never reach the caller.
    struct NoisyAllow;

    #[async_trait]
    impl AuthCheck for NoisyAllow {
        async fn check(&self, _request: &ExchangeRequest) -> (ExchangeResponse, Status) {
            (ExchangeResponse::new("auth body"), Status::ok())
        }
    }

    fn request() -> ExchangeRequest {
        ExchangeRequest::get(Uri::from_static("http://localhost/search?q=x"))
    }

    #[tokio::test]
    async fn test_rejection_short_circuits() {
        let inner = CountingExchange::ok("inner");
        let gate = AuthGate::new(Arc::new(DenyAll), Box::new(inner.clone()));

        let (response, status) = gate.exchange(request()).await;

        assert_eq!(inner.calls(), 0);
        assert_eq!(status.code(), StatusCode::UNAUTHORIZED);
        assert_eq!(status.failure(), Some(&Failure::AuthRejected));
        assert_eq!(response.body.as_ref(), b"denied");
    }

    #[tokio::test]
    async fn test_approval_returns_inner_result() {
        let inner = CountingExchange::ok("inner");
        let gate = AuthGate::new(Arc::new(NoisyAllow), Box::new(inner.clone()));

        let (response, status) = gate.exchange(request()).await;

        assert_eq!(inner.calls(), 1);
        assert_eq!(status, Status::ok());
        assert_eq!(response.body.as_ref(), b"inner");
    }

    #[tokio::test]
    async fn test_inner_failure_propagates() {
        let inner = CountingExchange::failing(Status::backend("refused"));
        let gate = AuthGate::new(Arc::new(AllowAll), Box::new(inner.clone()));

        let (_response, status) = gate.exchange(request()).await;

        assert_eq!(inner.calls(), 1);
        assert_eq!(status, Status::backend("refused"));
    }

    #[test]
    fn test_name() {
        let gate = AuthGate::new(Arc::new(AllowAll), Box::new(CountingExchange::ok("")));
        assert_eq!(gate.name(), "auth(CountingExchange)");
    }
}
