//! The outcome of an exchange.

use http::StatusCode;
use std::fmt;
use thiserror::Error;

/// The outcome of an exchange, paired with exactly one
/// [`ExchangeResponse`](crate::ExchangeResponse).
///
/// The code follows HTTP status semantics and becomes the status of the HTTP
/// response written for the request. Statuses are immutable once made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// The HTTP status code.
    code: StatusCode,

    /// Why the exchange did not succeed. `None` for successful statuses, and
    /// for failures an upstream reported without further detail.
    failure: Option<Failure>,
}

/// Why an exchange failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Failure {
    /// The auth gate rejected the request before the exchange ran.
    #[error("request rejected by the auth gate")]
    AuthRejected,

    /// The exchange did not finish within the host timeout and was cancelled.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The backend failed or answered with something unusable.
    #[error("backend failure: {0}")]
    Backend(String),

    /// The request could not be understood by the exchange.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No authority matched the request.
    #[error("no authority matched the request")]
    NoMatch,

    /// The exchange panicked.
    #[error("exchange panicked")]
    Panicked,
}

impl Status {
    /// A successful status, `200 OK`.
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// A status with the given code and no failure detail.
    pub fn new(code: StatusCode) -> Self {
        Self {
            code,
            failure: None,
        }
    }

    /// A failed status.
    pub fn failed(code: StatusCode, failure: Failure) -> Self {
        Self {
            code,
            failure: Some(failure),
        }
    }

    /// `401 Unauthorized`, from the auth gate.
    pub fn unauthorized() -> Self {
        Self::failed(StatusCode::UNAUTHORIZED, Failure::AuthRejected)
    }

    /// `504 Gateway Timeout`, from the host timeout.
    pub fn deadline_exceeded() -> Self {
        Self::failed(StatusCode::GATEWAY_TIMEOUT, Failure::DeadlineExceeded)
    }

    /// `404 Not Found`, from the dispatcher.
    pub fn no_match() -> Self {
        Self::failed(StatusCode::NOT_FOUND, Failure::NoMatch)
    }

    /// `400 Bad Request`.
    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::failed(
            StatusCode::BAD_REQUEST,
            Failure::InvalidRequest(detail.into()),
        )
    }

    /// `413 Payload Too Large`, for a request body over `limit` bytes.
    pub fn payload_too_large(limit: usize) -> Self {
        Self::failed(
            StatusCode::PAYLOAD_TOO_LARGE,
            Failure::InvalidRequest(format!("body larger than {} bytes", limit)),
        )
    }

    /// `502 Bad Gateway`.
    pub fn backend(detail: impl Into<String>) -> Self {
        Self::failed(StatusCode::BAD_GATEWAY, Failure::Backend(detail.into()))
    }

    /// `500 Internal Server Error`, for an exchange that panicked.
    pub fn panicked() -> Self {
        Self::failed(StatusCode::INTERNAL_SERVER_ERROR, Failure::Panicked)
    }

    /// The HTTP status code.
    pub fn code(&self) -> StatusCode {
        self.code
    }

    /// Whether the exchange succeeded, meaning the code is in the 2xx range.
    pub fn is_ok(&self) -> bool {
        self.code.is_success()
    }

    /// The failure detail, if any.
    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    /// Whether this status was produced by the host timeout.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self.failure, Some(Failure::DeadlineExceeded))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure {
            Some(failure) => write!(f, "{} ({})", self.code, failure),
            None => write!(f, "{}", self.code),
        }
    }
}
