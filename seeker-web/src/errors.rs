//! Any errors that seeker-web might generate, and supporting implementations.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// An error that happened in a web handler or middleware.
///
/// Exchange failures are not handler errors: they are well formed responses
/// with a non-OK status. This type covers failures of the web layer itself.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// A generic error, when there is nothing more specific to say.
    #[error("Internal error")]
    Internal,
}

impl HandlerError {
    /// Get an `HandlerError` representing an `Internal` error.
    pub fn internal() -> Self {
        Self::Internal
    }
}

impl ResponseError for HandlerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}
