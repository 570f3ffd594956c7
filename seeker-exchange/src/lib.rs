#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! The exchange pipeline for [Seeker](../seeker/index.html).
//!
//! An [`Exchange`] turns one request into exactly one response and one
//! [`Status`]. Intermediaries are exchanges that own another exchange and add
//! behavior around it. The [`Host`] wraps every registered exchange in the
//! same chain and stores the result in an [`AuthorityRegistry`], which the
//! web dispatcher reads from.
//!
//! ```text
//! AccessLog ─► HostTimeout ─► AuthGate ─► exchange
//! ```

pub mod access_log;
mod domain;
mod host;
pub mod intermediary;
pub mod metadata;
mod registry;
mod startup;
mod status;

use async_trait::async_trait;
use std::sync::Arc;

pub use crate::access_log::{AccessLogRecord, AccessLogSink, AccessLogger};
pub use crate::domain::{ExchangeRequest, ExchangeResponse, X_REQUEST_ID};
pub use crate::host::{Host, HostConfig, Registration};
pub use crate::registry::{AuthorityRegistry, RegistrationPolicy, RegistryError};
pub use crate::startup::{startup, Resource, StartupError};
pub use crate::status::{Failure, Status};

/// A unary request-to-response operation.
///
/// Failures are never reported out of band. Every failure mode is a non-OK
/// [`Status`] paired with a best-effort response, which may be empty.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// An operator friendly name for this exchange, including any exchanges it
    /// wraps.
    fn name(&self) -> String;

    /// Answer `request`.
    async fn exchange(&self, request: ExchangeRequest) -> (ExchangeResponse, Status);
}

#[async_trait]
impl<T: Exchange + ?Sized> Exchange for Arc<T> {
    fn name(&self) -> String {
        (**self).name()
    }

    async fn exchange(&self, request: ExchangeRequest) -> (ExchangeResponse, Status) {
        (**self).exchange(request).await
    }
}

#[async_trait]
impl<T: Exchange + ?Sized> Exchange for Box<T> {
    fn name(&self) -> String {
        (**self).name()
    }

    async fn exchange(&self, request: ExchangeRequest) -> (ExchangeResponse, Status) {
        (**self).exchange(request).await
    }
}
