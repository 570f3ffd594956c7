//! The mapping from authority names to registered exchanges.

use crate::{access_log::INGRESS_TRAFFIC, metadata::Controller, Exchange};
use std::{collections::HashMap, fmt, sync::Arc};
use thiserror::Error;

/// The access log policy an authority was registered with.
///
/// Records for requests that never complete inside the registered chain,
/// such as a panicking exchange, are written with this policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationPolicy {
    /// The traffic class label.
    pub traffic: String,
    /// The routing name that replaces the dispatcher's rule name, if any.
    pub route: Option<String>,
    /// The controller policy in front of the exchange.
    pub controller: Controller,
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        Self {
            traffic: INGRESS_TRAFFIC.to_string(),
            route: None,
            controller: Controller::default(),
        }
    }
}

/// One registered authority.
struct Entry {
    /// The wrapped exchange.
    exchange: Arc<dyn Exchange>,
    /// What it was registered with.
    policy: RegistrationPolicy,
}

/// Registered exchanges, keyed by authority name.
///
/// The registry is filled during startup and then only read. Registering
/// the same authority twice is an error: an existing registration is never
/// replaced.
#[derive(Default)]
pub struct AuthorityRegistry {
    /// The registered exchanges.
    entries: HashMap<String, Entry>,
}

/// Errors that can occur while registering authorities.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The authority already has an exchange.
    #[error("authority {0:?} is already registered")]
    Duplicate(String),

    /// The authority name cannot be used.
    #[error("invalid authority name {0:?}")]
    InvalidName(String),

    /// Configuration refers to an authority that was never registered.
    #[error("authority {0:?} is referenced but not registered")]
    Unknown(String),
}

impl AuthorityRegistry {
    /// Register `exchange` under `authority` with the default policy.
    ///
    /// # Errors
    /// If `authority` is empty, contains a `/`, or is already registered.
    pub fn register(
        &mut self,
        authority: impl Into<String>,
        exchange: Box<dyn Exchange>,
    ) -> Result<(), RegistryError> {
        self.register_with_policy(authority, exchange, RegistrationPolicy::default())
    }

    /// Register `exchange` under `authority`, remembering `policy`.
    ///
    /// # Errors
    /// If `authority` is empty, contains a `/`, or is already registered.
    pub fn register_with_policy(
        &mut self,
        authority: impl Into<String>,
        exchange: Box<dyn Exchange>,
        policy: RegistrationPolicy,
    ) -> Result<(), RegistryError> {
        let authority = authority.into();
        if authority.is_empty() || authority.contains('/') {
            return Err(RegistryError::InvalidName(authority));
        }
        if self.entries.contains_key(&authority) {
            return Err(RegistryError::Duplicate(authority));
        }

        tracing::debug!(
            r#type = "exchange.registry.registered",
            %authority,
            exchange = %exchange.name(),
            "Registered authority"
        );
        let entry = Entry {
            exchange: Arc::from(exchange),
            policy,
        };
        self.entries.insert(authority, entry);
        Ok(())
    }

    /// Look up the exchange registered under `authority`.
    pub fn resolve(&self, authority: &str) -> Option<Arc<dyn Exchange>> {
        self.entries
            .get(authority)
            .map(|entry| entry.exchange.clone())
    }

    /// The policy `authority` was registered with.
    pub fn policy(&self, authority: &str) -> Option<&RegistrationPolicy> {
        self.entries.get(authority).map(|entry| &entry.policy)
    }

    /// Whether `authority` is registered.
    pub fn contains(&self, authority: &str) -> bool {
        self.entries.contains_key(authority)
    }

    /// The registered authority names, sorted.
    pub fn authorities(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for AuthorityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v.exchange.name())))
            .finish()
    }
}
