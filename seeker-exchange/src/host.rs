//! Register exchanges behind the standard intermediary chain.

use crate::{
    access_log::AccessLogger,
    intermediary::{AccessLog, AllowAll, AuthCheck, AuthGate, HostTimeout},
    metadata::Controller,
    registry::{AuthorityRegistry, RegistrationPolicy, RegistryError},
    Exchange,
};
use std::{fmt, sync::Arc, time::Duration};

/// Process wide pipeline configuration, fixed before any exchange is
/// registered.
#[derive(Clone)]
pub struct HostConfig {
    /// The time budget for each exchange. `None` disables the host timeout.
    pub timeout: Option<Duration>,

    /// The check every request must pass before reaching its exchange.
    pub auth: Arc<dyn AuthCheck>,

    /// Where access log records go.
    pub logger: AccessLogger,
}

impl HostConfig {
    /// Configuration with no timeout, the placeholder auth check, and the
    /// access log on standard error.
    pub fn new() -> Self {
        Self {
            timeout: None,
            auth: Arc::new(AllowAll),
            logger: AccessLogger::stderr(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HostConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostConfig")
            .field("timeout", &self.timeout)
            .field("logger", &self.logger)
            .finish_non_exhaustive()
    }
}

/// Per-registration intermediary configuration.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    /// The traffic class label for the access log.
    pub traffic: String,

    /// A routing name attached to every access log record.
    pub route: Option<String>,

    /// The admission rate reported in the access log.
    pub rate_limit: Option<f64>,

    /// The admission burst reported in the access log.
    pub rate_burst: Option<i32>,
}

impl Registration {
    /// A registration with the given traffic label and nothing else.
    pub fn new(traffic: impl Into<String>) -> Self {
        Self {
            traffic: traffic.into(),
            ..Self::default()
        }
    }
}

/// Builds the authority registry, wrapping each exchange as
/// `AccessLog(HostTimeout(AuthGate(exchange)))`.
///
/// The access log is outermost so that its timing covers auth rejections and
/// timeouts. When the host has no timeout the `HostTimeout` layer is left
/// out.
#[derive(Debug)]
pub struct Host {
    /// Shared intermediary configuration.
    config: HostConfig,

    /// The registry being built.
    registry: AuthorityRegistry,
}

impl Host {
    /// A host with an empty registry.
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            registry: AuthorityRegistry::default(),
        }
    }

    /// The access logger exchanges are registered with.
    pub fn logger(&self) -> &AccessLogger {
        &self.config.logger
    }

    /// Wrap `exchange` in the intermediary chain and register it.
    ///
    /// # Errors
    /// If the authority name is invalid or already registered.
    pub fn register_exchange(
        &mut self,
        authority: &str,
        exchange: Box<dyn Exchange>,
        registration: Registration,
    ) -> Result<(), RegistryError> {
        if self.registry.contains(authority) {
            return Err(RegistryError::Duplicate(authority.to_string()));
        }

        let gated: Box<dyn Exchange> = AuthGate::new_boxed(self.config.auth.clone(), exchange);
        let timed: Box<dyn Exchange> = match self.config.timeout {
            Some(budget) => HostTimeout::new_boxed(budget, gated),
            None => gated,
        };
        let controller = Controller {
            timeout: self.config.timeout,
            rate_limit: registration.rate_limit,
            rate_burst: registration.rate_burst,
            ..Controller::default()
        };
        let policy = RegistrationPolicy {
            traffic: registration.traffic,
            route: registration.route,
            controller,
        };
        let mut logged = AccessLog::new(policy.traffic.clone(), self.config.logger.clone(), timed)
            .with_controller(policy.controller.clone());
        if let Some(route) = &policy.route {
            logged = logged.with_route(route.clone());
        }

        self.registry
            .register_with_policy(authority, Box::new(logged), policy)
    }

    /// Finish building, returning the registry. It is not modified after
    /// this point.
    pub fn into_registry(self) -> AuthorityRegistry {
        self.registry
    }
}
