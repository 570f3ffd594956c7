//! Building the dispatch pipeline from settings.
//!
//! Order matters. The startup handshake runs first, then every exchange is
//! registered, then the route table is checked against the registry. Any
//! failure is fatal, and happens before a listener exists.

use crate::{
    dispatcher::{Dispatcher, RouteTable},
    health::Health,
};
use cadence::StatsdClient;
use seeker_exchange::{
    intermediary::{AllowAll, AuthCheck},
    startup, AccessLogSink, AccessLogger, Exchange, Host, HostConfig, Registration,
    RegistryError, Resource, StartupError,
};
use seeker_search::{make_provider, SearchExchange, SetupError};
use seeker_settings::Settings;
use std::sync::Arc;
use thiserror::Error;

/// The pieces the web server shares between its workers.
#[derive(Clone)]
pub struct Pipeline {
    /// Answers every request that is not a health probe.
    pub dispatcher: Arc<Dispatcher>,
    /// The probe predicates. Ready once the pipeline is built.
    pub health: Arc<Health>,
}

/// Why the pipeline could not be built.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An authority's search provider could not be made.
    #[error("could not set up the search provider for authority {authority:?}")]
    Provider {
        /// The authority being set up.
        authority: String,
        /// What went wrong.
        #[source]
        source: SetupError,
    },

    /// A resource did not acknowledge its startup message.
    #[error(transparent)]
    Startup(#[from] StartupError),

    /// An authority could not be registered, or is referenced but missing.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// An exchange added in code rather than configuration.
struct ExtraExchange {
    /// The authority to register under.
    authority: String,
    /// The exchange itself.
    exchange: Box<dyn Exchange>,
    /// Its intermediary configuration.
    registration: Registration,
}

/// Assembles a [`Pipeline`].
pub struct PipelineBuilder<'a> {
    /// Where authorities, routes, and budgets come from.
    settings: &'a Settings,
    /// Shared by the dispatcher.
    metrics_client: StatsdClient,
    /// Where every access log record goes.
    logger: AccessLogger,
    /// Checked before every exchange.
    auth: Arc<dyn AuthCheck>,
    /// Exchanges registered after the configured authorities.
    extra_exchanges: Vec<ExtraExchange>,
    /// Resources that take part in the startup handshake in addition to the
    /// configured authorities.
    extra_resources: Vec<Arc<dyn Resource>>,
}

impl<'a> PipelineBuilder<'a> {
    /// Start from settings, logging to standard error and allowing every
    /// request.
    pub fn new(settings: &'a Settings, metrics_client: StatsdClient) -> Self {
        Self {
            settings,
            metrics_client,
            logger: AccessLogger::stderr(),
            auth: Arc::new(AllowAll),
            extra_exchanges: Vec::new(),
            extra_resources: Vec::new(),
        }
    }

    /// Send access log records to `sink`.
    #[must_use]
    pub fn access_log_sink(mut self, sink: Arc<dyn AccessLogSink>) -> Self {
        self.logger = AccessLogger::new(sink);
        self
    }

    /// Replace the auth check.
    #[must_use]
    pub fn auth_check(mut self, auth: Arc<dyn AuthCheck>) -> Self {
        self.auth = auth;
        self
    }

    /// Register an extra exchange.
    #[must_use]
    pub fn exchange(
        mut self,
        authority: impl Into<String>,
        exchange: Box<dyn Exchange>,
        registration: Registration,
    ) -> Self {
        self.extra_exchanges.push(ExtraExchange {
            authority: authority.into(),
            exchange,
            registration,
        });
        self
    }

    /// Add a resource to the startup handshake.
    #[must_use]
    pub fn resource(mut self, resource: Arc<dyn Resource>) -> Self {
        self.extra_resources.push(resource);
        self
    }

    /// Run the startup handshake, register every exchange, and check the
    /// route table.
    ///
    /// # Errors
    /// If a provider cannot be made, startup fails or times out, or
    /// registration fails.
    pub async fn build(self) -> Result<Pipeline, PipelineError> {
        let settings = self.settings;

        let mut authorities: Vec<_> = settings.authorities.iter().collect();
        authorities.sort_by(|a, b| a.0.cmp(b.0));

        let mut searches = Vec::with_capacity(authorities.len());
        for (authority, config) in authorities {
            let provider =
                make_provider(&config.provider).map_err(|source| PipelineError::Provider {
                    authority: authority.clone(),
                    source,
                })?;
            let registration = Registration {
                traffic: config.traffic.clone(),
                route: config.route.clone(),
                rate_limit: config.rate_limit,
                rate_burst: config.rate_burst,
            };
            searches.push((
                Arc::new(SearchExchange::new(authority.clone(), provider)),
                registration,
            ));
        }

        let mut resources: Vec<Arc<dyn Resource>> = searches
            .iter()
            .map(|(search, _)| Arc::clone(search) as Arc<dyn Resource>)
            .collect();
        resources.extend(self.extra_resources);
        startup(
            &resources,
            &settings.startup.resources,
            settings.host.startup_timeout,
        )
        .await?;

        let mut host = Host::new(HostConfig {
            timeout: settings.host.timeout,
            auth: self.auth,
            logger: self.logger.clone(),
        });
        for (search, registration) in searches {
            let authority = search.authority().to_string();
            host.register_exchange(&authority, Box::new(search), registration)?;
        }
        for extra in self.extra_exchanges {
            host.register_exchange(&extra.authority, extra.exchange, extra.registration)?;
        }
        let registry = host.into_registry();

        let routes = RouteTable::from_settings(&settings.dispatch);
        routes.validate(&registry)?;

        tracing::info!(
            r#type = "web.pipeline.ready",
            authorities = ?registry.authorities(),
            "Dispatch pipeline ready"
        );

        let dispatcher = Dispatcher::new(registry, routes, self.logger, self.metrics_client)
            .with_body_limit(settings.http.max_body_kb.saturating_mul(1024));
        let health = Health::new();
        health.set_ready(true);

        Ok(Pipeline {
            dispatcher: Arc::new(dispatcher),
            health: Arc::new(health),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{PipelineBuilder, PipelineError};
    use cadence::{NopMetricSink, StatsdClient};
    use http::{StatusCode, Uri};
    use pretty_assertions::assert_eq;
    use seeker_exchange::{
        access_log::BufferSink, ExchangeRequest, RegistryError, StartupError,
    };
    use seeker_settings::{RouteSettings, Settings};
    use serde_json::json;
    use std::sync::Arc;

    fn metrics() -> StatsdClient {
        StatsdClient::from_sink("seeker-test", NopMetricSink)
    }

    #[actix_rt::test]
    async fn test_build_from_test_settings() {
        let settings = Settings::load_for_tests(|_| ());
        let sink = Arc::new(BufferSink::default());
        let pipeline = PipelineBuilder::new(&settings, metrics())
            .access_log_sink(sink.clone())
            .build()
            .await
            .expect("pipeline should build");

        assert!(pipeline.health.is_ready());
        assert_eq!(pipeline.dispatcher.registry().authorities(), vec!["search"]);

        let (response, status) = pipeline
            .dispatcher
            .dispatch(ExchangeRequest::get(Uri::from_static(
                "http://localhost/search?q=apple",
            )))
            .await;
        assert!(status.is_ok());
        assert!(!response.body.is_empty());

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["to"], "search");
        assert_eq!(records[0]["route"], "search");
        assert_eq!(records[0]["rc"], "OK");
        assert_eq!(records[0]["timeout"], 1000);
    }

    #[actix_rt::test]
    async fn test_route_to_unknown_authority_is_fatal() {
        let settings = Settings::load_for_tests(|settings| {
            settings.dispatch.routes.push(RouteSettings {
                name: "images".to_string(),
                prefix: "/images".to_string(),
                authority: "images".to_string(),
                from: None,
                to: None,
                percent: 100,
            });
        });

        let error = PipelineBuilder::new(&settings, metrics())
            .build()
            .await
            .err()
            .expect("pipeline should not build");
        assert!(matches!(
            error,
            PipelineError::Registry(RegistryError::Unknown(ref name)) if name == "images"
        ));
    }

    #[actix_rt::test]
    async fn test_rejected_startup_message_is_fatal() {
        let settings = Settings::load_for_tests(|settings| {
            settings
                .startup
                .resources
                .insert("search".to_string(), json!({"default_limit": 0}));
        });

        let error = PipelineBuilder::new(&settings, metrics())
            .build()
            .await
            .err()
            .expect("pipeline should not build");
        assert!(matches!(
            error,
            PipelineError::Startup(StartupError::Failed { ref resource, .. }) if resource == "search"
        ));
    }

    #[actix_rt::test]
    async fn test_unmatched_paths_are_not_found() {
        let settings = Settings::load_for_tests(|_| ());
        let pipeline = PipelineBuilder::new(&settings, metrics())
            .access_log_sink(Arc::new(BufferSink::default()))
            .build()
            .await
            .expect("pipeline should build");

        let (_, status) = pipeline
            .dispatcher
            .dispatch(ExchangeRequest::get(Uri::from_static("http://localhost/nope")))
            .await;
        assert_eq!(status.code(), StatusCode::NOT_FOUND);
    }
}
