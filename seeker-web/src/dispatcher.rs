//! Resolve requests to authorities, and answer them through the registry.

use actix_web::{
    web::{self, Bytes, BytesMut, Data},
    HttpMessage, HttpRequest, HttpResponse,
};
use cadence::{CountedExt, StatsdClient};
use chrono::Utc;
use futures::{FutureExt, StreamExt};
use http::{header::HeaderName, HeaderValue, Uri};
use seeker_exchange::{
    access_log::RequestSummary,
    metadata::{Routing, RoutingCode},
    AccessLogRecord, AccessLogger, AuthorityRegistry, ExchangeRequest, ExchangeResponse,
    RegistrationPolicy, RegistryError, Status, X_REQUEST_ID,
};
use seeker_settings::{DispatchSettings, RouteSettings};
use std::{panic::AssertUnwindSafe, time::Instant};
use tracing_actix_web::RequestId;

/// A configured path prefix rule.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Route {
    /// The rule name, reported as `route`.
    name: String,
    /// Reported as `from`. Empty if the rule names no calling application.
    from: String,
    /// The normalized prefix: a leading `/`, no trailing `/`. Empty matches
    /// every path.
    prefix: String,
    /// Where matching requests go.
    authority: String,
    /// Reported as `route-to`.
    to: String,
    /// Reported as `route-percent`.
    percent: u8,
}

impl Route {
    /// Build a rule from its settings.
    fn from_settings(settings: &RouteSettings) -> Self {
        let trimmed = settings.prefix.trim().trim_end_matches('/');
        let prefix = if trimmed.is_empty() || trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };
        Self {
            name: settings.name.clone(),
            from: settings.from.clone().unwrap_or_default(),
            prefix,
            authority: settings.authority.clone(),
            to: settings
                .to
                .clone()
                .unwrap_or_else(|| settings.authority.clone()),
            percent: settings.percent.min(100),
        }
    }

    /// Whether `path` is the prefix, or continues it after a `/`.
    fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || self.prefix.is_empty(),
            None => false,
        }
    }
}

/// Where a request was sent, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The resolved authority.
    pub authority: String,
    /// The routing decision, for the access log.
    pub routing: Routing,
}

/// The deterministic mapping from request paths to authorities.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    /// Rules ordered longest prefix first. Prefixes of equal length keep
    /// their configured order.
    routes: Vec<Route>,
    /// The authority for requests nothing else matched.
    default_authority: Option<String>,
}

impl RouteTable {
    /// Build the table from settings.
    pub fn from_settings(settings: &DispatchSettings) -> Self {
        let mut routes: Vec<Route> = settings.routes.iter().map(Route::from_settings).collect();
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self {
            routes,
            default_authority: settings.default_authority.clone(),
        }
    }

    /// Check that every authority the table refers to is registered.
    ///
    /// # Errors
    /// With the first authority that is referenced but not registered.
    pub fn validate(&self, registry: &AuthorityRegistry) -> Result<(), RegistryError> {
        let referenced = self
            .routes
            .iter()
            .map(|route| &route.authority)
            .chain(self.default_authority.iter());
        for authority in referenced {
            if !registry.contains(authority) {
                return Err(RegistryError::Unknown(authority.clone()));
            }
        }
        Ok(())
    }

    /// Resolve `path` to an authority.
    ///
    /// In order: the longest matching route prefix, a first path segment that
    /// names a registered authority, then the default authority.
    pub fn resolve(&self, path: &str, registry: &AuthorityRegistry) -> Option<Resolution> {
        if let Some(route) = self.routes.iter().find(|route| route.matches(path)) {
            return Some(Resolution {
                authority: route.authority.clone(),
                routing: Routing {
                    route: route.name.clone(),
                    from: route.from.clone(),
                    to: route.to.clone(),
                    percent: route.percent,
                    code: RoutingCode::Matched,
                },
            });
        }

        let segment = path.trim_start_matches('/').split('/').next().unwrap_or("");
        if !segment.is_empty() && registry.contains(segment) {
            return Some(Resolution {
                authority: segment.to_string(),
                routing: Routing {
                    route: segment.to_string(),
                    from: String::new(),
                    to: segment.to_string(),
                    percent: 100,
                    code: RoutingCode::Matched,
                },
            });
        }

        self.default_authority
            .as_ref()
            .map(|authority| Resolution {
                authority: authority.clone(),
                routing: Routing {
                    route: String::new(),
                    from: String::new(),
                    to: authority.clone(),
                    percent: 100,
                    code: RoutingCode::Default,
                },
            })
    }
}

/// The request body limit used unless one is configured, 256 KiB.
pub const DEFAULT_BODY_LIMIT: usize = 256 * 1024;

/// Answers every request that is not a fixed route.
pub struct Dispatcher {
    /// The frozen registry.
    registry: AuthorityRegistry,
    /// How paths map to authorities.
    routes: RouteTable,
    /// Used for requests that never complete inside a registered chain.
    logger: AccessLogger,
    /// Used to count misses, panics and rejected bodies.
    metrics_client: StatsdClient,
    /// The largest request body read, in bytes.
    body_limit: usize,
}

impl Dispatcher {
    /// Make a dispatcher over a finished registry.
    pub fn new(
        registry: AuthorityRegistry,
        routes: RouteTable,
        logger: AccessLogger,
        metrics_client: StatsdClient,
    ) -> Self {
        Self {
            registry,
            routes,
            logger,
            metrics_client,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Read request bodies of at most `limit` bytes.
    #[must_use]
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// The largest request body read, in bytes.
    pub fn body_limit(&self) -> usize {
        self.body_limit
    }

    /// The registry requests are answered from.
    pub fn registry(&self) -> &AuthorityRegistry {
        &self.registry
    }

    /// Resolve `request` and run it through its authority's exchange.
    ///
    /// A request that resolves to nothing is answered with a 404 and logged
    /// here, with routing code `NM`. A panic inside the exchange degrades only
    /// this request, to a 500.
    pub async fn dispatch(&self, mut request: ExchangeRequest) -> (ExchangeResponse, Status) {
        let start = Utc::now();
        let started = Instant::now();

        let resolved = self
            .routes
            .resolve(request.uri.path(), &self.registry)
            .and_then(|resolution| {
                self.registry
                    .resolve(&resolution.authority)
                    .map(|exchange| (resolution, exchange))
            });
        let (resolution, exchange) = match resolved {
            Some(resolved) => resolved,
            None => {
                request.routing.code = RoutingCode::NoMatch;
                let summary = RequestSummary::from(&request);
                let response = ExchangeResponse::empty();
                let status = Status::no_match();
                tracing::debug!(
                    r#type = "web.dispatch.miss",
                    path = %request.uri.path(),
                    "No authority matched the request"
                );
                self.metrics_client.incr_with_tags("dispatch.miss").send();
                let policy = RegistrationPolicy::default();
                self.log(&summary, start, started, &response, &status, &policy);
                return (response, status);
            }
        };

        request.authority = resolution.authority;
        request.routing = resolution.routing;
        let mut summary = RequestSummary::from(&request);

        match AssertUnwindSafe(exchange.exchange(request))
            .catch_unwind()
            .await
        {
            Ok(answer) => answer,
            Err(_) => {
                let response = ExchangeResponse::empty();
                let status = Status::panicked();
                tracing::error!(
                    r#type = "web.dispatch.panic",
                    authority = %summary.authority,
                    exchange = %exchange.name(),
                    "Exchange panicked"
                );
                self.metrics_client
                    .incr_with_tags("dispatch.panic")
                    .with_tag("authority", &summary.authority)
                    .send();
                let policy = self.policy(&summary.authority);
                if let Some(route) = &policy.route {
                    summary.routing.route = route.clone();
                }
                self.log(&summary, start, started, &response, &status, &policy);
                (response, status)
            }
        }
    }

    /// Answer `request` with `status` without running any exchange, and log
    /// it under the policy of the authority it resolves to.
    pub fn reject(
        &self,
        mut request: ExchangeRequest,
        status: Status,
    ) -> (ExchangeResponse, Status) {
        let start = Utc::now();
        let started = Instant::now();

        match self.routes.resolve(request.uri.path(), &self.registry) {
            Some(resolution) => {
                request.authority = resolution.authority;
                request.routing = resolution.routing;
            }
            None => request.routing.code = RoutingCode::NoMatch,
        }
        let mut summary = RequestSummary::from(&request);

        tracing::debug!(
            r#type = "web.dispatch.rejected",
            path = %request.uri.path(),
            %status,
            "Request rejected before dispatch"
        );
        self.metrics_client
            .incr_with_tags("dispatch.rejected")
            .with_tag("status", status.code().as_str())
            .send();

        let policy = self.policy(&summary.authority);
        if let Some(route) = &policy.route {
            summary.routing.route = route.clone();
        }
        let response = ExchangeResponse::empty();
        self.log(&summary, start, started, &response, &status, &policy);
        (response, status)
    }

    /// The policy `authority` was registered with, or the default for
    /// requests that resolved to nothing.
    fn policy(&self, authority: &str) -> RegistrationPolicy {
        self.registry
            .policy(authority)
            .cloned()
            .unwrap_or_default()
    }

    /// Write the access log record for a request no exchange logged.
    fn log(
        &self,
        summary: &RequestSummary,
        start: chrono::DateTime<Utc>,
        started: Instant,
        response: &ExchangeResponse,
        status: &Status,
        policy: &RegistrationPolicy,
    ) {
        let record = AccessLogRecord::new(
            summary,
            &policy.traffic,
            start,
            started.elapsed(),
            response,
            status,
            &policy.controller.decided(status),
        );
        self.logger.log(&record);
    }
}

/// The catch-all handler: every path that is not a fixed route ends here.
pub async fn dispatch(
    request: HttpRequest,
    payload: web::Payload,
    dispatcher: Data<Dispatcher>,
) -> HttpResponse {
    let mut exchange_request = exchange_request(&request);
    let (response, status) = match read_body(payload, dispatcher.body_limit()).await {
        Ok(body) => {
            exchange_request.body = body;
            dispatcher.dispatch(exchange_request).await
        }
        Err(status) => dispatcher.reject(exchange_request, status),
    };
    http_response(response, &status)
}

/// Collect the request body, failing with a 413 once it grows past `limit`.
async fn read_body(mut payload: web::Payload, limit: usize) -> Result<Bytes, Status> {
    let mut body = BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|error| Status::invalid_request(error.to_string()))?;
        if body.len() + chunk.len() > limit {
            return Err(Status::payload_too_large(limit));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body.freeze())
}

/// Copy an actix request, without its body, into an [`ExchangeRequest`].
///
/// The URI is made absolute from the connection info. If that does not parse
/// the request's own URI is kept, and the origin host still comes from the
/// connection info. If the caller did not send `X-Request-Id`, the tracing
/// request ID is used instead.
fn exchange_request(request: &HttpRequest) -> ExchangeRequest {
    let (uri, host) = {
        let info = request.connection_info();
        let path_and_query = request
            .uri()
            .path_and_query()
            .map_or("/", |path_and_query| path_and_query.as_str());
        let uri = format!("{}://{}{}", info.scheme(), info.host(), path_and_query)
            .parse::<Uri>()
            .unwrap_or_else(|_| request.uri().clone());
        (uri, info.host().to_string())
    };

    let mut exchange_request = ExchangeRequest::new(request.method().clone(), uri);
    if exchange_request.origin.host.is_empty() {
        exchange_request.origin.host = host;
    }
    for (name, value) in request.headers() {
        exchange_request.headers.append(name.clone(), value.clone());
    }
    if exchange_request.request_id().is_none() {
        let request_id = request.extensions().get::<RequestId>().map(ToString::to_string);
        if let Some(value) = request_id.and_then(|id| HeaderValue::from_str(&id).ok()) {
            exchange_request
                .headers
                .insert(HeaderName::from_static(X_REQUEST_ID), value);
        }
    }
    exchange_request
}

/// The HTTP response for an exchange: the code from the status, the headers
/// and body from the response.
fn http_response(response: ExchangeResponse, status: &Status) -> HttpResponse {
    let mut builder = HttpResponse::build(status.code());
    for (name, value) in &response.headers {
        builder.append_header((name.clone(), value.clone()));
    }
    builder.body(response.body)
}
