//! Serving search queries through the exchange pipeline.

use crate::{SearchProvider, SearchQuery, SearchResponse, MAX_LIMIT};
use anyhow::{bail, Context};
use async_trait::async_trait;
use http::{Method, StatusCode};
use seeker_exchange::{
    Exchange, ExchangeRequest, ExchangeResponse, Failure, Resource, Status,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The number of results returned when the request does not ask for a limit.
const DEFAULT_LIMIT: usize = 10;

/// The query string accepted by [`SearchExchange`].
#[derive(Debug, Deserialize)]
struct SearchParams {
    /// The search text.
    q: Option<String>,
    /// The most results to return.
    limit: Option<usize>,
}

/// The startup message accepted by [`SearchExchange`].
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StartupMessage {
    /// Replaces the built in default limit.
    default_limit: Option<usize>,
}

/// An exchange that answers `GET` requests with `?q=...` from a provider.
///
/// It is also a startup [`Resource`], named after its authority.
pub struct SearchExchange {
    /// The authority this exchange is registered under.
    authority: String,
    /// Where results come from.
    provider: Box<dyn SearchProvider>,
    /// The limit used when a request does not supply one.
    default_limit: AtomicUsize,
}

impl SearchExchange {
    /// Serve `provider` under `authority`.
    pub fn new(authority: impl Into<String>, provider: Box<dyn SearchProvider>) -> Self {
        Self {
            authority: authority.into(),
            provider,
            default_limit: AtomicUsize::new(DEFAULT_LIMIT),
        }
    }

    /// The authority this exchange serves.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Turn the request into a provider query, or explain why it is invalid.
    fn parse(&self, request: &ExchangeRequest) -> Result<SearchQuery, Status> {
        if request.method != Method::GET {
            return Err(Status::failed(
                StatusCode::METHOD_NOT_ALLOWED,
                Failure::InvalidRequest(format!("{} is not supported", request.method)),
            ));
        }

        let params: SearchParams = serde_qs::from_str(request.query())
            .map_err(|error| Status::invalid_request(error.to_string()))?;

        let query = match params.q {
            Some(q) if !q.trim().is_empty() => q.trim().to_string(),
            _ => return Err(Status::invalid_request("missing query parameter `q`")),
        };

        let limit = match params.limit {
            Some(0) => return Err(Status::invalid_request("`limit` must be at least 1")),
            Some(limit) => limit.min(MAX_LIMIT),
            None => self.default_limit.load(Ordering::Relaxed),
        };

        Ok(SearchQuery { query, limit })
    }
}

#[async_trait]
impl Exchange for SearchExchange {
    fn name(&self) -> String {
        format!("search({})", self.provider.name())
    }

    async fn exchange(&self, request: ExchangeRequest) -> (ExchangeResponse, Status) {
        let query = match self.parse(&request) {
            Ok(query) => query,
            Err(status) => return (ExchangeResponse::empty(), status),
        };

        tracing::debug!(
            r#type = "search.query",
            authority = %self.authority,
            query = %query.query,
            limit = query.limit,
            "Searching"
        );

        let text = query.query.clone();
        let results = match self.provider.search(query).await {
            Ok(results) => results,
            Err(error) => {
                tracing::warn!(
                    r#type = "search.provider-error",
                    authority = %self.authority,
                    %error,
                    "Search provider failed"
                );
                return (ExchangeResponse::empty(), Status::backend(error.to_string()));
            }
        };

        let body = SearchResponse {
            query: text,
            provider: self.provider.name(),
            results,
        };
        match ExchangeResponse::json(&body) {
            Ok(response) => (response, Status::ok()),
            Err(error) => (
                ExchangeResponse::empty(),
                Status::failed(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Failure::Backend(error.to_string()),
                ),
            ),
        }
    }
}

#[async_trait]
impl Resource for SearchExchange {
    fn name(&self) -> String {
        self.authority.clone()
    }

    async fn startup(&self, message: Value) -> anyhow::Result<()> {
        if message.is_null() {
            return Ok(());
        }
        let message: StartupMessage =
            serde_json::from_value(message).context("reading search startup message")?;
        if let Some(limit) = message.default_limit {
            if limit == 0 || limit > MAX_LIMIT {
                bail!("default_limit must be between 1 and {}, got {}", MAX_LIMIT, limit);
            }
            self.default_limit.store(limit, Ordering::Relaxed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SearchExchange;
    use crate::{
        FixedProvider, NullProvider, SearchError, SearchProvider, SearchQuery, SearchResponse,
        SearchResult,
    };
    use anyhow::anyhow;
    use async_trait::async_trait;
    use http::{Method, StatusCode, Uri};
    use pretty_assertions::assert_eq;
    use seeker_exchange::{Exchange, ExchangeRequest, Failure, Resource};
    use seeker_settings::{FixedConfig, FixedResult};
    use serde_json::{json, Value};

    fn fruit() -> SearchExchange {
        let config = FixedConfig {
            results: ["Apple", "Pineapple", "Banana"]
                .iter()
                .map(|title| FixedResult {
                    title: title.to_string(),
                    url: format!("https://example.com/{}", title.to_lowercase()),
                    snippet: format!("About {}", title),
                })
                .collect(),
        };
        SearchExchange::new(
            "search",
            FixedProvider::new_boxed(&config).expect("valid config"),
        )
    }

    fn get(uri: &'static str) -> ExchangeRequest {
        ExchangeRequest::get(Uri::from_static(uri))
    }

    fn titles(body: &[u8]) -> Vec<String> {
        let response: SearchResponse = serde_json::from_slice(body).expect("json body");
        response.results.into_iter().map(|r| r.title).collect()
    }

    /// Always fails.
    struct Broken;

    #[async_trait]
    impl SearchProvider for Broken {
        fn name(&self) -> String {
            "Broken".into()
        }

        async fn search(&self, _query: SearchQuery) -> Result<Vec<SearchResult>, SearchError> {
            Err(SearchError::Network(anyhow!("connection refused")))
        }
    }

    #[tokio::test]
    async fn test_search() {
        let (response, status) = fruit().exchange(get("/search?q=apple")).await;

        assert!(status.is_ok());
        assert_eq!(titles(&response.body), vec!["Apple", "Pineapple"]);
        assert_eq!(
            response.headers.get(http::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_search_limit() {
        let (response, status) = fruit().exchange(get("/search?q=a&limit=1")).await;
        assert!(status.is_ok());
        assert_eq!(titles(&response.body), vec!["Apple"]);
    }

    #[tokio::test]
    async fn test_missing_query_is_invalid() {
        for uri in ["/search", "/search?q=", "/search?q=%20%20", "/search?limit=3"] {
            let (response, status) = fruit().exchange(get(uri)).await;
            assert_eq!(status.code(), StatusCode::BAD_REQUEST, "for {}", uri);
            assert!(response.body.is_empty());
        }
    }

    #[tokio::test]
    async fn test_bad_limit_is_invalid() {
        for uri in ["/search?q=a&limit=0", "/search?q=a&limit=lots"] {
            let (_, status) = fruit().exchange(get(uri)).await;
            assert_eq!(status.code(), StatusCode::BAD_REQUEST, "for {}", uri);
        }
    }

    #[tokio::test]
    async fn test_wrong_method() {
        let request = ExchangeRequest::new(Method::POST, Uri::from_static("/search?q=a"));
        let (_, status) = fruit().exchange(request).await;
        assert_eq!(status.code(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_provider_failure_is_a_backend_failure() {
        let exchange = SearchExchange::new("search", Box::new(Broken));
        let (response, status) = exchange.exchange(get("/search?q=a")).await;

        assert_eq!(status.code(), StatusCode::BAD_GATEWAY);
        assert!(matches!(status.failure(), Some(Failure::Backend(_))));
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn test_null_provider() {
        let exchange = SearchExchange::new("search", Box::new(NullProvider));
        let (response, status) = exchange.exchange(get("/search?q=a")).await;

        assert!(status.is_ok());
        let body: Value = serde_json::from_slice(&response.body).expect("json");
        assert_eq!(
            body,
            json!({"query": "a", "provider": "NullProvider", "results": []})
        );
    }

    #[tokio::test]
    async fn test_startup_message_sets_default_limit() {
        let exchange = fruit();
        assert_eq!(Resource::name(&exchange), "search");

        exchange
            .startup(json!({"default_limit": 1}))
            .await
            .expect("valid message");
        let (response, _) = exchange.exchange(get("/search?q=a")).await;
        assert_eq!(titles(&response.body), vec!["Apple"]);
    }

    #[tokio::test]
    async fn test_startup_message_validation() {
        let exchange = fruit();
        exchange.startup(Value::Null).await.expect("null is accepted");
        assert!(exchange.startup(json!({"default_limit": 0})).await.is_err());
        assert!(exchange.startup(json!({"colour": "blue"})).await.is_err());
    }

    #[test]
    fn test_exchange_name() {
        assert_eq!(Exchange::name(&fruit()), "search(FixedProvider(3))");
    }
}
