//! The values that flow through an exchange.

use crate::metadata::{Origin, Routing};
use bytes::Bytes;
use http::{
    header::{self, HeaderName, HeaderValue},
    HeaderMap, Method, Uri,
};
use serde::Serialize;

/// The header carrying a caller supplied request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// A request handed to an [`Exchange`](crate::Exchange).
///
/// Exchanges take requests by value, so nothing can hold on to a request
/// after the exchange that received it returns.
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    /// The HTTP method.
    pub method: Method,

    /// The absolute URI of the request, including scheme and host when they
    /// are known.
    pub uri: Uri,

    /// The request headers.
    pub headers: HeaderMap,

    /// The request body.
    pub body: Bytes,

    /// Where the request came from.
    pub origin: Origin,

    /// The authority the dispatcher resolved this request to. Empty until the
    /// request is dispatched.
    pub authority: String,

    /// The routing decision that selected [`authority`](Self::authority).
    pub routing: Routing,
}

impl ExchangeRequest {
    /// Make a request with no headers or body.
    pub fn new(method: Method, uri: Uri) -> Self {
        let origin = Origin {
            host: uri.host().unwrap_or_default().to_string(),
            ..Origin::default()
        };
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            origin,
            authority: String::new(),
            routing: Routing::default(),
        }
    }

    /// Make a `GET` request.
    pub fn get(uri: Uri) -> Self {
        Self::new(Method::GET, uri)
    }

    /// Add a header, keeping any existing values for the same name.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// The raw query string, without the leading `?`.
    pub fn query(&self) -> &str {
        self.uri.query().unwrap_or_default()
    }

    /// The request ID supplied by the caller in `X-Request-Id`, if any.
    pub fn request_id(&self) -> Option<&str> {
        self.headers
            .get(X_REQUEST_ID)
            .and_then(|value| value.to_str().ok())
    }

    /// The request URL without its query string, as `scheme://host/path`.
    ///
    /// Requests without a scheme are assumed to be `http`, and requests without
    /// a host in their URI use the origin host.
    pub fn normalized_url(&self) -> String {
        let scheme = self.uri.scheme_str().unwrap_or("http");
        let host = self
            .uri
            .authority()
            .map_or(self.origin.host.as_str(), |authority| authority.as_str());
        format!("{}://{}{}", scheme, host, self.uri.path())
    }
}

/// The response half of an exchange.
///
/// A response has no status code of its own. The HTTP status is always taken
/// from the [`Status`](crate::Status) it is paired with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExchangeResponse {
    /// The response headers.
    pub headers: HeaderMap,

    /// The response body.
    pub body: Bytes,
}

impl ExchangeResponse {
    /// The zero-value response, used to answer failed exchanges.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A response with `body` and no headers.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Serialize `value` as a JSON response body.
    ///
    /// # Errors
    /// If `value` cannot be represented as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(body).with_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        ))
    }

    /// Set a header, replacing any existing values for the same name.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// The number of bytes in the body.
    pub fn content_length(&self) -> u64 {
        self.body.len() as u64
    }

    /// The value of the `Content-Encoding` header, or an empty string.
    pub fn content_encoding(&self) -> &str {
        self.headers
            .get(header::CONTENT_ENCODING)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::{ExchangeRequest, ExchangeResponse, X_REQUEST_ID};
    use http::{header, HeaderValue, Uri};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalized_url_drops_query() {
        let request = ExchangeRequest::get(Uri::from_static(
            "https://search.example.com/search/web?q=rust&limit=5",
        ));
        assert_eq!(
            request.normalized_url(),
            "https://search.example.com/search/web"
        );
        assert_eq!(request.query(), "q=rust&limit=5");
        assert_eq!(request.origin.host, "search.example.com");
    }

    #[test]
    fn test_normalized_url_relative() {
        let mut request = ExchangeRequest::get(Uri::from_static("/search?q=rust"));
        request.origin.host = "localhost:8081".to_string();
        assert_eq!(request.normalized_url(), "http://localhost:8081/search");
    }

    #[test]
    fn test_request_id() {
        let request = ExchangeRequest::get(Uri::from_static("/"));
        assert_eq!(request.request_id(), None);
        let request = request.with_header(
            header::HeaderName::from_static(X_REQUEST_ID),
            HeaderValue::from_static("123-abc"),
        );
        assert_eq!(request.request_id(), Some("123-abc"));
    }

    #[test]
    fn test_response_json() {
        let response = ExchangeResponse::json(&vec!["a", "b"]).expect("serializable");
        assert_eq!(response.body.as_ref(), br#"["a","b"]"#);
        assert_eq!(response.content_length(), 9);
        assert_eq!(
            response.headers.get(header::CONTENT_TYPE),
            Some(&HeaderValue::from_static("application/json"))
        );
        assert_eq!(response.content_encoding(), "");
    }
}
