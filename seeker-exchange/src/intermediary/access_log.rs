//! Record every exchange in the access log.

use crate::{
    access_log::{AccessLogRecord, AccessLogger, RequestSummary},
    metadata::Controller,
    Exchange, ExchangeRequest, ExchangeResponse, Status,
};
use async_trait::async_trait;
use chrono::Utc;
use std::time::Instant;

/// Times the wrapped exchange and emits exactly one access log record per
/// invocation, whether it succeeds or fails.
///
/// This should be the outermost intermediary of a registration, so that the
/// time reported covers the whole chain.
pub struct AccessLog {
    /// The traffic class label attached to every record.
    traffic: String,

    /// A routing name attached to every record. Replaces the dispatcher's
    /// rule name when set.
    route: Option<String>,

    /// The controller policy in front of the wrapped exchange.
    controller: Controller,

    /// Where records go.
    logger: AccessLogger,

    /// The exchange to observe.
    inner: Box<dyn Exchange>,
}

impl AccessLog {
    /// Wrap `inner`, labelling its records with `traffic`.
    pub fn new(traffic: impl Into<String>, logger: AccessLogger, inner: Box<dyn Exchange>) -> Self {
        Self {
            traffic: traffic.into(),
            route: None,
            controller: Controller::default(),
            logger,
            inner,
        }
    }

    /// Attach a routing name to every record.
    #[must_use]
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    /// Report `controller` as the policy in front of the wrapped exchange.
    #[must_use]
    pub fn with_controller(mut self, controller: Controller) -> Self {
        self.controller = controller;
        self
    }
}

#[async_trait]
impl Exchange for AccessLog {
    fn name(&self) -> String {
        format!("access_log({})", self.inner.name())
    }

    async fn exchange(&self, request: ExchangeRequest) -> (ExchangeResponse, Status) {
        let mut summary = RequestSummary::from(&request);
        if let Some(route) = &self.route {
            summary.routing.route = route.clone();
        }

        let start = Utc::now();
        let timer = Instant::now();
        let (response, status) = self.inner.exchange(request).await;
        let duration = timer.elapsed();

        let record = AccessLogRecord::new(
            &summary,
            &self.traffic,
            start,
            duration,
            &response,
            &status,
            &self.controller.decided(&status),
        );
        self.logger.log(&record);

        (response, status)
    }
}

#[cfg(test)]
mod tests {
    use super::AccessLog;
    use crate::{
        access_log::{AccessLogger, BufferSink, INGRESS_TRAFFIC, INTERNAL_TRAFFIC},
        intermediary::{testing::CountingExchange, HostTimeout},
        metadata::{Controller, Routing, RoutingCode},
        Exchange, ExchangeRequest, Status,
    };
    use http::{StatusCode, Uri};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::{sync::Arc, time::Duration};

    fn request() -> ExchangeRequest {
        let mut request = ExchangeRequest::get(Uri::from_static("http://localhost/search?q=x"));
        request.authority = "search".to_string();
        request.routing = Routing {
            route: "rule".to_string(),
            from: String::new(),
            to: "search".to_string(),
            percent: 100,
            code: RoutingCode::Matched,
        };
        request
    }

    #[tokio::test]
    async fn test_one_record_per_success() {
        let sink = Arc::new(BufferSink::default());
        let inner = CountingExchange::ok("found");
        let logged = AccessLog::new(
            INTERNAL_TRAFFIC,
            AccessLogger::new(sink.clone()),
            Box::new(inner.clone()),
        );

        let (response, status) = logged.exchange(request()).await;

        assert_eq!(status, Status::ok());
        assert_eq!(response.body.as_ref(), b"found");
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["traffic"], json!("internal"));
        assert_eq!(records[0]["status-code"], json!(200));
        assert_eq!(records[0]["bytes"], json!(5));
        assert_eq!(records[0]["route"], json!("rule"));
        assert_eq!(records[0]["to"], json!("search"));
        assert_eq!(records[0]["rc"], json!("OK"));
        assert!(records[0]["duration"].as_u64().is_some());
    }

    #[tokio::test]
    async fn test_one_record_per_failure() {
        let sink = Arc::new(BufferSink::default());
        let inner = CountingExchange::failing(Status::backend("refused"));
        let logged = AccessLog::new(
            INGRESS_TRAFFIC,
            AccessLogger::new(sink.clone()),
            Box::new(inner),
        );

        let (_response, status) = logged.exchange(request()).await;

        assert_eq!(status, Status::backend("refused"));
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["traffic"], json!("ingress"));
        assert_eq!(records[0]["status-code"], json!(502));
    }

    #[tokio::test]
    async fn test_repeated_calls_log_each() {
        let sink = Arc::new(BufferSink::default());
        let inner = CountingExchange::ok("found");
        let logged = AccessLog::new(
            INTERNAL_TRAFFIC,
            AccessLogger::new(sink.clone()),
            Box::new(inner.clone()),
        );

        for _ in 0..5 {
            logged.exchange(request()).await;
        }

        assert_eq!(inner.calls(), 5);
        assert_eq!(sink.lines().len(), 5);
    }

    #[tokio::test]
    async fn test_configured_route_replaces_rule_name() {
        let sink = Arc::new(BufferSink::default());
        let logged = AccessLog::new(
            INTERNAL_TRAFFIC,
            AccessLogger::new(sink.clone()),
            Box::new(CountingExchange::ok("")),
        )
        .with_route("search-v2");

        logged.exchange(request()).await;

        assert_eq!(sink.records()[0]["route"], json!("search-v2"));
    }

    #[tokio::test]
    async fn test_controller_fields() {
        let sink = Arc::new(BufferSink::default());
        let controller = Controller {
            timeout: Some(Duration::from_millis(10)),
            rate_burst: Some(0),
            ..Controller::default()
        };
        let inner = HostTimeout::new_boxed(
            Duration::from_millis(10),
            Box::new(CountingExchange::slow(Duration::from_millis(1000))),
        );
        let logged = AccessLog::new(INTERNAL_TRAFFIC, AccessLogger::new(sink.clone()), inner)
            .with_controller(controller);

        let (_response, status) = logged.exchange(request()).await;

        assert_eq!(status.code(), StatusCode::GATEWAY_TIMEOUT);
        let record = &sink.records()[0];
        assert_eq!(record["timeout"], json!(10));
        assert_eq!(record["rate-limit"], json!(-1));
        assert_eq!(record["rate-burst"], json!(0));
        assert_eq!(record["cc"], json!("TO"));
        assert_eq!(record["status-code"], json!(504));
        assert!(record["duration"].as_u64().expect("duration is a number") >= 10);
    }
}
