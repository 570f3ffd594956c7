//! The access log: one structured record per dispatched request.
//!
//! Records are serialized as a single line of JSON and written to an
//! [`AccessLogSink`]. Collectors depend on the field names and on the `-1`
//! convention for unset numeric policy values, so both are stable.

use crate::{
    domain::{ExchangeRequest, ExchangeResponse},
    metadata::{Controller, Origin, Routing},
    status::Status,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::{
    fmt,
    io::Write,
    sync::{Arc, Mutex},
    time::Duration,
};

/// Traffic that stays between services of the same deployment.
pub const INTERNAL_TRAFFIC: &str = "internal";

/// Traffic arriving from outside the deployment.
pub const INGRESS_TRAFFIC: &str = "ingress";

/// Traffic leaving the deployment.
pub const EGRESS_TRAFFIC: &str = "egress";

/// The value logged for unset numeric policy fields. `0` is a meaningful
/// value (nothing admitted), so it cannot stand in for "unset".
pub const UNSET: i64 = -1;

/// The parts of a request the access log needs, captured before the request
/// is moved into an exchange.
#[derive(Debug, Clone)]
pub struct RequestSummary {
    /// Request provenance.
    pub origin: Origin,
    /// The `X-Request-Id` header, or empty.
    pub request_id: String,
    /// The resolved authority, or empty.
    pub authority: String,
    /// The HTTP method.
    pub method: String,
    /// `scheme://host/path`.
    pub url: String,
    /// The raw query string.
    pub query: String,
    /// The dispatcher's routing decision.
    pub routing: Routing,
}

impl From<&ExchangeRequest> for RequestSummary {
    fn from(request: &ExchangeRequest) -> Self {
        Self {
            origin: request.origin.clone(),
            request_id: request.request_id().unwrap_or_default().to_string(),
            authority: request.authority.clone(),
            method: request.method.to_string(),
            url: request.normalized_url(),
            query: request.query().to_string(),
            routing: request.routing.clone(),
        }
    }
}

/// One access log entry. Field order is the order they are written in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessLogRecord {
    /// Reserved origin field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Reserved origin field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    /// Reserved origin field.
    #[serde(rename = "sub-zone", skip_serializing_if = "Option::is_none")]
    pub sub_zone: Option<String>,
    /// Reserved origin field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    /// Reserved origin field.
    #[serde(rename = "instance-id", skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    /// The traffic class label of the registration.
    pub traffic: String,
    /// When the exchange started, RFC 3339 in UTC with millisecond precision.
    pub start: String,
    /// How long the exchange took, in whole milliseconds.
    pub duration: u64,
    /// The caller's request ID.
    #[serde(rename = "request-id")]
    pub request_id: String,
    /// The calling application declared by the routing rule.
    pub from: String,
    /// The authority the request was dispatched to.
    pub to: String,

    /// The HTTP method.
    pub method: String,
    /// `scheme://host/path`.
    pub uri: String,
    /// The raw query string.
    pub query: String,
    /// The HTTP status code of the response.
    #[serde(rename = "status-code")]
    pub status_code: u16,
    /// The size of the response body.
    pub bytes: u64,
    /// The `Content-Encoding` of the response.
    pub encoding: String,

    /// The exchange time budget in milliseconds, or `-1`.
    #[serde(serialize_with = "serialize_timeout")]
    pub timeout: Option<Duration>,
    /// The admission rate, or `-1`.
    #[serde(rename = "rate-limit", serialize_with = "serialize_rate_limit")]
    pub rate_limit: Option<f64>,
    /// The admission burst, or `-1`.
    #[serde(rename = "rate-burst", serialize_with = "serialize_rate_burst")]
    pub rate_burst: Option<i32>,
    /// The controller decision code.
    #[serde(rename = "cc")]
    pub controller_code: &'static str,

    /// The routing rule name.
    pub route: String,
    /// The routing target.
    #[serde(rename = "route-to")]
    pub route_to: String,
    /// The routing split weight.
    #[serde(rename = "route-percent")]
    pub route_percent: u8,
    /// The routing outcome code.
    #[serde(rename = "rc")]
    pub routing_code: &'static str,
}

impl AccessLogRecord {
    /// Assemble a record for one completed exchange.
    pub fn new(
        request: &RequestSummary,
        traffic: &str,
        start: DateTime<Utc>,
        duration: Duration,
        response: &ExchangeResponse,
        status: &Status,
        controller: &Controller,
    ) -> Self {
        let origin = &request.origin;
        Self {
            region: origin.region.clone(),
            zone: origin.zone.clone(),
            sub_zone: origin.sub_zone.clone(),
            app: origin.app.clone(),
            instance_id: origin.instance_id.clone(),
            traffic: traffic.to_string(),
            start: start.to_rfc3339_opts(SecondsFormat::Millis, true),
            duration: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            request_id: request.request_id.clone(),
            from: request.routing.from.clone(),
            to: request.authority.clone(),
            method: request.method.clone(),
            uri: request.url.clone(),
            query: request.query.clone(),
            status_code: status.code().as_u16(),
            bytes: response.content_length(),
            encoding: response.content_encoding().to_string(),
            timeout: controller.timeout,
            rate_limit: controller.rate_limit,
            rate_burst: controller.rate_burst,
            controller_code: controller.code.as_str(),
            route: request.routing.route.clone(),
            route_to: request.routing.to.clone(),
            route_percent: request.routing.percent,
            routing_code: request.routing.code.as_str(),
        }
    }
}

/// Write `-1` for an unset timeout, else whole milliseconds.
fn serialize_timeout<S: Serializer>(
    timeout: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match timeout {
        Some(timeout) => {
            serializer.serialize_u64(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
        }
        None => serializer.serialize_i64(UNSET),
    }
}

/// Write `-1` for an unset rate. Whole rates are written without a fraction.
fn serialize_rate_limit<S: Serializer>(
    rate_limit: &Option<f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match *rate_limit {
        #[allow(clippy::cast_possible_truncation)]
        Some(rate) if rate.is_finite() && rate.fract() == 0.0 && rate.abs() < 1e15 => {
            serializer.serialize_i64(rate as i64)
        }
        Some(rate) => serializer.serialize_f64(rate),
        None => serializer.serialize_i64(UNSET),
    }
}

/// Write `-1` for an unset burst.
fn serialize_rate_burst<S: Serializer>(
    rate_burst: &Option<i32>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(rate_burst.map_or(UNSET, i64::from))
}

/// Where serialized access log lines go.
pub trait AccessLogSink: Send + Sync {
    /// Write one line. `line` does not include a trailing newline.
    fn write_line(&self, line: &str);
}

/// Writes access log lines to the process's standard error.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl AccessLogSink for StderrSink {
    fn write_line(&self, line: &str) {
        let mut stderr = std::io::stderr().lock();
        if let Err(error) = writeln!(stderr, "{}", line) {
            tracing::warn!(r#type = "access-log.write-error", %error, "Could not write access log");
        }
    }
}

/// Keeps access log lines in memory, so they can be inspected later.
#[derive(Debug, Default)]
pub struct BufferSink {
    /// Every line written so far.
    lines: Mutex<Vec<String>>,
}

impl BufferSink {
    /// A copy of the lines written so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// The lines written so far, parsed as JSON.
    ///
    /// # Panics
    /// If a line is not valid JSON.
    pub fn records(&self) -> Vec<serde_json::Value> {
        self.lines()
            .iter()
            .map(|line| {
                serde_json::from_str(line)
                    .unwrap_or_else(|_| panic!("Bad JSON in access log line: {}", line))
            })
            .collect()
    }
}

impl AccessLogSink for BufferSink {
    fn write_line(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}

/// Serializes access log records and hands them to a sink.
///
/// Logging is synchronous and bounded: formatting plus one local write.
#[derive(Clone)]
pub struct AccessLogger {
    /// Where lines go.
    sink: Arc<dyn AccessLogSink>,
}

impl AccessLogger {
    /// Log to `sink`.
    pub fn new(sink: Arc<dyn AccessLogSink>) -> Self {
        Self { sink }
    }

    /// Log to standard error.
    pub fn stderr() -> Self {
        Self::new(Arc::new(StderrSink))
    }

    /// Emit one record.
    pub fn log(&self, record: &AccessLogRecord) {
        match serde_json::to_string(record) {
            Ok(line) => self.sink.write_line(&line),
            Err(error) => tracing::error!(
                r#type = "access-log.serialize-error",
                %error,
                "Could not serialize access log record"
            ),
        }
    }
}

impl fmt::Debug for AccessLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessLogger").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessLogRecord, AccessLogger, BufferSink, RequestSummary, INTERNAL_TRAFFIC};
    use crate::{
        metadata::{Controller, ControllerCode, Routing, RoutingCode},
        ExchangeRequest, ExchangeResponse, Status,
    };
    use chrono::{TimeZone, Utc};
    use http::{header, HeaderValue, Uri};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::{sync::Arc, time::Duration};

    fn summary() -> RequestSummary {
        let mut request =
            ExchangeRequest::get(Uri::from_static("http://localhost:8081/search?q=rust"))
                .with_header(
                    header::HeaderName::from_static("x-request-id"),
                    HeaderValue::from_static("req-1"),
                );
        request.authority = "search".to_string();
        request.routing = Routing {
            route: "search".to_string(),
            from: "frontend".to_string(),
            to: "primary".to_string(),
            percent: 100,
            code: RoutingCode::Matched,
        };
        RequestSummary::from(&request)
    }

    #[test]
    fn test_record_line_layout() {
        let start = Utc
            .with_ymd_and_hms(2024, 3, 1, 12, 30, 5)
            .single()
            .expect("valid date")
            + chrono::Duration::milliseconds(42);
        let response = ExchangeResponse::new("hello").with_header(
            header::CONTENT_ENCODING,
            HeaderValue::from_static("gzip"),
        );
        let controller = Controller {
            timeout: Some(Duration::from_secs(3)),
            rate_limit: Some(100.0),
            rate_burst: Some(10),
            code: ControllerCode::Completed,
        };
        let record = AccessLogRecord::new(
            &summary(),
            INTERNAL_TRAFFIC,
            start,
            Duration::from_micros(12_900),
            &response,
            &Status::ok(),
            &controller,
        );

        let sink = Arc::new(BufferSink::default());
        AccessLogger::new(sink.clone()).log(&record);

        assert_eq!(
            sink.lines(),
            vec![concat!(
                r#"{"traffic":"internal","start":"2024-03-01T12:30:05.042Z","duration":12,"#,
                r#""request-id":"req-1","from":"frontend","to":"search","method":"GET","#,
                r#""uri":"http://localhost:8081/search","query":"q=rust","status-code":200,"#,
                r#""bytes":5,"encoding":"gzip","timeout":3000,"rate-limit":100,"rate-burst":10,"#,
                r#""cc":"","route":"search","route-to":"primary","route-percent":100,"rc":"OK"}"#
            )]
        );
    }

    #[test]
    fn test_unset_policy_is_negative_one() {
        let record = AccessLogRecord::new(
            &summary(),
            INTERNAL_TRAFFIC,
            Utc::now(),
            Duration::ZERO,
            &ExchangeResponse::empty(),
            &Status::ok(),
            &Controller::default(),
        );
        let value = serde_json::to_value(&record).expect("serializable");
        assert_eq!(value["timeout"], json!(-1));
        assert_eq!(value["rate-limit"], json!(-1));
        assert_eq!(value["rate-burst"], json!(-1));
    }

    #[test]
    fn test_zero_policy_is_zero() {
        let controller = Controller {
            rate_limit: Some(0.0),
            rate_burst: Some(0),
            ..Controller::default()
        };
        let record = AccessLogRecord::new(
            &summary(),
            INTERNAL_TRAFFIC,
            Utc::now(),
            Duration::ZERO,
            &ExchangeResponse::empty(),
            &Status::ok(),
            &controller,
        );
        let value = serde_json::to_value(&record).expect("serializable");
        assert_eq!(value["rate-limit"], json!(0));
        assert_eq!(value["rate-burst"], json!(0));
    }

    #[test]
    fn test_fractional_rate_limit() {
        let controller = Controller {
            rate_limit: Some(2.5),
            ..Controller::default()
        };
        let record = AccessLogRecord::new(
            &summary(),
            INTERNAL_TRAFFIC,
            Utc::now(),
            Duration::ZERO,
            &ExchangeResponse::empty(),
            &Status::ok(),
            &controller,
        );
        let value = serde_json::to_value(&record).expect("serializable");
        assert_eq!(value["rate-limit"], json!(2.5));
    }

    #[test]
    fn test_reserved_origin_fields() {
        let mut summary = summary();
        let record = |summary: &RequestSummary| {
            let record = AccessLogRecord::new(
                summary,
                INTERNAL_TRAFFIC,
                Utc::now(),
                Duration::ZERO,
                &ExchangeResponse::empty(),
                &Status::ok(),
                &Controller::default(),
            );
            serde_json::to_value(&record).expect("serializable")
        };

        let value = record(&summary);
        for field in ["region", "zone", "sub-zone", "app", "instance-id"] {
            assert!(value.get(field).is_none(), "{} should be absent", field);
        }

        summary.origin.region = Some("us-west1".to_string());
        summary.origin.app = Some("mobile".to_string());
        let value = record(&summary);
        assert_eq!(value["region"], json!("us-west1"));
        assert_eq!(value["app"], json!("mobile"));
        assert_eq!(value["from"], json!("frontend"));
    }
}
