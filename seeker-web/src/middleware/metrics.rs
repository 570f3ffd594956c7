//! Middlewares for reporting Metrics in Seeker.

use crate::errors::HandlerError;
use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    Error as ActixError,
};
use cadence::{StatsdClient, Timed};
use std::{
    fmt,
    future::{ready, Future, Ready},
    pin::Pin,
    task::Context,
    time::Instant,
};

/// Factory for [`MetricsMiddleware`].
pub struct Metrics;

/// Middleware to record request metrics.
pub struct MetricsMiddleware<S> {
    /// The wrapped service.
    service: S,
}

impl<S> Transform<S, ServiceRequest> for Metrics
where
    S: Service<ServiceRequest, Response = ServiceResponse>,
    S::Future: 'static,
    S::Error: fmt::Debug,
{
    type Response = ServiceResponse;

    type Error = ActixError;

    type Transform = MetricsMiddleware<S>;

    type InitError = ();

    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddleware { service }))
    }
}

impl<S> Service<ServiceRequest> for MetricsMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse>,
    S::Future: 'static,
    S::Error: fmt::Debug,
{
    type Response = ServiceResponse;

    type Error = ActixError;

    #[allow(clippy::type_complexity)]
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx).map_err(|error| {
            tracing::error!(
                r#type = "web.metrics.polling-error",
                ?error,
                "Error polling service from metrics middleware"
            );
            HandlerError::internal().into()
        })
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start = Instant::now();
        let metrics_client = req.app_data::<StatsdClient>().cloned();
        let fut = self.service.call(req);

        Box::pin(async move {
            let response = fut.await.map_err(|error| {
                tracing::error!(r#type = "web.metrics.service-error", ?error, "Service failed");
                HandlerError::internal()
            })?;
            if let Some(metrics_client) = metrics_client {
                // Routing happens inside the wrapped service, so the matched
                // pattern is only known from the response.
                let route = response
                    .request()
                    .match_pattern()
                    .unwrap_or_else(|| "dispatcher".to_string());
                metrics_client
                    .time_with_tags("request.duration", start.elapsed())
                    .with_tag("route", &route)
                    .with_tag("status", response.status().as_str())
                    .send();
            } else if cfg!(debug_assertions) {
                tracing::warn!(
                    r#type = "web.metrics.no-client",
                    "No metrics client configured, but metrics middleware attached"
                );
            }
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Metrics;
    use actix_web::{get, test, web, App, HttpResponse};
    use cadence::{SpyMetricSink, StatsdClient};

    #[get("/ping")]
    async fn ping() -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    #[actix_rt::test]
    async fn test_request_duration_is_tagged_with_route() {
        let (rx, sink) = SpyMetricSink::new();
        let client = StatsdClient::from_sink("seeker-test", sink);
        let app = test::init_service(
            App::new()
                .app_data(client)
                .wrap(Metrics)
                .service(ping)
                .default_service(web::to(|| async { HttpResponse::NotFound().finish() })),
        )
        .await;

        test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
        test::call_service(&app, test::TestRequest::get().uri("/other").to_request()).await;

        let lines: Vec<String> = rx
            .try_iter()
            .map(|bytes| String::from_utf8(bytes).expect("utf8"))
            .collect();
        assert_eq!(lines.len(), 2, "{:?}", lines);
        assert!(lines[0].starts_with("seeker-test.request.duration:"));
        assert!(lines[0].contains("route:/ping"), "{}", lines[0]);
        assert!(lines[0].contains("status:200"), "{}", lines[0]);
        assert!(lines[1].contains("route:dispatcher"), "{}", lines[1]);
        assert!(lines[1].contains("status:404"), "{}", lines[1]);
    }
}
