//! Liveness and readiness probes. They answer directly and never reach the
//! dispatcher.

use actix_web::{get, web, HttpResponse};
use std::sync::atomic::{AtomicBool, Ordering};

/// The health predicates reported by the probes.
#[derive(Debug)]
pub struct Health {
    /// Whether the process is alive.
    live: AtomicBool,
    /// Whether the process should be sent traffic.
    ready: AtomicBool,
}

impl Health {
    /// A process that is alive but not yet ready.
    pub fn new() -> Self {
        Self {
            live: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    /// Whether the process is alive.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Whether the process is ready for traffic.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Set the liveness predicate.
    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::SeqCst);
    }

    /// Set the readiness predicate.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new()
    }
}

/// Registers the probe endpoints.
pub fn configure(config: &mut web::ServiceConfig) {
    config.service(liveness).service(readiness);
}

/// `up` with 200 when the predicate holds, else an empty 503.
fn probe(healthy: bool) -> HttpResponse {
    if healthy {
        HttpResponse::Ok().content_type("text/plain").body("up")
    } else {
        HttpResponse::ServiceUnavailable().finish()
    }
}

/// Whether the process is alive.
#[get("/health/liveness")]
async fn liveness(health: web::Data<Health>) -> HttpResponse {
    probe(health.is_live())
}

/// Whether the process should receive traffic.
#[get("/health/readiness")]
async fn readiness(health: web::Data<Health>) -> HttpResponse {
    probe(health.is_ready())
}

#[cfg(test)]
mod tests {
    use super::{configure, Health};
    use actix_web::{http::StatusCode, test, web::Data, App};
    use std::sync::Arc;

    /// Flip both predicates and check that `path` follows its predicate.
    async fn check_probe(path: &str, set: fn(&Health, bool)) {
        let health = Arc::new(Health::new());
        health.set_ready(true);
        let app = test::init_service(
            App::new()
                .app_data(Data::from(health.clone()))
                .configure(configure),
        )
        .await;

        let response =
            test::call_service(&app, test::TestRequest::get().uri(path).to_request()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(test::read_body(response).await.as_ref(), b"up");

        set(&health, false);
        let response =
            test::call_service(&app, test::TestRequest::get().uri(path).to_request()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(test::read_body(response).await.is_empty());
    }

    #[actix_rt::test]
    async fn test_liveness() {
        check_probe("/health/liveness", Health::set_live).await;
    }

    #[actix_rt::test]
    async fn test_readiness() {
        check_probe("/health/readiness", Health::set_ready).await;
    }

    #[actix_rt::test]
    async fn test_probes_are_independent() {
        let health = Arc::new(Health::new());
        let app = test::init_service(
            App::new()
                .app_data(Data::from(health.clone()))
                .configure(configure),
        )
        .await;

        let live = test::call_service(
            &app,
            test::TestRequest::get().uri("/health/liveness").to_request(),
        )
        .await;
        let ready = test::call_service(
            &app,
            test::TestRequest::get().uri("/health/readiness").to_request(),
        )
        .await;
        assert_eq!(live.status(), StatusCode::OK);
        assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[::core::prelude::v1::test]
    fn test_not_ready_until_told() {
        let health = Health::default();
        assert!(health.is_live());
        assert!(!health.is_ready());
    }
}
