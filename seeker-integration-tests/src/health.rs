//! Tests for the liveness and readiness probes, and graceful shutdown.
#![cfg(test)]

use crate::{seeker_test, TestingTools};
use anyhow::Result;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use std::time::Duration;

#[actix_rt::test]
async fn probes_answer_up_once_started() -> Result<()> {
    seeker_test(
        |_| (),
        |TestingTools { test_client, .. }| async move {
            for path in ["/health/liveness", "/health/readiness"] {
                let response = test_client.get(path).send().await?;
                assert_eq!(response.status(), StatusCode::OK, "{}", path);
                assert_eq!(response.text().await?, "up");
            }
            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn unhealthy_probes_answer_empty() -> Result<()> {
    seeker_test(
        |_| (),
        |TestingTools {
             test_client,
             health,
             ..
         }| async move {
            health.set_live(false);
            let response = test_client.get("/health/liveness").send().await?;
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(response.text().await?, "");

            // Readiness is a separate predicate.
            let response = test_client.get("/health/readiness").send().await?;
            assert_eq!(response.status(), StatusCode::OK);

            health.set_ready(false);
            let response = test_client.get("/health/readiness").send().await?;
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(response.text().await?, "");
            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn probes_do_not_reach_the_dispatcher() -> Result<()> {
    seeker_test(
        |_| (),
        |TestingTools {
             test_client,
             access_log,
             ..
         }| async move {
            test_client.get("/health/liveness").send().await?;
            test_client.get("/health/readiness").send().await?;
            assert!(access_log.lines().is_empty());
            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn shutdown_flips_readiness_and_stops_serving() -> Result<()> {
    seeker_test(
        |_| (),
        |TestingTools {
             test_client,
             health,
             server_handle,
             ..
         }| async move {
            assert!(health.is_ready());

            let (trigger, signal) = tokio::sync::oneshot::channel::<()>();
            let shutdown = tokio::spawn(seeker_web::shutdown_on(
                async move {
                    let _ = signal.await;
                },
                server_handle,
                health.clone(),
            ));

            let _ = trigger.send(());
            tokio::time::timeout(Duration::from_secs(5), shutdown).await??;

            assert!(!health.is_ready());
            assert!(health.is_live());
            assert!(test_client.get("/health/liveness").send().await.is_err());
            Ok(())
        },
    )
    .await
}
