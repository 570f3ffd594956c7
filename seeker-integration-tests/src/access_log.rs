//! Tests for the access log records written for each request.
#![cfg(test)]

use crate::{seeker_test, seeker_test_with, TestingTools};
use anyhow::Result;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use seeker_exchange::{intermediary::AuthCheck, ExchangeRequest, ExchangeResponse, Status};
use std::sync::Arc;

/// The fields every record carries, in the order they are written.
const FIELDS: &[&str] = &[
    "traffic",
    "start",
    "duration",
    "request-id",
    "from",
    "to",
    "method",
    "uri",
    "query",
    "status-code",
    "bytes",
    "encoding",
    "timeout",
    "rate-limit",
    "rate-burst",
    "cc",
    "route",
    "route-to",
    "route-percent",
    "rc",
];

#[actix_rt::test]
async fn one_record_per_request_with_stable_field_order() -> Result<()> {
    seeker_test(
        |_| (),
        |TestingTools {
             test_client,
             access_log,
             ..
         }| async move {
            let response = test_client.get("/search?q=apple&limit=5").send().await?;
            assert_eq!(response.status(), StatusCode::OK);
            let body_length = response.bytes().await?.len();

            let lines = access_log.lines();
            assert_eq!(lines.len(), 1);
            let line = &lines[0];
            let positions: Vec<usize> = FIELDS
                .iter()
                .map(|field| {
                    line.find(&format!("\"{}\":", field))
                        .unwrap_or_else(|| panic!("{} missing from {}", field, line))
                })
                .collect();
            let mut sorted = positions.clone();
            sorted.sort_unstable();
            assert_eq!(positions, sorted, "fields out of order in {}", line);

            let record = &access_log.records()[0];
            assert_eq!(record["traffic"], "internal");
            assert_eq!(record["method"], "GET");
            assert_eq!(record["to"], "search");
            assert_eq!(record["query"], "q=apple&limit=5");
            assert_eq!(record["status-code"], 200);
            assert_eq!(record["bytes"], body_length);
            assert_eq!(record["encoding"], "");
            assert_eq!(record["timeout"], 1000);
            assert_eq!(record["rate-limit"], -1);
            assert_eq!(record["rate-burst"], -1);
            assert_eq!(record["cc"], "");
            assert_eq!(record["route"], "search");
            assert_eq!(record["route-percent"], 100);
            assert_eq!(record["rc"], "OK");
            assert!(record["uri"]
                .as_str()
                .map_or(false, |uri| uri.starts_with("http://") && uri.ends_with("/search")));
            assert!(record["start"]
                .as_str()
                .map_or(false, |start| start.ends_with('Z') && start.len() == 24));
            assert!(record.get("region").is_none());
            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn rate_policy_is_reported_verbatim() -> Result<()> {
    seeker_test(
        |settings| {
            let search = settings
                .authorities
                .get_mut("search")
                .expect("search authority");
            search.rate_limit = Some(0.0);
            search.rate_burst = Some(20);
            search.traffic = "ingress".to_string();
        },
        |TestingTools {
             test_client,
             access_log,
             ..
         }| async move {
            test_client.get("/search?q=apple").send().await?;

            let record = &access_log.records()[0];
            assert_eq!(record["rate-limit"], 0);
            assert_eq!(record["rate-burst"], 20);
            assert_eq!(record["traffic"], "ingress");
            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn request_ids_are_carried_into_the_record() -> Result<()> {
    seeker_test(
        |_| (),
        |TestingTools {
             test_client,
             access_log,
             ..
         }| async move {
            test_client
                .get("/search?q=apple")
                .header("X-Request-Id", "abc-123")
                .send()
                .await?;
            test_client.get("/search?q=apple").send().await?;

            let records = access_log.records();
            assert_eq!(records[0]["request-id"], "abc-123");
            // Without a header, the server's own request ID is used.
            assert!(records[1]["request-id"]
                .as_str()
                .map_or(false, |id| !id.is_empty()));
            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn failures_are_logged_with_their_status() -> Result<()> {
    seeker_test(
        |_| (),
        |TestingTools {
             test_client,
             access_log,
             ..
         }| async move {
            let response = test_client.get("/search").send().await?;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let records = access_log.records();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0]["status-code"], 400);
            assert_eq!(records[0]["bytes"], 0);
            Ok(())
        },
    )
    .await
}

/// Rejects requests without an `Authorization` header.
struct RequireAuthorization;

#[async_trait]
impl AuthCheck for RequireAuthorization {
    async fn check(&self, request: &ExchangeRequest) -> (ExchangeResponse, Status) {
        if request.headers.contains_key(http::header::AUTHORIZATION) {
            (ExchangeResponse::empty(), Status::ok())
        } else {
            (ExchangeResponse::empty(), Status::unauthorized())
        }
    }
}

#[actix_rt::test]
async fn auth_rejections_short_circuit_and_are_logged() -> Result<()> {
    seeker_test_with(
        |_| (),
        |builder| builder.auth_check(Arc::new(RequireAuthorization)),
        |TestingTools {
             test_client,
             access_log,
             ..
         }| async move {
            let response = test_client.get("/search?q=apple").send().await?;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(response.text().await?, "");

            let response = test_client
                .get("/search?q=apple")
                .header("Authorization", "Bearer token")
                .send()
                .await?;
            assert_eq!(response.status(), StatusCode::OK);

            let records = access_log.records();
            assert_eq!(records.len(), 2);
            assert_eq!(records[0]["status-code"], 401);
            assert_eq!(records[0]["bytes"], 0);
            assert_eq!(records[1]["status-code"], 200);
            Ok(())
        },
    )
    .await
}
