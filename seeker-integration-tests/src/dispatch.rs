//! Tests for how requests are resolved to authorities.
#![cfg(test)]

use crate::{seeker_test, seeker_test_with, Explodes, Sleepy, TestingTools};
use anyhow::Result;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use seeker_exchange::Registration;
use seeker_settings::RouteSettings;
use std::time::Duration;

#[actix_rt::test]
async fn unmatched_paths_are_not_found() -> Result<()> {
    seeker_test(
        |_| (),
        |TestingTools {
             test_client,
             access_log,
             mut metrics_watcher,
             ..
         }| async move {
            let response = test_client.get("/nowhere/at/all?x=1").send().await?;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(response.text().await?, "");

            let records = access_log.records();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0]["rc"], "NM");
            assert_eq!(records[0]["to"], "");
            assert_eq!(records[0]["status-code"], 404);
            assert_eq!(records[0]["query"], "x=1");

            assert!(metrics_watcher.has_named("dispatch.miss"));
            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn prefix_must_match_whole_segments() -> Result<()> {
    seeker_test(
        |_| (),
        |TestingTools { test_client, .. }| async move {
            let response = test_client.get("/searching?q=apple").send().await?;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);

            let response = test_client.get("/search/more?q=apple").send().await?;
            assert_eq!(response.status(), StatusCode::OK);
            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn default_authority_answers_unmatched_paths() -> Result<()> {
    seeker_test(
        |settings| settings.dispatch.default_authority = Some("search".to_string()),
        |TestingTools {
             test_client,
             access_log,
             ..
         }| async move {
            let response = test_client.get("/anything?q=banana").send().await?;
            assert_eq!(response.status(), StatusCode::OK);

            let records = access_log.records();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0]["rc"], "DF");
            assert_eq!(records[0]["to"], "search");
            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn first_segment_names_an_authority() -> Result<()> {
    seeker_test_with(
        |settings| settings.dispatch.routes.clear(),
        |builder| {
            builder.exchange(
                "sleepy",
                Box::new(Sleepy::new(Duration::ZERO)),
                Registration::new("internal"),
            )
        },
        |TestingTools {
             test_client,
             access_log,
             ..
         }| async move {
            let response = test_client.get("/sleepy/anything").send().await?;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.text().await?, "slept");

            let response = test_client.get("/search?q=apple").send().await?;
            assert_eq!(response.status(), StatusCode::OK);

            let records = access_log.records();
            assert_eq!(records.len(), 2);
            assert_eq!(records[0]["to"], "sleepy");
            assert_eq!(records[0]["rc"], "OK");
            assert_eq!(records[1]["to"], "search");
            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn longest_prefix_wins() -> Result<()> {
    seeker_test_with(
        |settings| {
            settings.dispatch.routes.push(RouteSettings {
                name: "slow-lane".to_string(),
                prefix: "/search/slow".to_string(),
                authority: "sleepy".to_string(),
                from: Some("frontend".to_string()),
                to: Some("sleepy-v2".to_string()),
                percent: 25,
            });
        },
        |builder| {
            builder.exchange(
                "sleepy",
                Box::new(Sleepy::new(Duration::ZERO)),
                Registration::new("internal"),
            )
        },
        |TestingTools {
             test_client,
             access_log,
             ..
         }| async move {
            let response = test_client.get("/search/slow/lane").send().await?;
            assert_eq!(response.text().await?, "slept");

            let records = access_log.records();
            assert_eq!(records[0]["route"], "slow-lane");
            assert_eq!(records[0]["route-to"], "sleepy-v2");
            assert_eq!(records[0]["route-percent"], 25);
            assert_eq!(records[0]["from"], "frontend");
            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn a_panicking_exchange_fails_only_its_request() -> Result<()> {
    seeker_test_with(
        |_| (),
        |builder| builder.exchange("boom", Box::new(Explodes), Registration::new("internal")),
        |TestingTools {
             test_client,
             access_log,
             ..
         }| async move {
            let response = test_client.get("/boom").send().await?;
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

            let records = access_log.records();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0]["status-code"], 500);
            assert_eq!(records[0]["to"], "boom");
            // The record carries the policy the registration ran under.
            assert_eq!(records[0]["traffic"], "internal");
            assert_eq!(records[0]["timeout"], 1000);

            let response = test_client.get("/search?q=apple").send().await?;
            assert_eq!(response.status(), StatusCode::OK);
            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn host_timeout_cancels_slow_exchanges() -> Result<()> {
    let sleepy = Sleepy::new(Duration::from_secs(2));
    let observer = sleepy.clone();
    seeker_test_with(
        |settings| settings.host.timeout = Some(Duration::from_millis(50)),
        move |builder| builder.exchange("sleepy", Box::new(sleepy), Registration::new("egress")),
        |TestingTools {
             test_client,
             access_log,
             ..
         }| async move {
            let response = test_client.get("/sleepy").send().await?;
            assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
            assert_eq!(response.text().await?, "");

            let records = access_log.records();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0]["cc"], "TO");
            assert_eq!(records[0]["timeout"], 50);
            assert_eq!(records[0]["traffic"], "egress");
            assert!(records[0]["duration"].as_u64().unwrap_or_default() >= 50);

            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(observer.completed(), 0);
            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn oversized_bodies_are_rejected_and_logged() -> Result<()> {
    seeker_test(
        |settings| settings.http.max_body_kb = 1,
        |TestingTools {
             test_client,
             access_log,
             ..
         }| async move {
            let response = test_client
                .request(reqwest::Method::POST, "/search?q=apple")
                .body(vec![b'x'; 4096])
                .send()
                .await?;
            assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

            let response = test_client
                .request(reqwest::Method::POST, "/search?q=apple")
                .body(vec![b'x'; 512])
                .send()
                .await?;
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

            let records = access_log.records();
            assert_eq!(records.len(), 2);
            assert_eq!(records[0]["status-code"], 413);
            assert_eq!(records[0]["method"], "POST");
            assert_eq!(records[0]["to"], "search");
            assert_eq!(records[0]["traffic"], "internal");
            assert_eq!(records[0]["rc"], "OK");
            assert_eq!(records[1]["status-code"], 405);
            Ok(())
        },
    )
    .await
}
