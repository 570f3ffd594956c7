//! Tests for the search authority.
#![cfg(test)]

use crate::{seeker_test, TestingTools};
use anyhow::Result;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[actix_rt::test]
async fn search_returns_matching_results() -> Result<()> {
    seeker_test(
        |_| (),
        |TestingTools { test_client, .. }| async move {
            let response = test_client.get("/search?q=apple").send().await?;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response
                    .headers()
                    .get_all("content-type")
                    .iter()
                    .collect::<Vec<_>>(),
                vec!["application/json"]
            );

            let body: Value = response.json().await?;
            assert_eq!(
                body,
                json!({
                    "query": "apple",
                    "provider": "FixedProvider(3)",
                    "results": [
                        {
                            "title": "Apple",
                            "url": "https://example.com/apple",
                            "snippet": "A red fruit.",
                        },
                        {
                            "title": "Pineapple",
                            "url": "https://example.com/pineapple",
                            "snippet": "A tropical fruit.",
                        },
                    ],
                })
            );
            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn search_respects_limit() -> Result<()> {
    seeker_test(
        |_| (),
        |TestingTools { test_client, .. }| async move {
            let body: Value = test_client
                .get("/search?q=a&limit=2")
                .send()
                .await?
                .json()
                .await?;
            assert_eq!(body["results"].as_array().map(Vec::len), Some(2));
            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn search_without_a_query_is_a_bad_request() -> Result<()> {
    seeker_test(
        |_| (),
        |TestingTools { test_client, .. }| async move {
            for path in ["/search", "/search?q=", "/search?q=a&limit=0"] {
                let response = test_client.get(path).send().await?;
                assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", path);
            }
            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn startup_message_configures_the_search_authority() -> Result<()> {
    seeker_test(
        |settings| {
            settings
                .startup
                .resources
                .insert("search".to_string(), json!({ "default_limit": 1 }));
        },
        |TestingTools { test_client, .. }| async move {
            let body: Value = test_client.get("/search?q=a").send().await?.json().await?;
            assert_eq!(body["results"].as_array().map(Vec::len), Some(1));
            Ok(())
        },
    )
    .await
}
