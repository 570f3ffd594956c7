#![warn(missing_docs, clippy::missing_docs_in_private_items)]
// None of the tests are seen by the linter, so none of the utilities are marked
// as used. But docs don't generate for the below if they are `#[cfg(test)]`.
// This is a compromise.
#![allow(dead_code)]

//! Tests for Seeker that work by reading from the external API only.
//!
//! The paths, status codes, and access log fields used in tests here are
//! Seeker's public contract, and are kept stable on purpose.
//!
//! This is structured as a separate crate so that it produces a single test
//! binary instead of one test per file like would happen if this were
//! `seeker/tests/...`. This improves compilation and test times.
//!
//! The primary tool used by tests is [`seeker_test`], which builds the
//! pipeline, starts a server, and provides helpers to inspect the state of the
//! app. It then calls the test function that is passed to it, providing the
//! above tools as an argument.
//!
//! ```no_run
//! use seeker_integration_tests::{seeker_test, TestingTools};
//! use reqwest::StatusCode;
//!
//! # actix_rt::System::new().block_on(async {
//! seeker_test(
//!     |_| (),
//!     |TestingTools { test_client, .. }| async move {
//!         let response = test_client
//!             .get("/health/liveness")
//!             .send()
//!             .await
//!             .expect("failed to execute request");
//!
//!         assert_eq!(response.status(), StatusCode::OK);
//!     },
//! )
//! .await;
//! # })
//! ```

mod access_log;
mod dispatch;
mod health;
mod search;
mod startup;
mod utils;

pub use crate::utils::{
    exchanges::{Explodes, Sleepy},
    logging::{LogWatcher, TracingJsonEvent},
    metrics::MetricsWatcher,
    test_tools::{seeker_test, seeker_test_with, TestReqwestClient, TestingTools},
};
