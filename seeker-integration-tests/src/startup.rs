//! Tests for the startup handshake. A failed handshake must stop the process
//! before it listens.
#![cfg(test)]

use crate::{seeker_test_with, Sleepy, TestingTools};
use anyhow::{bail, Result};
use async_trait::async_trait;
use cadence::{NopMetricSink, StatsdClient};
use pretty_assertions::assert_eq;
use seeker_exchange::{Resource, StartupError};
use seeker_settings::Settings;
use seeker_web::{PipelineBuilder, PipelineError};
use serde_json::{json, Value};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

/// A resource that records its message, and optionally never answers.
struct Recorder {
    /// The resource name.
    name: &'static str,
    /// Whether to hang instead of answering.
    hang: bool,
    /// Whether to refuse the message.
    refuse: bool,
    /// The message received.
    received: Mutex<Option<Value>>,
}

impl Recorder {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            hang: false,
            refuse: false,
            received: Mutex::new(None),
        })
    }

    fn hanging(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            hang: true,
            refuse: false,
            received: Mutex::new(None),
        })
    }

    fn refusing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            hang: false,
            refuse: true,
            received: Mutex::new(None),
        })
    }
}

#[async_trait]
impl Resource for Recorder {
    fn name(&self) -> String {
        self.name.to_string()
    }

    async fn startup(&self, message: Value) -> Result<()> {
        *self.received.lock().expect("poisoned") = Some(message);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.refuse {
            bail!("not today");
        }
        Ok(())
    }
}

fn metrics() -> StatsdClient {
    StatsdClient::from_sink("", NopMetricSink)
}

#[actix_rt::test]
async fn resources_receive_their_startup_message() -> Result<()> {
    let recorder = Recorder::new("recorder");
    let resource = recorder.clone();
    seeker_test_with(
        |settings| {
            settings
                .startup
                .resources
                .insert("recorder".to_string(), json!({ "region": "eu" }));
        },
        move |builder| builder.resource(resource),
        |TestingTools { mut log_watcher, .. }| async move {
            assert_eq!(
                *recorder.received.lock().expect("poisoned"),
                Some(json!({ "region": "eu" }))
            );
            assert!(log_watcher.has(|event| event.is_type("exchange.startup.acknowledged")
                && event.field_contains("resource", "recorder")));
            assert!(log_watcher.has(|event| event.is_type("web.pipeline.ready")));
            Ok(())
        },
    )
    .await
}

#[actix_rt::test]
async fn unanswered_startup_times_out() {
    let settings = Settings::load_for_tests(|settings| {
        settings.host.startup_timeout = Duration::from_millis(100);
    });

    let error = PipelineBuilder::new(&settings, metrics())
        .resource(Recorder::new("quick"))
        .resource(Recorder::hanging("stuck"))
        .build()
        .await
        .err()
        .expect("startup should time out");

    match error {
        PipelineError::Startup(StartupError::Timeout { budget, pending }) => {
            assert_eq!(budget, Duration::from_millis(100));
            assert_eq!(pending, vec!["stuck".to_string()]);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[actix_rt::test]
async fn refused_startup_is_fatal() {
    let settings = Settings::load_for_tests(|_| ());

    let error = PipelineBuilder::new(&settings, metrics())
        .resource(Recorder::refusing("picky"))
        .build()
        .await
        .err()
        .expect("startup should fail");

    assert!(matches!(
        error,
        PipelineError::Startup(StartupError::Failed { ref resource, .. }) if resource == "picky"
    ));
}

#[actix_rt::test]
async fn duplicate_authorities_are_fatal() {
    let settings = Settings::load_for_tests(|_| ());

    let error = PipelineBuilder::new(&settings, metrics())
        .exchange(
            "search",
            Box::new(Sleepy::new(Duration::ZERO)),
            seeker_exchange::Registration::new("internal"),
        )
        .build()
        .await
        .err()
        .expect("registration should fail");

    assert!(matches!(
        error,
        PipelineError::Registry(seeker_exchange::RegistryError::Duplicate(ref name)) if name == "search"
    ));
}
