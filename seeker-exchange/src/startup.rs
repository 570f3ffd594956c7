//! The startup handshake with resources, run before the listener opens.

use async_trait::async_trait;
use futures::{stream::FuturesUnordered, StreamExt};
use serde_json::Value;
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;

/// Something that must accept its startup configuration before the process
/// begins serving requests.
#[async_trait]
pub trait Resource: Send + Sync {
    /// The name used to look up this resource's startup message.
    fn name(&self) -> String;

    /// Accept the startup message. `message` is `null` if nothing was
    /// configured for this resource.
    async fn startup(&self, message: Value) -> anyhow::Result<()>;
}

/// Errors from the startup handshake. Any of them means the process must not
/// start serving.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Some resources did not answer within the budget.
    #[error("startup did not complete within {budget:?}, still waiting on {pending:?}")]
    Timeout {
        /// The budget that ran out.
        budget: Duration,
        /// The resources that had not answered.
        pending: Vec<String>,
    },

    /// A resource rejected its startup message.
    #[error("resource {resource:?} failed to start")]
    Failed {
        /// The resource that failed.
        resource: String,
        /// Why it failed.
        #[source]
        source: anyhow::Error,
    },
}

/// Send every resource its startup message and wait for all of them to
/// accept it.
///
/// Messages are sent concurrently. The whole handshake must finish within
/// `budget`; resources that are still running when it expires are cancelled.
///
/// # Errors
/// If any resource fails, or if the budget runs out first.
pub async fn startup(
    resources: &[Arc<dyn Resource>],
    messages: &HashMap<String, Value>,
    budget: Duration,
) -> Result<(), StartupError> {
    let mut pending: BTreeSet<String> = resources.iter().map(|r| r.name()).collect();
    let mut acknowledgements: FuturesUnordered<_> = resources
        .iter()
        .map(|resource| async move {
            let name = resource.name();
            let message = messages.get(&name).cloned().unwrap_or(Value::Null);
            let result = resource.startup(message).await;
            (name, result)
        })
        .collect();

    let deadline = tokio::time::sleep(budget);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            next = acknowledgements.next() => match next {
                None => break,
                Some((name, Ok(()))) => {
                    tracing::info!(
                        r#type = "exchange.startup.acknowledged",
                        resource = %name,
                        "Resource acknowledged startup"
                    );
                    pending.remove(&name);
                }
                Some((name, Err(source))) => {
                    tracing::error!(
                        r#type = "exchange.startup.failed",
                        resource = %name,
                        error = %format!("{:#}", source),
                        "Resource failed to start"
                    );
                    return Err(StartupError::Failed {
                        resource: name,
                        source,
                    });
                }
            },
            _ = &mut deadline => {
                let pending: Vec<String> = pending.into_iter().collect();
                tracing::error!(
                    r#type = "exchange.startup.timeout",
                    ?budget,
                    ?pending,
                    "Startup handshake timed out"
                );
                return Err(StartupError::Timeout { budget, pending });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{startup, Resource, StartupError};
    use anyhow::bail;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
        time::Duration,
    };

    /// Takes `delay` to start, and remembers the message it received.
    struct Probe {
        name: &'static str,
        delay: Duration,
        fail: bool,
        received: Mutex<Option<Value>>,
    }

    impl Probe {
        fn new(name: &'static str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name,
                delay,
                fail: false,
                received: Mutex::new(None),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                delay: Duration::ZERO,
                fail: true,
                received: Mutex::new(None),
            })
        }

        fn received(&self) -> Option<Value> {
            self.received.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Resource for Probe {
        fn name(&self) -> String {
            self.name.to_string()
        }

        async fn startup(&self, message: Value) -> anyhow::Result<()> {
            *self.received.lock().unwrap() = Some(message);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                bail!("configuration rejected");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_all_resources_receive_their_message() {
        let search = Probe::new("search", Duration::from_millis(5));
        let other = Probe::new("other", Duration::ZERO);
        let resources: Vec<Arc<dyn Resource>> = vec![search.clone(), other.clone()];
        let mut messages = HashMap::new();
        messages.insert("search".to_string(), json!({"region": "us"}));

        startup(&resources, &messages, Duration::from_secs(1))
            .await
            .expect("startup should succeed");

        assert_eq!(search.received(), Some(json!({"region": "us"})));
        assert_eq!(other.received(), Some(Value::Null));
    }

    #[tokio::test]
    async fn test_no_resources() {
        startup(&[], &HashMap::new(), Duration::from_millis(1))
            .await
            .expect("nothing to wait for");
    }

    #[tokio::test]
    async fn test_timeout_names_pending_resources() {
        let resources: Vec<Arc<dyn Resource>> = vec![
            Probe::new("fast", Duration::ZERO),
            Probe::new("slow", Duration::from_secs(10)),
        ];

        let error = startup(&resources, &HashMap::new(), Duration::from_millis(50))
            .await
            .expect_err("startup should time out");

        match error {
            StartupError::Timeout { budget, pending } => {
                assert_eq!(budget, Duration::from_millis(50));
                assert_eq!(pending, vec!["slow".to_string()]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_aborts() {
        let resources: Vec<Arc<dyn Resource>> = vec![
            Probe::new("slow", Duration::from_secs(10)),
            Probe::failing("broken"),
        ];

        let error = startup(&resources, &HashMap::new(), Duration::from_secs(1))
            .await
            .expect_err("startup should fail");

        assert!(
            matches!(&error, StartupError::Failed { resource, .. } if resource == "broken"),
            "unexpected error: {}",
            error
        );
    }
}
