//! Exchanges with unusual behavior, for tests that need a misbehaving
//! authority.

use async_trait::async_trait;
use seeker_exchange::{Exchange, ExchangeRequest, ExchangeResponse, Status};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

/// Answers `slept` after waiting.
#[derive(Clone)]
pub struct Sleepy {
    /// How long to wait before answering.
    pub delay: Duration,
    /// How many exchanges ran to completion.
    pub completed: Arc<AtomicUsize>,
}

impl Sleepy {
    /// Wait `delay` before answering.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// How many exchanges ran to completion.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Exchange for Sleepy {
    fn name(&self) -> String {
        format!("Sleepy({:?})", self.delay)
    }

    async fn exchange(&self, _request: ExchangeRequest) -> (ExchangeResponse, Status) {
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        (ExchangeResponse::new("slept"), Status::ok())
    }
}

/// Panics on every request.
pub struct Explodes;

#[async_trait]
impl Exchange for Explodes {
    fn name(&self) -> String {
        "Explodes".into()
    }

    async fn exchange(&self, _request: ExchangeRequest) -> (ExchangeResponse, Status) {
        panic!("this exchange always panics");
    }
}
