#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! Search for [Seeker](../seeker/index.html).
//!
//! A [`SearchProvider`] answers queries. A [`SearchExchange`] adapts a provider
//! to the exchange pipeline so it can be registered under an authority.

mod exchange;
mod maker;
mod providers;

pub use crate::{
    exchange::SearchExchange,
    maker::make_provider,
    providers::{fixed::FixedProvider, NullProvider},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The most results a single response may carry.
pub const MAX_LIMIT: usize = 50;

/// A query for a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// The text being searched for. Never empty.
    pub query: String,

    /// The most results to return, at most [`MAX_LIMIT`].
    pub limit: usize,
}

/// A single search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// The title of the page.
    pub title: String,

    /// Where the result points.
    pub url: String,

    /// A short description of the page.
    pub snippet: String,
}

/// The body of a search response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// The query that was answered.
    pub query: String,

    /// The name of the provider that answered.
    pub provider: String,

    /// The matching results, best first.
    pub results: Vec<SearchResult>,
}

/// A backend that can answer search queries.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// An operator facing name for this provider.
    fn name(&self) -> String;

    /// Answer a query.
    async fn search(&self, query: SearchQuery) -> Result<Vec<SearchResult>, SearchError>;
}

/// Errors that may occur while setting up a provider.
#[derive(Debug, Error)]
#[allow(missing_docs, clippy::missing_docs_in_private_items)]
pub enum SetupError {
    #[error("This search provider cannot be used with the current Seeker configuration")]
    InvalidConfiguration(#[source] anyhow::Error),
}

/// Errors that may occur while answering a query.
#[derive(Debug, Error)]
#[allow(missing_docs, clippy::missing_docs_in_private_items)]
pub enum SearchError {
    #[error("There was a network error while searching: {0}")]
    Network(#[source] anyhow::Error),

    #[error("There was an internal error in the search provider: {0}")]
    Internal(#[source] anyhow::Error),
}
