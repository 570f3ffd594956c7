//! A search provider that answers from a fixed list of results.
//!
//! It is meant to be used in development and testing.

use crate::{SearchError, SearchProvider, SearchQuery, SearchResult, SetupError};
use anyhow::anyhow;
use async_trait::async_trait;
use seeker_settings::FixedConfig;

/// Matches queries against the titles of a configured list of results.
pub struct FixedProvider {
    /// The results, in configured order.
    results: Vec<SearchResult>,
}

impl FixedProvider {
    /// Create a provider from settings.
    ///
    /// # Errors
    /// If any configured result has an empty title or URL.
    pub fn new_boxed(config: &FixedConfig) -> Result<Box<Self>, SetupError> {
        let mut results = Vec::with_capacity(config.results.len());
        for result in &config.results {
            if result.title.trim().is_empty() || result.url.trim().is_empty() {
                return Err(SetupError::InvalidConfiguration(anyhow!(
                    "fixed results need a title and a url, got {:?}",
                    result
                )));
            }
            results.push(SearchResult {
                title: result.title.clone(),
                url: result.url.clone(),
                snippet: result.snippet.clone(),
            });
        }
        Ok(Box::new(Self { results }))
    }
}

#[async_trait]
impl SearchProvider for FixedProvider {
    fn name(&self) -> String {
        format!("FixedProvider({})", self.results.len())
    }

    async fn search(&self, query: SearchQuery) -> Result<Vec<SearchResult>, SearchError> {
        let needle = query.query.to_lowercase();
        Ok(self
            .results
            .iter()
            .filter(|result| result.title.to_lowercase().contains(&needle))
            .take(query.limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::FixedProvider;
    use crate::{SearchProvider, SearchQuery};
    use pretty_assertions::assert_eq;
    use seeker_settings::{FixedConfig, FixedResult};

    fn config(titles: &[&str]) -> FixedConfig {
        FixedConfig {
            results: titles
                .iter()
                .map(|title| FixedResult {
                    title: title.to_string(),
                    url: format!("https://example.com/{}", title.to_lowercase()),
                    snippet: String::new(),
                })
                .collect(),
        }
    }

    fn query(text: &str, limit: usize) -> SearchQuery {
        SearchQuery {
            query: text.to_string(),
            limit,
        }
    }

    #[tokio::test]
    async fn test_matches_titles_case_insensitively() {
        let provider =
            FixedProvider::new_boxed(&config(&["Apple", "Pineapple", "Banana"])).expect("valid");

        let titles: Vec<String> = provider
            .search(query("APPLE", 10))
            .await
            .expect("search should succeed")
            .into_iter()
            .map(|result| result.title)
            .collect();

        assert_eq!(titles, vec!["Apple", "Pineapple"]);
    }

    #[tokio::test]
    async fn test_limit() {
        let provider =
            FixedProvider::new_boxed(&config(&["Apple", "Pineapple", "Banana"])).expect("valid");

        let results = provider.search(query("a", 2)).await.expect("search");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Apple");
    }

    #[test]
    fn test_rejects_results_without_a_title() {
        assert!(FixedProvider::new_boxed(&config(&["Apple", " "])).is_err());
    }

    #[test]
    fn test_name() {
        let provider = FixedProvider::new_boxed(&config(&["Apple"])).expect("valid");
        assert_eq!(provider.name(), "FixedProvider(1)");
    }
}
