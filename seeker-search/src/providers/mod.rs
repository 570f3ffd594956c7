//! The search providers Seeker can be configured with.

pub(crate) mod fixed;

use crate::{SearchError, SearchProvider, SearchQuery, SearchResult};
use async_trait::async_trait;

/// A provider that never finds anything.
pub struct NullProvider;

#[async_trait]
impl SearchProvider for NullProvider {
    fn name(&self) -> String {
        "NullProvider".into()
    }

    async fn search(&self, _query: SearchQuery) -> Result<Vec<SearchResult>, SearchError> {
        Ok(vec![])
    }
}
