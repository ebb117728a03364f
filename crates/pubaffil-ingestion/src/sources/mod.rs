//! Record retrieval collaborators.

pub mod pubmed;

use async_trait::async_trait;

use crate::models::RawRecord;

/// Search and detail-fetch over a bibliographic database.
///
/// Implementations perform exactly one outbound request per call; pacing
/// and retries belong to the caller.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Record identifiers matching `query`, in relevance order.
    async fn search(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<String>>;

    /// Raw records for a batch of identifiers.
    async fn fetch_details(&self, ids: &[String]) -> anyhow::Result<Vec<RawRecord>>;
}
