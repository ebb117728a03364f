//! In-memory retrieval collaborator for tests.
//!
//! Compiled for this crate's tests, or elsewhere with the `testing` feature.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::models::{RawAuthor, RawRecord};
use crate::sources::RecordSource;

#[derive(Debug, Default)]
struct FakeState {
    calls: usize,
    requested_ids: Vec<String>,
    search_failures: HashMap<String, u32>,
    detail_failures: u32,
}

/// Serves canned search results and records, counting every call.
#[derive(Debug, Default)]
pub struct FakeSource {
    queries: HashMap<String, Vec<String>>,
    records: HashMap<String, RawRecord>,
    /// Extra records returned with any batch containing the key.
    companions: HashMap<String, Vec<RawRecord>>,
    state: Mutex<FakeState>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: &str, ids: &[&str]) -> Self {
        self.queries.insert(query.to_string(), ids.iter().map(|s| s.to_string()).collect());
        self
    }

    /// A record with one author ("Alice Brown") and the given affiliation.
    /// An empty affiliation leaves the record without affiliations.
    pub fn with_record(self, id: &str, affiliation: &str) -> Self {
        let affiliations = if affiliation.is_empty() { vec![] } else { vec![affiliation.to_string()] };
        self.with_raw(RawRecord {
            pmid: Some(id.to_string()),
            title: Some(format!("Paper {id}")),
            abstract_parts: vec![format!("Abstract of paper {id}.")],
            journal: Some("Journal of Tests".to_string()),
            authors: vec![RawAuthor {
                fore_name: Some("Alice".to_string()),
                last_name: Some("Brown".to_string()),
                collective_name: None,
                affiliations,
            }],
            ..Default::default()
        })
    }

    pub fn with_raw(mut self, record: RawRecord) -> Self {
        let id = record.pmid.clone().unwrap_or_default();
        self.records.insert(id, record);
        self
    }

    pub fn with_anonymous_record(self, alongside: &str) -> Self {
        self.with_companion(
            alongside,
            RawRecord {
                title: Some("Record without PMID".to_string()),
                ..Default::default()
            },
        )
    }

    /// Return `record` whenever `alongside` is requested, whatever its own id.
    pub fn with_companion(mut self, alongside: &str, record: RawRecord) -> Self {
        self.companions.entry(alongside.to_string()).or_default().push(record);
        self
    }

    /// Fail the first `times` searches for `query`.
    pub fn failing_searches(self, query: &str, times: u32) -> Self {
        self.lock().search_failures.insert(query.to_string(), times);
        self
    }

    pub fn failing_details(self) -> Self {
        self.failing_details_times(u32::MAX)
    }

    /// Fail the next `times` detail fetches.
    pub fn failing_details_times(self, times: u32) -> Self {
        self.lock().detail_failures = times;
        self
    }

    /// Outbound calls received (searches and detail fetches).
    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    /// Every id passed to `fetch_details`, in order.
    pub fn requested_ids(&self) -> Vec<String> {
        self.lock().requested_ids.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RecordSource for FakeSource {
    async fn search(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<String>> {
        let mut state = self.lock();
        state.calls += 1;
        if let Some(remaining) = state.search_failures.get_mut(query) {
            if *remaining > 0 {
                *remaining -= 1;
                anyhow::bail!("simulated outage for '{query}'");
            }
        }
        let ids = self.queries.get(query).cloned().unwrap_or_default();
        Ok(ids.into_iter().take(max_results).collect())
    }

    async fn fetch_details(&self, ids: &[String]) -> anyhow::Result<Vec<RawRecord>> {
        let mut state = self.lock();
        state.calls += 1;
        if state.detail_failures > 0 {
            state.detail_failures -= 1;
            anyhow::bail!("simulated efetch failure");
        }
        state.requested_ids.extend(ids.iter().cloned());
        let mut records = Vec::new();
        for id in ids {
            if let Some(record) = self.records.get(id) {
                records.push(record.clone());
            }
            if let Some(extra) = self.companions.get(id) {
                records.extend(extra.iter().cloned());
            }
        }
        Ok(records)
    }
}
