//! Multi-query batch aggregation.
//!
//! Queries run one after another through a single [`FetchPipeline`], so the
//! minimum delay between requests holds across query boundaries too. A query
//! that fails after exhausting its retries is recorded and the batch moves on.
//! Its partially fetched papers are discarded, so every query either
//! contributes all of its papers or none.
//!
//! Results accumulate in a [`BatchBuilder`]; statistics are computed once by
//! [`BatchBuilder::finish`] and are read-only afterwards.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pubaffil_common::{DedupMode, PubaffilError, Result};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::models::Paper;
use crate::pipeline::FetchPipeline;
use crate::sources::RecordSource;

/// How many journals the summary lists.
const TOP_JOURNALS: usize = 10;

/// Bucket for papers whose publication date has no leading year.
pub const UNKNOWN_YEAR: &str = "unknown";

pub type DedupPolicy = DedupMode;

// ── Cancellation ──────────────────────────────────────────────────────────────

/// Cooperative stop signal, checked before each query starts.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Results ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryStatus {
    Completed,
    Failed { error: String },
    /// Skipped because a stop was requested.
    NotAttempted,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub query: String,
    pub status: QueryStatus,
    /// Papers kept for export after deduplication.
    pub papers: Vec<Paper>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryStats {
    pub query: String,
    /// Papers the pipeline returned for this query.
    pub retrieved: usize,
    pub kept: usize,
    /// Retrieved papers already seen under an earlier query.
    pub duplicates: usize,
    pub industry: usize,
    pub industry_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryFailure {
    pub query: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    /// Papers retrieved over all completed queries, before deduplication.
    /// `total_papers - distinct_papers == duplicate_count` under either policy.
    pub total_papers: usize,
    /// Rows in the export.
    pub exported_papers: usize,
    pub distinct_papers: usize,
    /// Industry-affiliated distinct papers.
    pub industry_count: usize,
    pub industry_rate: f64,
    pub duplicate_count: usize,
    pub per_query: Vec<QueryStats>,
    pub failures: Vec<QueryFailure>,
    pub not_attempted: Vec<String>,
    /// Most frequent journals, by count then name.
    pub top_journals: Vec<(String, usize)>,
    pub papers_per_year: BTreeMap<String, usize>,
}

impl Statistics {
    /// Log a human-readable summary at `info`.
    pub fn log_summary(&self) {
        info!(
            total = self.total_papers,
            exported = self.exported_papers,
            distinct = self.distinct_papers,
            industry = self.industry_count,
            rate = %format!("{:.1}%", self.industry_rate * 100.0),
            duplicates = self.duplicate_count,
            failed = self.failures.len(),
            not_attempted = self.not_attempted.len(),
            "Batch summary"
        );
        for q in &self.per_query {
            info!(
                query = %q.query,
                retrieved = q.retrieved,
                kept = q.kept,
                duplicates = q.duplicates,
                industry = q.industry,
                rate = %format!("{:.1}%", q.industry_rate * 100.0),
                "Query summary"
            );
        }
        for f in &self.failures {
            warn!(query = %f.query, error = %f.error, "Query failed");
        }
        for (journal, count) in &self.top_journals {
            info!(journal = %journal, count, "Top journal");
        }
        for (year, count) in &self.papers_per_year {
            info!(year = %year, count, "Papers per year");
        }
    }
}

/// Finalized outcome of a batch run.
#[derive(Debug, Clone)]
pub struct BatchResult {
    outcomes: Vec<QueryOutcome>,
    statistics: Statistics,
}

impl BatchResult {
    /// Per-query outcomes in the order the queries were given.
    pub fn outcomes(&self) -> &[QueryOutcome] {
        &self.outcomes
    }

    /// All kept papers, query by query.
    pub fn papers(&self) -> impl Iterator<Item = &Paper> {
        self.outcomes.iter().flat_map(|o| o.papers.iter())
    }

    /// Papers kept for the first outcome of `query`.
    pub fn papers_for(&self, query: &str) -> Option<&[Paper]> {
        self.outcomes.iter().find(|o| o.query == query).map(|o| o.papers.as_slice())
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn is_empty(&self) -> bool {
        self.statistics.exported_papers == 0
    }
}

// ── Accumulation ──────────────────────────────────────────────────────────────

/// Accumulates per-query outcomes; nothing here is fallible.
#[derive(Debug)]
pub struct BatchBuilder {
    dedup: DedupPolicy,
    outcomes: Vec<QueryOutcome>,
    per_query: Vec<QueryStats>,
    seen: HashSet<String>,
    duplicate_count: usize,
}

impl BatchBuilder {
    pub fn new(dedup: DedupPolicy) -> Self {
        Self {
            dedup,
            outcomes: Vec::new(),
            per_query: Vec::new(),
            seen: HashSet::new(),
            duplicate_count: 0,
        }
    }

    pub fn record_success(&mut self, query: &str, papers: Vec<Paper>) {
        let retrieved = papers.len();
        let industry = papers.iter().filter(|p| p.has_industry_affiliation() == Some(true)).count();
        let mut duplicates = 0;
        let mut kept = Vec::with_capacity(papers.len());
        for paper in papers {
            if self.seen.insert(paper.id.clone()) {
                kept.push(paper);
                continue;
            }
            duplicates += 1;
            if self.dedup == DedupMode::KeepAll {
                kept.push(paper);
            }
        }
        self.duplicate_count += duplicates;

        self.per_query.push(QueryStats {
            query: query.to_string(),
            retrieved,
            kept: kept.len(),
            duplicates,
            industry,
            industry_rate: rate(industry, retrieved),
        });
        self.outcomes.push(QueryOutcome {
            query: query.to_string(),
            status: QueryStatus::Completed,
            papers: kept,
        });
    }

    pub fn record_failure(&mut self, query: &str, error: &PubaffilError) {
        self.outcomes.push(QueryOutcome {
            query: query.to_string(),
            status: QueryStatus::Failed { error: error.to_string() },
            papers: Vec::new(),
        });
    }

    pub fn mark_not_attempted(&mut self, query: &str) {
        self.outcomes.push(QueryOutcome {
            query: query.to_string(),
            status: QueryStatus::NotAttempted,
            papers: Vec::new(),
        });
    }

    /// Compute the statistics and seal the result.
    pub fn finish(self) -> BatchResult {
        let papers: Vec<&Paper> = self.outcomes.iter().flat_map(|o| o.papers.iter()).collect();

        let mut distinct = HashSet::new();
        let mut industry_count = 0;
        let mut journals: HashMap<&str, usize> = HashMap::new();
        let mut papers_per_year = BTreeMap::new();
        for paper in &papers {
            if !distinct.insert(paper.id.as_str()) {
                continue;
            }
            if paper.has_industry_affiliation() == Some(true) {
                industry_count += 1;
            }
            let journal = paper.journal.trim();
            if !journal.is_empty() {
                *journals.entry(journal).or_default() += 1;
            }
            *papers_per_year.entry(publication_year(&paper.publication_date)).or_default() += 1;
        }

        let mut top_journals: Vec<(String, usize)> =
            journals.into_iter().map(|(j, n)| (j.to_string(), n)).collect();
        top_journals.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_journals.truncate(TOP_JOURNALS);

        let failures = self
            .outcomes
            .iter()
            .filter_map(|o| match &o.status {
                QueryStatus::Failed { error } => Some(QueryFailure { query: o.query.clone(), error: error.clone() }),
                _ => None,
            })
            .collect();
        let not_attempted = self
            .outcomes
            .iter()
            .filter(|o| o.status == QueryStatus::NotAttempted)
            .map(|o| o.query.clone())
            .collect();

        let statistics = Statistics {
            total_papers: self.per_query.iter().map(|q| q.retrieved).sum(),
            exported_papers: papers.len(),
            distinct_papers: distinct.len(),
            industry_count,
            industry_rate: rate(industry_count, distinct.len()),
            duplicate_count: self.duplicate_count,
            per_query: self.per_query,
            failures,
            not_attempted,
            top_journals,
            papers_per_year,
        };
        BatchResult { outcomes: self.outcomes, statistics }
    }
}

fn rate(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Leading four-digit year of a normalised date, or [`UNKNOWN_YEAR`].
fn publication_year(date: &str) -> String {
    match date.trim().get(..4) {
        Some(year) if year.bytes().all(|b| b.is_ascii_digit()) => year.to_string(),
        _ => UNKNOWN_YEAR.to_string(),
    }
}

// ── Aggregator ────────────────────────────────────────────────────────────────

pub struct BatchAggregator<S: RecordSource> {
    pipeline: FetchPipeline<S>,
    dedup: DedupPolicy,
}

impl<S: RecordSource> BatchAggregator<S> {
    pub fn new(pipeline: FetchPipeline<S>, dedup: DedupPolicy) -> Self {
        Self { pipeline, dedup }
    }

    pub fn pipeline(&self) -> &FetchPipeline<S> {
        &self.pipeline
    }

    pub fn into_pipeline(self) -> FetchPipeline<S> {
        self.pipeline
    }

    /// Run every query in order and return the finalized result.
    ///
    /// Never fails: fetch errors become per-query failure markers, and a stop
    /// request marks the remaining queries as not attempted.
    #[instrument(skip(self, queries, stop), fields(n_queries = queries.len()))]
    pub async fn run(&mut self, queries: &[String], max_results: usize, stop: &StopHandle) -> BatchResult {
        let mut builder = BatchBuilder::new(self.dedup);

        for (i, query) in queries.iter().enumerate() {
            if stop.is_stop_requested() {
                warn!(remaining = queries.len() - i, "Stop requested, skipping remaining queries");
                for rest in &queries[i..] {
                    builder.mark_not_attempted(rest);
                }
                break;
            }

            info!(query = %query, index = i + 1, total = queries.len(), "Processing query");
            match self.fetch_tagged(query, max_results).await {
                Ok(papers) => {
                    info!(query = %query, papers = papers.len(), "Query complete");
                    builder.record_success(query, papers);
                }
                Err(e) => {
                    warn!(query = %query, error = %e, "Query failed, continuing with next");
                    builder.record_failure(query, &e);
                }
            }
        }

        builder.finish()
    }

    /// Fetch one query to completion, stamping each paper as it arrives.
    async fn fetch_tagged(&mut self, query: &str, max_results: usize) -> Result<Vec<Paper>> {
        let clock = Arc::clone(self.pipeline.clock());
        let mut stream = self.pipeline.fetch(query, max_results).await?;
        let mut papers = Vec::new();
        while let Some(mut paper) = stream.next().await? {
            paper.tag(query, clock.timestamp());
            papers.push(paper);
        }
        Ok(papers)
    }
}
