//! Fetch pipeline for a single query.
//!
//! Drives the retrieval collaborator in two steps:
//!   1. search the query for an ordered list of record IDs (bounded)
//!   2. fetch record details, one batch of IDs per request
//!
//! Each raw record is normalised and classified before it is yielded.
//! Every outbound request goes through the pipeline's [`RequestScheduler`],
//! and failed requests are retried with exponential backoff up to the
//! configured bound. Records without an identifier are skipped and logged.
//!
//! Execution is strictly sequential: a [`PaperStream`] holds the pipeline
//! mutably, so only one request can be in flight at a time.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use pubaffil_common::{PubaffilError, Result, Ruleset, SearchConfig};
use tracing::{debug, info, warn};

use crate::classify::classify;
use crate::models::{Paper, RawRecord};
use crate::normalise::normalise;
use crate::schedule::{Clock, RequestScheduler, RetryPolicy};
use crate::sources::RecordSource;

/// Pacing and retry settings for one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    pub min_delay: Duration,
    pub retry: RetryPolicy,
    pub detail_batch_size: usize,
}

impl FetchSettings {
    pub fn from_config(search: &SearchConfig) -> Self {
        Self {
            min_delay: Duration::from_millis(search.rate_limit_delay_ms),
            retry: RetryPolicy::new(search.max_retries, Duration::from_millis(search.retry_base_delay_ms)),
            detail_batch_size: search.detail_batch_size.max(1),
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self::from_config(&SearchConfig::default())
    }
}

pub struct FetchPipeline<S: RecordSource> {
    source: S,
    ruleset: Arc<Ruleset>,
    scheduler: RequestScheduler,
    settings: FetchSettings,
}

impl<S: RecordSource> FetchPipeline<S> {
    pub fn new(source: S, ruleset: Arc<Ruleset>, clock: Arc<dyn Clock>, settings: FetchSettings) -> Self {
        Self {
            source,
            ruleset,
            scheduler: RequestScheduler::new(clock, settings.min_delay),
            settings,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn ruleset(&self) -> &Ruleset {
        &self.ruleset
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        self.scheduler.clock()
    }

    /// Search `query` and return a stream over at most `max_results` papers,
    /// in the collaborator's relevance order.
    ///
    /// The search itself runs eagerly so that an unreachable collaborator is
    /// reported here; detail batches are requested as the stream is consumed.
    pub async fn fetch(&mut self, query: &str, max_results: usize) -> Result<PaperStream<'_, S>> {
        let mut ids = VecDeque::new();
        if max_results > 0 {
            let Self { source, scheduler, settings, .. } = &mut *self;
            let source: &S = source;
            let found = with_retry(scheduler, settings.retry, query, "search", move || {
                source.search(query, max_results)
            })
            .await?;

            let mut seen = HashSet::new();
            ids = found
                .into_iter()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty() && seen.insert(id.clone()))
                .take(max_results)
                .collect();
        }
        info!(query, n_ids = ids.len(), "Search complete");

        Ok(PaperStream {
            pipeline: self,
            query: query.to_string(),
            max_results,
            pending: ids,
            ready: VecDeque::new(),
            seen: HashSet::new(),
            yielded: 0,
            skipped: 0,
            missing: 0,
            finished: false,
        })
    }

    /// Normalise and classify a detail batch, restoring the requested order.
    ///
    /// Records for IDs outside `requested` are dropped and counted as skipped.
    fn process_batch(&self, query: &str, requested: &[String], records: Vec<RawRecord>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for raw in records {
            match normalise(raw) {
                Ok(paper) if !requested.contains(&paper.id) => {
                    warn!(query, id = %paper.id, "Dropping record that was not requested");
                    outcome.skipped += 1;
                }
                Ok(mut paper) => {
                    let classification = classify(&paper, &self.ruleset);
                    debug!(
                        id = %paper.id,
                        industry = classification.is_industry,
                        surface = ?classification.surface,
                        "Paper classified"
                    );
                    paper.apply_classification(classification);
                    outcome.papers.push(paper);
                }
                Err(e) => {
                    warn!(query, error = %e, "Skipping record");
                    outcome.skipped += 1;
                }
            }
        }

        let returned: HashSet<&str> = outcome.papers.iter().map(|p| p.id.as_str()).collect();
        let missing: Vec<&str> = requested.iter().map(String::as_str).filter(|id| !returned.contains(id)).collect();
        if !missing.is_empty() {
            warn!(query, missing = ?missing, "Requested records missing from response");
            outcome.missing = missing.len();
        }
        outcome
            .papers
            .sort_by_key(|p| requested.iter().position(|id| *id == p.id).unwrap_or(usize::MAX));
        outcome
    }
}

#[derive(Debug, Default)]
struct BatchOutcome {
    papers: Vec<Paper>,
    skipped: usize,
    missing: usize,
}

/// Lazily fetched, finite, non-restartable sequence of classified papers.
pub struct PaperStream<'a, S: RecordSource> {
    pipeline: &'a mut FetchPipeline<S>,
    query: String,
    max_results: usize,
    pending: VecDeque<String>,
    ready: VecDeque<Paper>,
    seen: HashSet<String>,
    yielded: usize,
    skipped: usize,
    missing: usize,
    finished: bool,
}

impl<'a, S: RecordSource> PaperStream<'a, S> {
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Records dropped because they could not be normalised or were not requested.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Requested IDs the collaborator returned no usable record for.
    pub fn missing(&self) -> usize {
        self.missing
    }

    /// IDs not yet requested.
    pub fn remaining_ids(&self) -> usize {
        self.pending.len()
    }

    /// Next paper, fetching the next detail batch when needed.
    ///
    /// After an error the stream is exhausted and returns `Ok(None)`.
    pub async fn next(&mut self) -> Result<Option<Paper>> {
        loop {
            if self.finished || self.yielded >= self.max_results {
                return Ok(None);
            }
            if let Some(paper) = self.ready.pop_front() {
                self.yielded += 1;
                return Ok(Some(paper));
            }
            if self.pending.is_empty() {
                self.finished = true;
                return Ok(None);
            }

            let take = self.pipeline.settings.detail_batch_size.min(self.pending.len());
            let batch: Vec<String> = self.pending.drain(..take).collect();
            let records = {
                let FetchPipeline { source, scheduler, settings, .. } = &mut *self.pipeline;
                let source: &S = source;
                let ids = batch.as_slice();
                let fetched = with_retry(scheduler, settings.retry, &self.query, "fetch_details", move || {
                    source.fetch_details(ids)
                })
                .await;
                match fetched {
                    Ok(records) => records,
                    Err(e) => {
                        self.finished = true;
                        self.pending.clear();
                        return Err(e);
                    }
                }
            };

            let outcome = self.pipeline.process_batch(&self.query, &batch, records);
            self.skipped += outcome.skipped;
            self.missing += outcome.missing;
            for paper in outcome.papers {
                if self.seen.insert(paper.id.clone()) {
                    self.ready.push_back(paper);
                }
            }
        }
    }

    /// Drain the stream.
    pub async fn collect(mut self) -> Result<Vec<Paper>> {
        let mut papers = Vec::new();
        while let Some(paper) = self.next().await? {
            papers.push(paper);
        }
        if self.skipped > 0 || self.missing > 0 {
            info!(query = %self.query, skipped = self.skipped, missing = self.missing, "Incomplete detail responses");
        }
        Ok(papers)
    }
}

/// Run one collaborator call with pacing and bounded retries.
async fn with_retry<T, F, Fut>(
    scheduler: &mut RequestScheduler,
    retry: RetryPolicy,
    query: &str,
    operation: &str,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        scheduler.acquire().await;
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < retry.max_attempts() => {
                let delay = retry.delay_for(attempt);
                warn!(
                    query,
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Request failed, retrying"
                );
                scheduler.backoff(delay).await;
            }
            Err(e) => {
                return Err(PubaffilError::Fetch {
                    query: query.to_string(),
                    attempts: attempt,
                    message: format!("{operation}: {e:#}"),
                })
            }
        }
    }
}
