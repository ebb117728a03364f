//! pubaffil-ingestion: Literature retrieval and industry-affiliation screening.
//!
//! - Record retrieval (PubMed E-utilities)
//! - Record normalisation into [`models::Paper`]
//! - Keyword affiliation classification
//! - Rate-limited, retrying fetch pipeline
//! - Multi-query batch aggregation and statistics
//! - CSV export

pub mod batch;
pub mod classify;
pub mod export;
pub mod models;
pub mod normalise;
pub mod pipeline;
pub mod schedule;
pub mod sources;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use batch::{BatchAggregator, BatchBuilder, BatchResult, DedupPolicy, QueryOutcome, QueryStatus, Statistics, StopHandle};
pub use classify::{classify, Classification, MatchSurface};
pub use export::{export_to_path, write_papers, ExportMode, ExportOptions};
pub use models::{Paper, RawRecord};
pub use pipeline::{FetchPipeline, FetchSettings, PaperStream};
