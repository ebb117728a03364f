//! pubaffil-common: Shared error taxonomy, keyword ruleset and configuration.

pub mod config;
pub mod error;
pub mod ruleset;

// Re-export commonly used types
pub use config::{AppConfig, BatchConfig, DedupMode, OutputConfig, RulesetConfig, SearchConfig};
pub use error::{PubaffilError, Result};
pub use ruleset::{Category, Ruleset, RulesetExtension, RulesetSource};
