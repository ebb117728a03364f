//! Application configuration.
//!
//! Reads `pubaffil.toml` (or YAML/JSON) from an explicit path, the
//! `PUBAFFIL_CONFIG` env var, or the current directory. Every field has a
//! default, so running without a file is valid.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PubaffilError, Result};
use crate::ruleset::{Ruleset, RulesetExtension, RulesetSource};

pub const CONFIG_ENV_VAR: &str = "PUBAFFIL_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "pubaffil.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub search: SearchConfig,
    pub output: OutputConfig,
    pub ruleset: RulesetConfig,
    pub batch: BatchConfig,
}

// ── Search ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_max_results")]
    pub default_max_results: usize,
    /// Minimum gap between two outbound requests.
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries after the first failed attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// IDs per detail-fetch request.
    #[serde(default = "default_detail_batch_size")]
    pub detail_batch_size: usize,
}

fn default_max_results()         -> usize { 100 }
fn default_rate_limit_delay_ms() -> u64   { 100 }
fn default_timeout_secs()        -> u64   { 30 }
fn default_max_retries()         -> u32   { 3 }
fn default_retry_base_delay_ms() -> u64   { 500 }
fn default_detail_batch_size()   -> usize { 20 }

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_max_results: default_max_results(),
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            detail_batch_size: default_detail_batch_size(),
        }
    }
}

// ── Output ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_filename")]
    pub default_filename: String,
    #[serde(default = "default_true")]
    pub include_abstract: bool,
    #[serde(default = "default_true")]
    pub include_affiliations: bool,
    #[serde(default = "default_true")]
    pub truncate_long_fields: bool,
    /// Characters kept from title and abstract when truncating.
    #[serde(default = "default_max_field_length")]
    pub max_field_length: usize,
    #[serde(default)]
    pub include_matched_terms: bool,
    /// Only export industry-affiliated rows.
    #[serde(default)]
    pub industry_only: bool,
}

fn default_filename()         -> String { "pubmed_results.csv".to_string() }
fn default_true()             -> bool   { true }
fn default_max_field_length() -> usize  { 1000 }

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_filename: default_filename(),
            include_abstract: true,
            include_affiliations: true,
            truncate_long_fields: true,
            max_field_length: default_max_field_length(),
            include_matched_terms: false,
            industry_only: false,
        }
    }
}

// ── Ruleset ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesetConfig {
    /// Replaces the built-in ruleset when set.
    pub path: Option<PathBuf>,
    /// Extension files merged on top, in order.
    pub extend: Vec<PathBuf>,
}

impl RulesetConfig {
    /// Build the effective ruleset: base (file or built-in) plus extensions.
    pub fn build(&self) -> Result<Ruleset> {
        let mut ruleset = match &self.path {
            Some(path) => Ruleset::load(RulesetSource::Path(path))?,
            None => Ruleset::builtin()?,
        };
        for path in &self.extend {
            let extra = RulesetExtension::load(RulesetSource::Path(path))?;
            ruleset = ruleset.merge(&extra);
            debug!(path = %path.display(), terms = ruleset.len(), "Ruleset extension merged");
        }
        Ok(ruleset)
    }
}

// ── Batch ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupMode {
    /// Keep the first occurrence of an id; later repeats only count.
    #[default]
    FirstSeen,
    /// Keep every occurrence, each tagged with its own query.
    KeepAll,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub dedup: DedupMode,
}

// ── Loading ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Toml,
    Json,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("yaml") | Some("yml") => Ok(DocumentFormat::Yaml),
            Some("toml")               => Ok(DocumentFormat::Toml),
            Some("json")               => Ok(DocumentFormat::Json),
            _ => Err(PubaffilError::config(format!(
                "unsupported file format for {} (expected .yaml, .toml or .json)",
                path.display()
            ))),
        }
    }
}

/// Deserialize a configuration document, mapping parse failures to config errors.
pub(crate) fn parse_document<T: DeserializeOwned>(content: &str, format: DocumentFormat) -> Result<T> {
    let parsed = match format {
        DocumentFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
        DocumentFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        DocumentFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
    };
    parsed.map_err(|e| PubaffilError::config(format!("invalid {format:?} document: {e}")))
}

impl AppConfig {
    /// Load from a file, format chosen by extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let format = DocumentFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            PubaffilError::config(format!("cannot read config {}: {e}", path.display()))
        })?;
        let config: Self = parse_document(&content, format)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config file and load it, falling back to defaults.
    ///
    /// An explicit path must exist; the env var and default file are optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        let path = std::env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        if path.exists() {
            info!(path = %path.display(), "Loading configuration");
            Self::from_path(&path)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.default_max_results == 0 {
            return Err(PubaffilError::config("search.default_max_results must be > 0"));
        }
        if self.search.detail_batch_size == 0 {
            return Err(PubaffilError::config("search.detail_batch_size must be > 0"));
        }
        if self.search.timeout_secs == 0 {
            return Err(PubaffilError::config("search.timeout_secs must be > 0"));
        }
        if self.output.max_field_length == 0 {
            return Err(PubaffilError::config("output.max_field_length must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.search.default_max_results, 100);
        assert_eq!(config.search.rate_limit_delay_ms, 100);
        assert_eq!(config.search.max_retries, 3);
        assert_eq!(config.output.max_field_length, 1000);
        assert_eq!(config.output.default_filename, "pubmed_results.csv");
        assert_eq!(config.batch.dedup, DedupMode::FirstSeen);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = parse_document(
            "[search]\nrate_limit_delay_ms = 350\n\n[batch]\ndedup = \"keep_all\"\n",
            DocumentFormat::Toml,
        )
        .unwrap();
        assert_eq!(config.search.rate_limit_delay_ms, 350);
        assert_eq!(config.search.max_retries, 3);
        assert!(config.output.include_abstract);
        assert_eq!(config.batch.dedup, DedupMode::KeepAll);
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let mut config = AppConfig::default();
        config.output.industry_only = true;
        let yaml = serde_yaml::to_string(&config).unwrap();

        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        let loaded = AppConfig::from_path(file.path()).unwrap();
        assert!(loaded.output.industry_only);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = AppConfig::default();
        config.search.detail_batch_size = 0;
        assert!(config.validate().unwrap_err().is_config());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = AppConfig::default();
        config.search.timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let err = AppConfig::from_path(Path::new("settings.ini")).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_explicit_missing_path_is_config_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/pubaffil.toml"))).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_ruleset_config_builds_with_extension() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "companies: [Acme Therapeutics]").unwrap();
        let cfg = RulesetConfig { path: None, extend: vec![file.path().to_path_buf()] };
        let ruleset = cfg.build().unwrap();
        assert!(ruleset.category_of("acme therapeutics").is_some());
    }
}
