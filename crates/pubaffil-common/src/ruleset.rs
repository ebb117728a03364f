//! Keyword ruleset used by the affiliation classifier.
//!
//! A ruleset holds four disjoint categories of lower-cased match terms.
//! It is built once at configuration load and never mutated afterwards;
//! customisation goes through [`Ruleset::merge`], which returns a new value.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{parse_document, DocumentFormat};
use crate::error::{PubaffilError, Result};

/// The ruleset shipped with the binary.
pub const DEFAULT_RULESET_YAML: &str = include_str!("../data/default_ruleset.yaml");

/// One of the four keyword groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Companies,
    IndustryTerms,
    CollaborationTerms,
    InstitutionalTerms,
}

impl Category {
    /// Evaluation order used by the classifier.
    pub const ALL: [Category; 4] = [
        Category::Companies,
        Category::IndustryTerms,
        Category::CollaborationTerms,
        Category::InstitutionalTerms,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Companies          => "companies",
            Category::IndustryTerms      => "industry_terms",
            Category::CollaborationTerms => "collaboration_terms",
            Category::InstitutionalTerms => "institutional_terms",
        }
    }

    fn index(&self) -> usize {
        match self {
            Category::Companies          => 0,
            Category::IndustryTerms      => 1,
            Category::CollaborationTerms => 2,
            Category::InstitutionalTerms => 3,
        }
    }
}

/// Where a ruleset (or extension) is read from.
#[derive(Debug, Clone, Copy)]
pub enum RulesetSource<'a> {
    Builtin,
    Yaml(&'a str),
    Toml(&'a str),
    Path(&'a Path),
}

impl<'a> RulesetSource<'a> {
    fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        match self {
            RulesetSource::Builtin     => parse_document(DEFAULT_RULESET_YAML, DocumentFormat::Yaml),
            RulesetSource::Yaml(text)  => parse_document(text, DocumentFormat::Yaml),
            RulesetSource::Toml(text)  => parse_document(text, DocumentFormat::Toml),
            RulesetSource::Path(path)  => {
                let format = DocumentFormat::from_path(path)?;
                let content = std::fs::read_to_string(path).map_err(|e| {
                    PubaffilError::config(format!("cannot read ruleset {}: {e}", path.display()))
                })?;
                parse_document(&content, format)
            }
        }
    }
}

/// On-disk shape of a base ruleset. Every category must be present.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRuleset {
    companies: Option<Vec<String>>,
    industry_terms: Option<Vec<String>>,
    collaboration_terms: Option<Vec<String>>,
    institutional_terms: Option<Vec<String>>,
}

/// Additional terms to union into a base ruleset. Any category may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RulesetExtension {
    pub companies: Vec<String>,
    pub industry_terms: Vec<String>,
    pub collaboration_terms: Vec<String>,
    pub institutional_terms: Vec<String>,
}

impl RulesetExtension {
    pub fn load(source: RulesetSource<'_>) -> Result<Self> {
        source.parse()
    }

    fn terms(&self, category: Category) -> &[String] {
        match category {
            Category::Companies          => &self.companies,
            Category::IndustryTerms      => &self.industry_terms,
            Category::CollaborationTerms => &self.collaboration_terms,
            Category::InstitutionalTerms => &self.institutional_terms,
        }
    }
}

/// Immutable, categorised set of case-insensitive match terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ruleset {
    categories: [BTreeSet<String>; 4],
}

impl Ruleset {
    /// Load and validate a base ruleset.
    ///
    /// Fails with a configuration error when a category is missing, holds
    /// no usable (non-whitespace) terms, or shares a term with another category.
    pub fn load(source: RulesetSource<'_>) -> Result<Self> {
        let raw: RawRuleset = source.parse()?;
        let lists = [
            raw.companies,
            raw.industry_terms,
            raw.collaboration_terms,
            raw.institutional_terms,
        ];

        let mut categories: [BTreeSet<String>; 4] = Default::default();
        for (category, list) in Category::ALL.iter().zip(lists) {
            let list = list.ok_or_else(|| {
                PubaffilError::config(format!("ruleset category `{}` is missing", category.as_str()))
            })?;
            let terms: BTreeSet<String> = list.iter().filter_map(|t| normalise_term(t)).collect();
            if terms.is_empty() {
                return Err(PubaffilError::config(format!(
                    "ruleset category `{}` contains no usable terms",
                    category.as_str()
                )));
            }
            categories[category.index()] = terms;
        }

        let ruleset = Self { categories };
        ruleset.check_disjoint()?;
        debug!(terms = ruleset.len(), "Ruleset loaded");
        Ok(ruleset)
    }

    /// The built-in ruleset.
    pub fn builtin() -> Result<Self> {
        Self::load(RulesetSource::Builtin)
    }

    /// Return a new ruleset with `extra` unioned into the matching categories.
    ///
    /// Terms already present in any category of `self` are skipped so the
    /// categories stay disjoint.
    pub fn merge(&self, extra: &RulesetExtension) -> Ruleset {
        let mut merged = self.clone();
        for category in Category::ALL {
            for term in extra.terms(category).iter().filter_map(|t| normalise_term(t)) {
                if merged.category_of(&term).is_none() {
                    merged.categories[category.index()].insert(term);
                }
            }
        }
        merged
    }

    /// Terms of one category, in sorted order.
    pub fn terms(&self, category: Category) -> &BTreeSet<String> {
        &self.categories[category.index()]
    }

    /// The category a (normalised) term belongs to, if any.
    pub fn category_of(&self, term: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|c| self.categories[c.index()].contains(term))
    }

    /// Total number of terms across all categories.
    pub fn len(&self) -> usize {
        self.categories.iter().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_disjoint(&self) -> Result<()> {
        for (i, a) in Category::ALL.iter().enumerate() {
            for b in &Category::ALL[i + 1..] {
                if let Some(term) = self.terms(*a).intersection(self.terms(*b)).next() {
                    return Err(PubaffilError::config(format!(
                        "term `{term}` appears in both `{}` and `{}`",
                        a.as_str(),
                        b.as_str()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Trim and lower-case a term; whitespace-only entries are dropped.
fn normalise_term(term: &str) -> Option<String> {
    let t = term.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SMALL: &str = r#"
companies: ["Pfizer", "  Roche ", "pfizer"]
industry_terms: ["Biotech"]
collaboration_terms: ["funded by"]
institutional_terms: ["academic-industry"]
"#;

    #[test]
    fn test_builtin_ruleset_loads() {
        let rs = Ruleset::builtin().unwrap();
        assert!(rs.terms(Category::Companies).contains("pfizer"));
        assert!(rs.terms(Category::IndustryTerms).contains("biotech"));
        assert!(rs.terms(Category::CollaborationTerms).contains("funded by"));
        assert!(rs.terms(Category::InstitutionalTerms).contains("academic medicine"));
    }

    #[test]
    fn test_terms_are_trimmed_lowercased_and_deduplicated() {
        let rs = Ruleset::load(RulesetSource::Yaml(SMALL)).unwrap();
        let companies: Vec<&str> = rs.terms(Category::Companies).iter().map(String::as_str).collect();
        assert_eq!(companies, vec!["pfizer", "roche"]);
        assert_eq!(rs.len(), 5);
    }

    #[test]
    fn test_missing_category_is_config_error() {
        let yaml = "companies: [pfizer]\nindustry_terms: [biotech]\ncollaboration_terms: [funded by]\n";
        let err = Ruleset::load(RulesetSource::Yaml(yaml)).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("institutional_terms"));
    }

    #[test]
    fn test_whitespace_only_category_is_config_error() {
        let yaml = r#"
companies: ["   ", ""]
industry_terms: [biotech]
collaboration_terms: [funded by]
institutional_terms: [academic-industry]
"#;
        let err = Ruleset::load(RulesetSource::Yaml(yaml)).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("companies"));
    }

    #[test]
    fn test_overlapping_categories_rejected() {
        let yaml = r#"
companies: [pfizer]
industry_terms: [PFIZER]
collaboration_terms: [funded by]
institutional_terms: [academic-industry]
"#;
        let err = Ruleset::load(RulesetSource::Yaml(yaml)).unwrap_err();
        assert!(err.to_string().contains("pfizer"));
    }

    #[test]
    fn test_toml_source() {
        let toml = r#"
companies = ["Genentech"]
industry_terms = ["pharma"]
collaboration_terms = ["sponsored by"]
institutional_terms = ["university biotech"]
"#;
        let rs = Ruleset::load(RulesetSource::Toml(toml)).unwrap();
        assert_eq!(rs.category_of("genentech"), Some(Category::Companies));
    }

    #[test]
    fn test_merge_unions_without_mutating_base() {
        let base = Ruleset::load(RulesetSource::Yaml(SMALL)).unwrap();
        let extra = RulesetExtension {
            companies: vec!["Acme Therapeutics".to_string(), "ROCHE".to_string()],
            industry_terms: vec!["funded by".to_string()],
            ..Default::default()
        };
        let merged = base.merge(&extra);

        assert!(merged.terms(Category::Companies).contains("acme therapeutics"));
        // already present elsewhere: keeps its existing category
        assert_eq!(merged.category_of("funded by"), Some(Category::CollaborationTerms));
        assert_eq!(merged.len(), base.len() + 1);
        assert!(!base.terms(Category::Companies).contains("acme therapeutics"));
    }

    #[test]
    fn test_extension_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "companies: [Acme Bio]").unwrap();
        let ext = RulesetExtension::load(RulesetSource::Path(file.path())).unwrap();
        assert_eq!(ext.companies, vec!["Acme Bio".to_string()]);
        assert!(ext.industry_terms.is_empty());
    }
}
