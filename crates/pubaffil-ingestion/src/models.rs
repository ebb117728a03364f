//! Data models for the retrieval pipeline.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::Classification;

/// A bibliographic record as delivered by the retrieval collaborator.
///
/// Every field is optional; the normaliser decides what is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub pmid: Option<String>,
    pub title: Option<String>,
    /// Abstract sections in document order.
    pub abstract_parts: Vec<String>,
    pub journal: Option<String>,
    pub pub_date: Option<RawPubDate>,
    pub authors: Vec<RawAuthor>,
    /// Affiliations attached to the article rather than to an author.
    pub article_affiliations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAuthor {
    pub fore_name: Option<String>,
    pub last_name: Option<String>,
    pub collective_name: Option<String>,
    pub affiliations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPubDate {
    pub year: Option<String>,
    pub month: Option<String>,
    pub day: Option<String>,
    /// Free-form date used by MEDLINE when the parts are unavailable.
    pub medline_date: Option<String>,
}

/// Canonical paper record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    /// External identifier (PMID). Never empty.
    pub id: String,
    pub title: String,
    pub abstract_text: String,
    /// Byline order; duplicates are kept.
    pub authors: Vec<String>,
    /// Not paired 1:1 with `authors`.
    pub affiliations: Vec<String>,
    pub journal: String,
    pub publication_date: String,
    has_industry_affiliation: Option<bool>,
    matched_terms: BTreeSet<String>,
    /// Set by the batch aggregator only.
    pub source_query: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Paper {
    /// An unclassified paper with every optional field empty.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            abstract_text: String::new(),
            authors: Vec::new(),
            affiliations: Vec::new(),
            journal: String::new(),
            publication_date: String::new(),
            has_industry_affiliation: None,
            matched_terms: BTreeSet::new(),
            source_query: None,
            processed_at: None,
        }
    }

    /// `None` until the classifier has run.
    pub fn has_industry_affiliation(&self) -> Option<bool> {
        self.has_industry_affiliation
    }

    pub fn is_classified(&self) -> bool {
        self.has_industry_affiliation.is_some()
    }

    pub fn matched_terms(&self) -> &BTreeSet<String> {
        &self.matched_terms
    }

    /// Record a classifier verdict. The flag is derived from the matches.
    pub fn apply_classification(&mut self, classification: Classification) {
        self.has_industry_affiliation = Some(!classification.matched_terms.is_empty());
        self.matched_terms = classification.matched_terms;
    }

    /// Attribute the paper to a batch query.
    pub fn tag(&mut self, query: &str, processed_at: DateTime<Utc>) {
        self.source_query = Some(query.to_string());
        self.processed_at = Some(processed_at);
    }
}
