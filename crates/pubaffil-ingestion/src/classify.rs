//! Industry-affiliation classifier.
//!
//! A pure function of (paper, ruleset): the affiliation text is lower-cased
//! once and every term of every category is tested for substring containment.
//! All matches are kept, so the verdict can always be traced back to the
//! terms that produced it.
//!
//! When a paper has no affiliation text at all the author names are searched
//! instead. This fallback is a heuristic (some feeds fold institution names
//! into author strings) and is reported separately via [`MatchSurface`].

use std::collections::{BTreeMap, BTreeSet};

use pubaffil_common::{Category, Ruleset};
use serde::Serialize;

use crate::models::Paper;

/// Separator between concatenated entries; no ruleset term spans it.
const ENTRY_SEPARATOR: &str = "\n";

/// Which text the classifier searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSurface {
    Affiliations,
    /// No affiliations; author names were searched instead.
    AuthorFallback,
    /// Nothing to search.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub is_industry: bool,
    /// Union of matches across all categories.
    pub matched_terms: BTreeSet<String>,
    pub by_category: BTreeMap<Category, BTreeSet<String>>,
    pub surface: MatchSurface,
}

impl Classification {
    fn unmatched(surface: MatchSurface) -> Self {
        Self {
            is_industry: false,
            matched_terms: BTreeSet::new(),
            by_category: BTreeMap::new(),
            surface,
        }
    }

    /// The `(verdict, matched terms)` pair.
    pub fn verdict(&self) -> (bool, &BTreeSet<String>) {
        (self.is_industry, &self.matched_terms)
    }
}

/// Build the lower-cased text to search and report where it came from.
pub fn search_surface(paper: &Paper) -> (MatchSurface, String) {
    let affiliations = non_blank(&paper.affiliations);
    if !affiliations.is_empty() {
        return (MatchSurface::Affiliations, affiliations.join(ENTRY_SEPARATOR).to_lowercase());
    }
    let authors = non_blank(&paper.authors);
    if !authors.is_empty() {
        return (MatchSurface::AuthorFallback, authors.join(ENTRY_SEPARATOR).to_lowercase());
    }
    (MatchSurface::Empty, String::new())
}

/// Every ruleset term contained in `text`, grouped by category.
///
/// `text` must already be lower-cased.
pub fn match_terms(text: &str, ruleset: &Ruleset) -> BTreeMap<Category, BTreeSet<String>> {
    let mut by_category = BTreeMap::new();
    if text.is_empty() {
        return by_category;
    }
    for category in Category::ALL {
        let hits: BTreeSet<String> = ruleset
            .terms(category)
            .iter()
            .filter(|term| text.contains(term.as_str()))
            .cloned()
            .collect();
        if !hits.is_empty() {
            by_category.insert(category, hits);
        }
    }
    by_category
}

/// Classify one paper against a ruleset.
pub fn classify(paper: &Paper, ruleset: &Ruleset) -> Classification {
    let (surface, text) = search_surface(paper);
    if surface == MatchSurface::Empty {
        return Classification::unmatched(surface);
    }

    let by_category = match_terms(&text, ruleset);
    let matched_terms: BTreeSet<String> = by_category.values().flatten().cloned().collect();
    Classification {
        is_industry: !matched_terms.is_empty(),
        matched_terms,
        by_category,
        surface,
    }
}

fn non_blank(entries: &[String]) -> Vec<&str> {
    entries
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubaffil_common::RulesetSource;

    fn ruleset() -> Ruleset {
        Ruleset::load(RulesetSource::Yaml(
            r#"
companies: [pfizer, "pfizer inc", genentech]
industry_terms: [biotech, pharmaceutical]
collaboration_terms: [funded by]
institutional_terms: [academic-industry]
"#,
        ))
        .unwrap()
    }

    fn paper(authors: &[&str], affiliations: &[&str]) -> Paper {
        let mut p = Paper::new("1");
        p.authors = authors.iter().map(|s| s.to_string()).collect();
        p.affiliations = affiliations.iter().map(|s| s.to_string()).collect();
        p
    }

    #[test]
    fn test_classification_is_deterministic() {
        let rs = ruleset();
        let p = paper(&["Jane Doe"], &["Genentech, South San Francisco", "Biotech Lab, Boston"]);
        let first = classify(&p, &rs);
        let second = classify(&p, &rs);
        assert_eq!(first, second);
        assert_eq!(first.verdict(), second.verdict());
    }

    #[test]
    fn test_author_fallback_when_no_affiliations() {
        let rs = ruleset();
        let p = paper(&["Jane Doe (Pfizer)"], &[]);
        let c = classify(&p, &rs);
        assert!(c.is_industry);
        assert!(c.matched_terms.contains("pfizer"));
        assert_eq!(c.surface, MatchSurface::AuthorFallback);
    }

    #[test]
    fn test_fallback_not_used_when_affiliations_present() {
        let rs = ruleset();
        let p = paper(&["Jane Doe (Pfizer)"], &["Dept. of History, Oxford"]);
        let c = classify(&p, &rs);
        assert!(!c.is_industry);
        assert_eq!(c.surface, MatchSurface::Affiliations);
    }

    #[test]
    fn test_empty_input_is_false_without_error() {
        let c = classify(&paper(&[], &[]), &ruleset());
        let none: BTreeSet<String> = BTreeSet::new();
        assert_eq!(c.verdict(), (false, &none));
        assert_eq!(c.surface, MatchSurface::Empty);

        let blank = classify(&paper(&["  "], &[" "]), &ruleset());
        assert!(!blank.is_industry);
        assert_eq!(blank.surface, MatchSurface::Empty);
    }

    #[test]
    fn test_union_across_categories() {
        let rs = ruleset();
        let p = paper(&[], &["Genentech Inc.", "Department of Biotech Engineering"]);
        let c = classify(&p, &rs);
        assert!(c.is_industry);
        assert_eq!(c.matched_terms.len(), 2);
        assert_eq!(c.by_category.len(), 2);
        assert!(c.by_category[&Category::Companies].contains("genentech"));
        assert!(c.by_category[&Category::IndustryTerms].contains("biotech"));
    }

    #[test]
    fn test_every_matching_term_is_recorded() {
        // "pfizer inc" contains "pfizer": both fire, no early exit.
        let c = classify(&paper(&[], &["PFIZER INC, New York"]), &ruleset());
        assert_eq!(
            c.matched_terms.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["pfizer", "pfizer inc"]
        );
    }

    #[test]
    fn test_case_insensitive() {
        let rs = ruleset();
        let upper = classify(&paper(&[], &["PFIZER INC"]), &rs);
        let lower = classify(&paper(&[], &["pfizer inc"]), &rs);
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_terms_do_not_match_across_entries() {
        let rs = ruleset();
        let c = classify(&paper(&[], &["Lab of Pfi", "zer Studies"]), &rs);
        assert!(!c.is_industry);
    }

    #[test]
    fn test_apply_classification_derives_flag() {
        let rs = ruleset();
        let mut p = paper(&[], &["Funded by Acme"]);
        assert_eq!(p.has_industry_affiliation(), None);
        let c = classify(&p, &rs);
        p.apply_classification(c);
        assert_eq!(p.has_industry_affiliation(), Some(true));
        assert!(p.matched_terms().contains("funded by"));
    }
}
