//! CSV export of classified papers.
//!
//! Every field is quoted and the header row is always written, even for an
//! empty export. Sequences are joined with `"; "`. Abstract and affiliation
//! columns stay in place when excluded; their cells are just left empty.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::SecondsFormat;
use pubaffil_common::{OutputConfig, PubaffilError, Result};
use tracing::info;

use crate::models::Paper;

const LIST_SEPARATOR: &str = "; ";
const TRUNCATION_SUFFIX: &str = "...";

const BASE_COLUMNS: [&str; 8] = [
    "id",
    "title",
    "authors",
    "journal",
    "publication_date",
    "affiliations",
    "abstract",
    "has_industry_affiliation",
];
const BATCH_COLUMNS: [&str; 2] = ["source_query", "processed_at"];
const MATCHED_TERMS_COLUMN: &str = "matched_terms";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    Single,
    /// Adds `source_query` and `processed_at`.
    Batch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub mode: ExportMode,
    pub include_abstract: bool,
    pub include_affiliations: bool,
    /// Character limit for title and abstract, if truncating.
    pub max_field_length: Option<usize>,
    pub include_matched_terms: bool,
    pub industry_only: bool,
}

impl ExportOptions {
    pub fn from_config(output: &OutputConfig, mode: ExportMode) -> Self {
        Self {
            mode,
            include_abstract: output.include_abstract,
            include_affiliations: output.include_affiliations,
            max_field_length: output.truncate_long_fields.then_some(output.max_field_length),
            include_matched_terms: output.include_matched_terms,
            industry_only: output.industry_only,
        }
    }

    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns = BASE_COLUMNS.to_vec();
        if self.mode == ExportMode::Batch {
            columns.extend(BATCH_COLUMNS);
        }
        if self.include_matched_terms {
            columns.push(MATCHED_TERMS_COLUMN);
        }
        columns
    }

    fn row(&self, paper: &Paper) -> Vec<String> {
        let mut row = vec![
            paper.id.clone(),
            self.truncate(&paper.title),
            paper.authors.join(LIST_SEPARATOR),
            paper.journal.clone(),
            paper.publication_date.clone(),
            if self.include_affiliations { paper.affiliations.join(LIST_SEPARATOR) } else { String::new() },
            if self.include_abstract { self.truncate(&paper.abstract_text) } else { String::new() },
            paper.has_industry_affiliation().map(|b| b.to_string()).unwrap_or_default(),
        ];
        if self.mode == ExportMode::Batch {
            row.push(paper.source_query.clone().unwrap_or_default());
            row.push(
                paper
                    .processed_at
                    .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                    .unwrap_or_default(),
            );
        }
        if self.include_matched_terms {
            let terms: Vec<&str> = paper.matched_terms().iter().map(String::as_str).collect();
            row.push(terms.join(LIST_SEPARATOR));
        }
        row
    }

    fn truncate(&self, text: &str) -> String {
        match self.max_field_length {
            Some(max) => truncate_chars(text, max),
            None => text.to_string(),
        }
    }

    fn keeps(&self, paper: &Paper) -> bool {
        !self.industry_only || paper.has_industry_affiliation() == Some(true)
    }
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::from_config(&OutputConfig::default(), ExportMode::Single)
    }
}

/// Cut `text` to at most `max` characters, appending `...` when shortened.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte, _)) => format!("{}{TRUNCATION_SUFFIX}", &text[..byte]),
        None => text.to_string(),
    }
}

/// Write papers as CSV to any writer. Returns the number of data rows.
///
/// `target` only names the destination in error messages.
pub fn write_papers<'a, W, I>(writer: W, papers: I, options: &ExportOptions, target: &str) -> Result<usize>
where
    W: Write,
    I: IntoIterator<Item = &'a Paper>,
{
    let export_err = |e: &dyn std::fmt::Display| PubaffilError::Export {
        path: target.to_string(),
        message: e.to_string(),
    };

    let mut csv = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(writer);
    csv.write_record(options.columns()).map_err(|e| export_err(&e))?;

    let mut rows = 0;
    for paper in papers.into_iter().filter(|p| options.keeps(p)) {
        csv.write_record(options.row(paper)).map_err(|e| export_err(&e))?;
        rows += 1;
    }
    csv.flush().map_err(|e| export_err(&e))?;
    Ok(rows)
}

/// Create (or truncate) `path` and write the papers into it.
pub fn export_to_path<'a, I>(path: &Path, papers: I, options: &ExportOptions) -> Result<usize>
where
    I: IntoIterator<Item = &'a Paper>,
{
    let target = path.display().to_string();
    let file = File::create(path).map_err(|e| PubaffilError::Export {
        path: target.clone(),
        message: e.to_string(),
    })?;
    let rows = write_papers(file, papers, options, &target)?;
    info!(path = %target, rows, "CSV export written");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pubaffil_common::Ruleset;

    use super::*;
    use crate::classify::classify;

    fn classified(id: &str, affiliation: &str) -> Paper {
        let mut paper = Paper::new(id);
        paper.title = format!("Title {id}");
        paper.abstract_text = "Some abstract".to_string();
        paper.authors = vec!["Alice Brown".to_string(), "Bob Green".to_string()];
        paper.journal = "Nature".to_string();
        paper.publication_date = "2021-01-05".to_string();
        if !affiliation.is_empty() {
            paper.affiliations = vec![affiliation.to_string(), "Oslo".to_string()];
        }
        let c = classify(&paper, &Ruleset::builtin().unwrap());
        paper.apply_classification(c);
        paper
    }

    fn render(papers: &[Paper], options: &ExportOptions) -> String {
        let mut buf = Vec::new();
        write_papers(&mut buf, papers, options, "memory").unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_single_mode_columns_and_quoting() {
        let out = render(&[classified("1", "Pfizer Inc")], &ExportOptions::default());
        let mut lines = out.lines();
        assert_eq!(
            lines.next().unwrap(),
            r#""id","title","authors","journal","publication_date","affiliations","abstract","has_industry_affiliation""#
        );
        assert_eq!(
            lines.next().unwrap(),
            r#""1","Title 1","Alice Brown; Bob Green","Nature","2021-01-05","Pfizer Inc; Oslo","Some abstract","true""#
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_batch_mode_adds_attribution() {
        let mut paper = classified("7", "");
        paper.tag("kras", Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap());
        let options = ExportOptions { mode: ExportMode::Batch, ..ExportOptions::default() };
        let out = render(&[paper], &options);

        let mut rdr = csv::Reader::from_reader(out.as_bytes());
        let headers = rdr.headers().unwrap().clone();
        assert_eq!(headers.len(), 10);
        assert_eq!(&headers[8], "source_query");
        let row = rdr.records().next().unwrap().unwrap();
        assert_eq!(&row[7], "false");
        assert_eq!(&row[8], "kras");
        assert_eq!(&row[9], "2024-03-01T12:30:00Z");
    }

    #[test]
    fn test_header_written_for_empty_export() {
        let out = render(&[], &ExportOptions::default());
        assert_eq!(out.lines().count(), 1);
    }

    #[test]
    fn test_unclassified_row_has_empty_flag() {
        let out = render(&[Paper::new("9")], &ExportOptions::default());
        let mut rdr = csv::Reader::from_reader(out.as_bytes());
        let row = rdr.records().next().unwrap().unwrap();
        assert_eq!(&row[7], "");
    }

    #[test]
    fn test_field_options() {
        let options = ExportOptions {
            include_abstract: false,
            include_affiliations: false,
            include_matched_terms: true,
            industry_only: true,
            ..ExportOptions::default()
        };
        let papers = [classified("1", "Pfizer Inc"), classified("2", "")];
        let out = render(&papers, &options);

        let mut rdr = csv::Reader::from_reader(out.as_bytes());
        assert_eq!(&rdr.headers().unwrap()[8], "matched_terms");
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][5], "");
        assert_eq!(&rows[0][6], "");
        assert_eq!(&rows[0][8], "pfizer; pfizer inc");
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo...");
        assert_eq!(truncate_chars("short", 5), "short");
        assert_eq!(truncate_chars("", 0), "");

        let mut paper = classified("1", "");
        paper.title = "ü".repeat(12);
        let options = ExportOptions { max_field_length: Some(10), ..ExportOptions::default() };
        let out = render(&[paper], &options);
        assert!(out.contains(&format!("\"{}...\"", "ü".repeat(10))));
    }

    #[test]
    fn test_export_to_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let rows = export_to_path(&path, &[classified("1", "Genentech")], &ExportOptions::default()).unwrap();
        assert_eq!(rows, 1);
        assert!(std::fs::read_to_string(&path).unwrap().contains("\"Genentech; Oslo\""));
    }

    #[test]
    fn test_unwritable_path_is_export_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.csv");
        let err = export_to_path(&path, Vec::<Paper>::new().iter(), &ExportOptions::default()).unwrap_err();
        assert!(matches!(err, PubaffilError::Export { .. }));
    }
}
