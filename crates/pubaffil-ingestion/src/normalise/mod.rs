//! Record normalisation.
//!
//! Maps a [`RawRecord`] from the retrieval collaborator into a canonical
//! [`Paper`]. Missing optional fields become empty strings or sequences;
//! only a record without an identifier is rejected.
//!
//! Authors and affiliations are kept as two independent sequences. Feeds
//! often populate the affiliation of the first author only, so no attempt
//! is made to pair them up.

pub mod date;

pub use date::normalise_pub_date;

use pubaffil_common::{PubaffilError, Result};

use crate::models::{Paper, RawAuthor, RawRecord};

/// Normalise one raw record.
pub fn normalise(raw: RawRecord) -> Result<Paper> {
    let id = raw
        .pmid
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            PubaffilError::MalformedRecord(format!(
                "record without identifier (title: {:?})",
                raw.title.as_deref().unwrap_or("")
            ))
        })?
        .to_string();

    let mut paper = Paper::new(id);
    paper.title = clean(raw.title.as_deref());
    paper.abstract_text = raw
        .abstract_parts
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    paper.journal = clean(raw.journal.as_deref());
    paper.publication_date = raw.pub_date.as_ref().map(normalise_pub_date).unwrap_or_default();
    paper.authors = raw.authors.iter().filter_map(author_name).collect();
    paper.affiliations = raw
        .authors
        .iter()
        .flat_map(|a| a.affiliations.iter())
        .chain(raw.article_affiliations.iter())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    Ok(paper)
}

/// "ForeName LastName", else LastName, else the collective name.
fn author_name(author: &RawAuthor) -> Option<String> {
    let fore = clean(author.fore_name.as_deref());
    let last = clean(author.last_name.as_deref());
    match (fore.is_empty(), last.is_empty()) {
        (false, false) => Some(format!("{fore} {last}")),
        (true, false)  => Some(last),
        _ => {
            let collective = clean(author.collective_name.as_deref());
            (!collective.is_empty()).then_some(collective)
        }
    }
}

fn clean(value: Option<&str>) -> String {
    value.map(str::trim).unwrap_or_default().to_string()
}
