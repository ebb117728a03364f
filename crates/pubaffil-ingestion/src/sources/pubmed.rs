//! PubMed E-utilities client.
//!
//! Endpoints used:
//!   esearch: https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi
//!   efetch:  https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi
//!
//! NCBI asks every client to identify itself with a contact email and tool
//! name; both are sent with each request.

use std::time::Duration;

use async_trait::async_trait;
use pubaffil_common::{PubaffilError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use reqwest::Client;
use tracing::{debug, instrument, warn};

use super::RecordSource;
use crate::models::{RawAuthor, RawPubDate, RawRecord};

const EUTILS_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const TOOL_NAME: &str = "pubaffil";
const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

/// Reject contact strings NCBI would not accept as an email address.
pub fn validate_email(email: &str) -> Result<()> {
    let re = Regex::new(EMAIL_PATTERN).map_err(|e| PubaffilError::Other(e.into()))?;
    if re.is_match(email) {
        Ok(())
    } else {
        Err(PubaffilError::config(format!("invalid contact email: {email:?}")))
    }
}

pub struct PubMedClient {
    client: Client,
    base_url: String,
    email: String,
    api_key: Option<String>,
}

impl PubMedClient {
    pub fn new(email: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        validate_email(email)?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pubaffil/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PubaffilError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: EUTILS_BASE_URL.to_string(),
            email: email.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    /// Point the client at a different E-utilities host (mirrors, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn base_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("tool", TOOL_NAME.to_string()),
            ("email", self.email.clone()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }
}

#[async_trait]
impl RecordSource for PubMedClient {
    #[instrument(skip(self))]
    async fn search(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<String>> {
        let mut params = self.base_params();
        params.push(("term", query.to_string()));
        params.push(("retmax", max_results.to_string()));
        params.push(("retmode", "json".to_string()));
        params.push(("sort", "relevance".to_string()));

        let resp: serde_json::Value = self
            .client
            .get(format!("{}/esearch.fcgi", self.base_url))
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = resp["esearchresult"]["ERROR"].as_str() {
            anyhow::bail!("esearch error: {err}");
        }

        let ids: Vec<String> = resp["esearchresult"]["idlist"]
            .as_array()
            .map(|ids| ids.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        debug!(n = ids.len(), "PubMed esearch returned PMIDs");
        Ok(ids)
    }

    #[instrument(skip(self, ids), fields(n = ids.len()))]
    async fn fetch_details(&self, ids: &[String]) -> anyhow::Result<Vec<RawRecord>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let mut params = self.base_params();
        params.push(("id", ids.join(",")));
        params.push(("rettype", "xml".to_string()));
        params.push(("retmode", "xml".to_string()));

        let xml = self
            .client
            .get(format!("{}/efetch.fcgi", self.base_url))
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_pubmed_xml(&xml)
    }
}

// ── XML parsing ───────────────────────────────────────────────────────────────

/// Elements whose text content is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Pmid,
    Title,
    AbstractPart,
    Journal,
    Year,
    Month,
    Day,
    MedlineDate,
    ForeName,
    LastName,
    CollectiveName,
    AuthorAffiliation,
    ArticleAffiliation,
}

fn field_for(name: &str, path: &[String], record: &RawRecord) -> Option<Field> {
    let parent = path.last().map(String::as_str);
    let grandparent = path.len().checked_sub(2).and_then(|i| path.get(i)).map(String::as_str);
    match (name, parent) {
        ("PMID", Some("MedlineCitation")) if record.pmid.is_none() => Some(Field::Pmid),
        ("ArticleTitle", _)                  => Some(Field::Title),
        ("AbstractText", _)                  => Some(Field::AbstractPart),
        ("Title", Some("Journal"))           => Some(Field::Journal),
        ("Year", Some("PubDate"))            => Some(Field::Year),
        ("Month", Some("PubDate"))           => Some(Field::Month),
        ("Day", Some("PubDate"))             => Some(Field::Day),
        ("MedlineDate", Some("PubDate"))     => Some(Field::MedlineDate),
        ("ForeName", Some("Author"))         => Some(Field::ForeName),
        ("LastName", Some("Author"))         => Some(Field::LastName),
        ("CollectiveName", Some("Author"))   => Some(Field::CollectiveName),
        ("Affiliation", Some("AffiliationInfo")) if grandparent == Some("Author") => {
            Some(Field::AuthorAffiliation)
        }
        ("Affiliation", Some("Author"))      => Some(Field::AuthorAffiliation),
        ("Affiliation", Some("Article"))     => Some(Field::ArticleAffiliation),
        _ => None,
    }
}

fn store(field: Field, text: String, record: &mut RawRecord, author: Option<&mut RawAuthor>) {
    match field {
        Field::Pmid         => record.pmid = Some(text),
        Field::Title        => record.title = Some(text),
        Field::AbstractPart => record.abstract_parts.push(text),
        Field::Journal      => record.journal = Some(text),
        Field::Year         => record.pub_date.get_or_insert_with(RawPubDate::default).year = Some(text),
        Field::Month        => record.pub_date.get_or_insert_with(RawPubDate::default).month = Some(text),
        Field::Day          => record.pub_date.get_or_insert_with(RawPubDate::default).day = Some(text),
        Field::MedlineDate  => record.pub_date.get_or_insert_with(RawPubDate::default).medline_date = Some(text),
        Field::ArticleAffiliation => record.article_affiliations.push(text),
        Field::ForeName | Field::LastName | Field::CollectiveName | Field::AuthorAffiliation => {
            let Some(author) = author else { return };
            match field {
                Field::ForeName       => author.fore_name = Some(text),
                Field::LastName       => author.last_name = Some(text),
                Field::CollectiveName => author.collective_name = Some(text),
                _                     => author.affiliations.push(text),
            }
        }
    }
}

/// Parse PubMed efetch XML into raw records.
/// Handles the <PubmedArticleSet><PubmedArticle> structure; inline markup
/// inside titles and abstracts (<i>, <sup>, …) is flattened into the text.
pub fn parse_pubmed_xml(xml: &str) -> anyhow::Result<Vec<RawRecord>> {
    let mut records = Vec::new();
    let mut reader = Reader::from_str(xml);

    let mut current: Option<RawRecord> = None;
    let mut author: Option<RawAuthor> = None;
    let mut path: Vec<String> = Vec::new();
    // (field, depth of the capturing element)
    let mut capture: Option<(Field, usize)> = None;
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match name.as_str() {
                    "PubmedArticle" => current = Some(RawRecord::default()),
                    "Author" if path.last().map(String::as_str) == Some("AuthorList") => {
                        author = Some(RawAuthor::default());
                    }
                    _ => {}
                }
                if capture.is_none() {
                    if let Some(ref record) = current {
                        if let Some(field) = field_for(&name, &path, record) {
                            capture = Some((field, path.len() + 1));
                            text.clear();
                        }
                    }
                }
                path.push(name);
            }
            Ok(Event::Text(ref e)) => {
                if capture.is_some() {
                    match e.unescape() {
                        Ok(t) => text.push_str(&t),
                        Err(err) => {
                            warn!("Unescape error in PubMed XML: {}", err);
                            text.push_str(&String::from_utf8_lossy(e));
                        }
                    }
                }
            }
            Ok(Event::CData(ref e)) => {
                if capture.is_some() {
                    text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Ok(Event::End(ref e)) => {
                if let Some((field, depth)) = capture {
                    if depth == path.len() {
                        let value = collapse_whitespace(&text);
                        if let Some(ref mut record) = current {
                            if !value.is_empty() {
                                store(field, value, record, author.as_mut());
                            }
                        }
                        capture = None;
                    }
                }
                path.pop();
                match e.name().as_ref() {
                    b"Author" => {
                        if let (Some(a), Some(record)) = (author.take(), current.as_mut()) {
                            record.authors.push(a);
                        }
                    }
                    b"PubmedArticle" => {
                        if let Some(record) = current.take() {
                            records.push(record);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => {
                if current.is_some() {
                    anyhow::bail!("truncated PubMed XML: document ends inside a PubmedArticle");
                }
                break;
            }
            // a partial batch must not pass for a complete one
            Err(e) => anyhow::bail!("malformed PubMed XML at byte {}: {e}", reader.buffer_position()),
            _ => {}
        }
        buf.clear();
    }

    Ok(records)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
