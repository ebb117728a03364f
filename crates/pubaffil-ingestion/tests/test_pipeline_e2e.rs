//! Offline end-to-end run: search → detail fetch → normalise → classify → CSV.
//!
//! Run with: cargo test --package pubaffil-ingestion --test test_pipeline_e2e

use std::sync::Arc;
use std::time::Duration;

use pubaffil_common::{AppConfig, DedupMode, Ruleset};
use pubaffil_ingestion::schedule::ManualClock;
use pubaffil_ingestion::sources::pubmed::parse_pubmed_xml;
use pubaffil_ingestion::testing::FakeSource;
use pubaffil_ingestion::{
    export_to_path, BatchAggregator, ExportMode, ExportOptions, FetchPipeline, FetchSettings, QueryStatus,
    StopHandle,
};

const EFETCH_XML: &str = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">38000001</PMID>
      <Article>
        <Journal>
          <JournalIssue><PubDate><Year>2023</Year><Month>Nov</Month></PubDate></JournalIssue>
          <Title>Journal for ImmunoTherapy of Cancer</Title>
        </Journal>
        <ArticleTitle>PD-1 blockade outcomes</ArticleTitle>
        <Abstract><AbstractText>Checkpoint results.</AbstractText></Abstract>
        <AuthorList>
          <Author>
            <LastName>Garcia</LastName><ForeName>Maria</ForeName>
            <AffiliationInfo><Affiliation>Pfizer Worldwide Research, Groton, CT, USA.</Affiliation></AffiliationInfo>
          </Author>
        </AuthorList>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">38000002</PMID>
      <Article>
        <Journal>
          <JournalIssue><PubDate><Year>2022</Year></PubDate></JournalIssue>
          <Title>Frontiers in Oncology</Title>
        </Journal>
        <ArticleTitle>Tumour microenvironment survey</ArticleTitle>
        <AuthorList>
          <Author><LastName>Doe</LastName><ForeName>Jane</ForeName></Author>
        </AuthorList>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

const QUERY: &str = "cancer immunotherapy";

fn source() -> FakeSource {
    let mut source = FakeSource::new().with_query(QUERY, &["38000001", "38000002", "38000003"]);
    for record in parse_pubmed_xml(EFETCH_XML).unwrap() {
        source = source.with_raw(record);
    }
    source
}

fn pipeline(source: FakeSource) -> FetchPipeline<FakeSource> {
    let ruleset = Arc::new(Ruleset::builtin().unwrap());
    let settings = FetchSettings { min_delay: Duration::from_millis(100), ..FetchSettings::default() };
    FetchPipeline::new(source, ruleset, Arc::new(ManualClock::new()), settings)
}

#[tokio::test]
async fn test_single_query_to_csv() {
    let mut pipeline = pipeline(source());
    let papers = pipeline.fetch(QUERY, 2).await.unwrap().collect().await.unwrap();
    assert_eq!(papers.len(), 2);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pubmed_results.csv");
    let options = ExportOptions::from_config(&AppConfig::default().output, ExportMode::Single);
    let rows = export_to_path(&path, &papers, &options).unwrap();
    assert_eq!(rows, 2);

    let mut rdr = csv::Reader::from_path(&path).unwrap();
    let records: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 2);

    assert_eq!(&records[0][0], "38000001");
    assert_eq!(&records[0][2], "Maria Garcia");
    assert_eq!(&records[0][4], "2023-11");
    assert_eq!(&records[0][7], "true");

    assert_eq!(&records[1][0], "38000002");
    assert_eq!(&records[1][5], "");
    assert_eq!(&records[1][7], "false");
}

#[tokio::test]
async fn test_batch_with_overlap_and_failure() {
    let source = source()
        .with_query("pd-1 inhibitors", &["38000001"])
        .failing_searches("car-t", u32::MAX);
    let mut aggregator = BatchAggregator::new(pipeline(source), DedupMode::FirstSeen);
    let queries: Vec<String> = [QUERY, "car-t", "pd-1 inhibitors"].iter().map(|q| q.to_string()).collect();
    let result = aggregator.run(&queries, 10, &StopHandle::new()).await;

    assert_eq!(result.outcomes()[0].status, QueryStatus::Completed);
    assert!(matches!(result.outcomes()[1].status, QueryStatus::Failed { .. }));
    assert_eq!(result.outcomes()[2].status, QueryStatus::Completed);

    let stats = result.statistics();
    assert_eq!(stats.total_papers, 3);
    assert_eq!(stats.exported_papers, 2);
    assert_eq!(stats.duplicate_count, 1);
    assert_eq!(stats.industry_count, 1);
    assert_eq!(stats.failures[0].query, "car-t");
    assert_eq!(stats.papers_per_year.get("2023"), Some(&1));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("batch.csv");
    let options = ExportOptions::from_config(&AppConfig::default().output, ExportMode::Batch);
    export_to_path(&path, result.papers(), &options).unwrap();

    let mut rdr = csv::Reader::from_path(&path).unwrap();
    let records: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| &r[8] == QUERY));
    assert!(records.iter().all(|r| r[9].ends_with('Z')));
}
