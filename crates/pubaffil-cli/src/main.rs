//! pubaffil: PubMed retrieval with industry-affiliation screening.
//! Entry point for the command-line binary.

mod cli;
mod queries;
mod signal;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use pubaffil_common::{AppConfig, PubaffilError, Result};
use pubaffil_ingestion::schedule::SystemClock;
use pubaffil_ingestion::sources::pubmed::PubMedClient;
use pubaffil_ingestion::{
    export_to_path, BatchAggregator, ExportMode, ExportOptions, FetchPipeline, FetchSettings, StopHandle,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{BatchArgs, Cli, Command, SearchArgs};

const EMAIL_ENV_VAR: &str = "PUBAFFIL_EMAIL";
const API_KEY_ENV_VAR: &str = "NCBI_API_KEY";

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "pubaffil=debug,info" } else { "pubaffil=info,warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) if e.is_config() => {
            error!("{e}");
            ExitCode::from(2)
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    let ruleset = config.ruleset.build()?;
    info!(terms = ruleset.len(), "Ruleset loaded");

    let common = cli.common();
    let email = match &common.email {
        Some(email) => email.clone(),
        None => std::env::var(EMAIL_ENV_VAR).map_err(|_| {
            PubaffilError::config(format!("a contact email is required (--email or {EMAIL_ENV_VAR})"))
        })?,
    };
    let api_key = std::env::var(API_KEY_ENV_VAR).ok();
    if api_key.is_some() {
        info!("Using NCBI API key");
    }
    let client = PubMedClient::new(&email, api_key, Duration::from_secs(config.search.timeout_secs))?;

    let pipeline = FetchPipeline::new(
        client,
        Arc::new(ruleset),
        Arc::new(SystemClock),
        FetchSettings::from_config(&config.search),
    );
    let max_results = common.max_results.unwrap_or(config.search.default_max_results);

    match &cli.command {
        Command::Search(args) => run_search(args, pipeline, &config, max_results).await,
        Command::Batch(args) => run_batch(args, pipeline, &config, max_results).await,
    }
}

async fn run_search(
    args: &SearchArgs,
    mut pipeline: FetchPipeline<PubMedClient>,
    config: &AppConfig,
    max_results: usize,
) -> Result<ExitCode> {
    let query = args.query.trim();
    if query.is_empty() {
        return Err(PubaffilError::config("empty query"));
    }
    info!(query = %query, max_results, "Searching PubMed");

    let fetched = match pipeline.fetch(query, max_results).await {
        Ok(stream) => stream.collect().await,
        Err(e) => Err(e),
    };
    let papers = match fetched {
        Ok(papers) => papers,
        Err(e @ PubaffilError::Fetch { .. }) => {
            error!("{e}");
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e),
    };
    if papers.is_empty() {
        warn!(query = %query, "No papers found");
        return Ok(ExitCode::FAILURE);
    }

    let industry = papers.iter().filter(|p| p.has_industry_affiliation() == Some(true)).count();
    info!(papers = papers.len(), industry, "Papers classified");

    let output = args
        .common
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.default_filename));
    let options = ExportOptions::from_config(&config.output, ExportMode::Single);
    export_to_path(&output, &papers, &options)?;
    Ok(ExitCode::SUCCESS)
}

async fn run_batch(
    args: &BatchArgs,
    pipeline: FetchPipeline<PubMedClient>,
    config: &AppConfig,
    max_results: usize,
) -> Result<ExitCode> {
    let queries = match &args.file {
        Some(path) => queries::load_queries(path)?,
        None => queries::clean_queries(&args.queries)?,
    };
    info!(n_queries = queries.len(), max_results, "Starting batch");

    let stop = StopHandle::new();
    signal::spawn_interrupt_listener(stop.clone());

    let mut aggregator = BatchAggregator::new(pipeline, config.batch.dedup);
    let result = aggregator.run(&queries, max_results, &stop).await;
    result.statistics().log_summary();

    let output = args.common.output.clone().unwrap_or_else(|| {
        PathBuf::from(format!("batch_results_{}.csv", chrono::Local::now().format("%Y%m%d_%H%M%S")))
    });
    let options = ExportOptions::from_config(&config.output, ExportMode::Batch);
    export_to_path(&output, result.papers(), &options)?;
    Ok(ExitCode::SUCCESS)
}
