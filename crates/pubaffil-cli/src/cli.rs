//! Command-line arguments.

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};
use pubaffil_common::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "pubaffil")]
#[command(version, about = "Fetch PubMed papers and flag industry-affiliated authors")]
pub struct Cli {
    /// Configuration file (.toml, .yaml or .json)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Extra ruleset terms merged over the configured ruleset (repeatable)
    #[arg(long = "ruleset-extend", global = true, value_name = "FILE")]
    pub ruleset_extend: Vec<PathBuf>,

    /// Minimum delay between PubMed requests, in milliseconds
    #[arg(long, global = true)]
    pub rate_limit_ms: Option<u64>,

    /// Retries after a failed request
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one query and export its papers
    Search(SearchArgs),
    /// Run several queries and export the merged, deduplicated papers
    Batch(BatchArgs),
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// PubMed query
    #[arg(short, long)]
    pub query: String,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("input").required(true).args(["queries", "file"])))]
pub struct BatchArgs {
    /// PubMed queries
    #[arg(short = 'q', long = "query", num_args = 1..)]
    pub queries: Vec<String>,

    /// File with one query per line (`#` starts a comment)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Contact email sent to NCBI (falls back to PUBAFFIL_EMAIL)
    #[arg(short, long)]
    pub email: Option<String>,

    /// Output CSV path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Maximum papers per query
    #[arg(short, long)]
    pub max_results: Option<usize>,
}

impl Cli {
    pub fn common(&self) -> &CommonArgs {
        match &self.command {
            Command::Search(args) => &args.common,
            Command::Batch(args) => &args.common,
        }
    }

    /// Fold command-line overrides into the loaded configuration.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(ms) = self.rate_limit_ms {
            config.search.rate_limit_delay_ms = ms;
        }
        if let Some(n) = self.max_retries {
            config.search.max_retries = n;
        }
        config.ruleset.extend.extend(self.ruleset_extend.iter().cloned());
    }
}
