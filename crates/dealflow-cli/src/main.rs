//! `dealflow` operator CLI
//!
//! - `extract`: aggregate an inbound message (JSON) into one corpus
//! - `link`: aggregate a single gated link
//! - `record`: store a deal from a field map and report what is missing
//! - `next-id`: show the id the next deal will get

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use dealflow_config::{init_environment, DealflowConfig};
use dealflow_deals::{CsvSink, DealCounter, DealIntake, FieldExtractor};
use dealflow_extract::{Aggregator, ArtifactPlacement, Extraction, InboundMessage};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dealflow")]
#[command(version, about = "Aggregate deal messages, gated decks and attachments into searchable text")]
struct Cli {
    /// Config file (default: ~/.dealflow/config/dealflow.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Aggregate an inbound message read from a JSON file (`-` for stdin)
    Extract {
        #[arg(long)]
        message: PathBuf,

        /// File the PDFs under this account
        #[arg(long)]
        account: Option<String>,

        /// Print the full extraction as JSON instead of the corpus
        #[arg(long)]
        json: bool,
    },

    /// Aggregate a single DocSend link
    Link {
        url: String,

        #[arg(long)]
        account: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Store a deal from a JSON field map (`-` for stdin)
    Record {
        #[arg(long)]
        fields: PathBuf,

        /// Key of the outbound follow-up message
        #[arg(long, default_value = "cli")]
        key: String,
    },

    /// Show the next deal id without consuming it
    NextId,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = init_environment(cli.config.as_deref()).context("failed to load configuration")?;
    init_tracing(&config.log_filter);

    match cli.command {
        Command::Extract { message, account, json } => {
            let raw = read_input(&message)?;
            let message: InboundMessage = serde_json::from_str(&raw).context("invalid message JSON")?;
            let aggregator = Aggregator::new(config.extractor.clone())?;
            let extraction = aggregator.extract(&message).await?;
            finish(&config, extraction, account.as_deref(), json).await
        }
        Command::Link { url, account, json } => {
            let aggregator = Aggregator::new(config.extractor.clone())?;
            let extraction = aggregator.extract_link(&url).await?;
            finish(&config, extraction, account.as_deref(), json).await
        }
        Command::Record { fields, key } => {
            let raw = read_input(&fields)?;
            let fields: HashMap<String, String> = serde_json::from_str(&raw).context("invalid field map JSON")?;
            let intake = DealIntake::new(
                Arc::new(FixedFields(fields)),
                Arc::new(CsvSink::new(&config.records_file)),
                DealCounter::new(&config.counter_file),
                config.pending_capacity,
            )
            .with_follow_up_fields(config.follow_up_fields.clone());

            let outcome = intake.ingest(&key, "", &[], None).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Command::NextId => {
            let counter = DealCounter::new(&config.counter_file);
            println!("{}", counter.peek().await?);
            Ok(())
        }
    }
}

fn init_tracing(fallback: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(fallback))
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

async fn finish(config: &DealflowConfig, extraction: Extraction, account: Option<&str>, json: bool) -> Result<()> {
    for failure in &extraction.failures {
        warn!("{} failed: {}", failure.job, failure.error);
    }
    if extraction.needs_verification() {
        warn!("A document asked for email verification; confirm {} and retry", config.extractor.email);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&extraction)?);
    } else {
        println!("{}", extraction.corpus);
    }

    let Some(account) = account else {
        return Ok(());
    };
    if account.trim().is_empty() {
        bail!("--account must not be empty");
    }
    let report = ArtifactPlacement::new(&config.accounts_dir)
        .place_extraction(account, extraction)
        .await?;
    info!(
        "Placed {} artifact(s) for {}, {} duplicate(s), {} failed",
        report.placed.len(),
        account,
        report.duplicates.len(),
        report.failed.len()
    );
    Ok(())
}

/// Field source for deals entered by hand
struct FixedFields(HashMap<String, String>);

#[async_trait]
impl FieldExtractor for FixedFields {
    async fn format_deal(&self, _text: &str) -> dealflow_deals::Result<HashMap<String, String>> {
        Ok(self.0.clone())
    }

    async fn parse_reply(&self, _reply: &str, _missing: &[String]) -> dealflow_deals::Result<HashMap<String, String>> {
        Ok(HashMap::new())
    }
}
