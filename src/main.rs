mod config;
mod extract;
mod pdf;
mod pipeline;
mod prompts;
mod record;
mod schedule;
mod storage;
mod validate;
mod webhook;

use clap::builder::RangedU64ValueParser;
use clap::{Parser, Subcommand};
use config::Config;
use pipeline::{Pipeline, PipelineError, ProcessOptions};
use record::ExtractedRecord;
use schedule::ScheduleOutcome;
use std::path::{Path, PathBuf};
use storage::{LocalObjectStore, ObjectStore};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use validate::ResponseValidator;
use webhook::{HttpWebhook, Webhook};

#[derive(Parser)]
#[command(name = "conciliation-intake", version, about = "Conciliation-hearing request intake")]
struct Cli {
    /// TOML configuration file; defaults apply when it does not exist.
    #[arg(long, global = true, env = "INTAKE_CONFIG", default_value = "intake.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline on one PDF and print the enriched record.
    Process {
        pdf: PathBuf,
        /// Also save the record here, before webhook delivery.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Override the configured page limit.
        #[arg(long, value_parser = page_limit())]
        pages: Option<usize>,
        /// Skip webhook delivery.
        #[arg(long, conflicts_with = "webhook")]
        no_webhook: bool,
        /// Deliver to this URL instead of the configured one.
        #[arg(long)]
        webhook: Option<String>,
    },
    /// Keep only the leading pages of a PDF.
    Trim {
        pdf: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, value_parser = page_limit())]
        pages: Option<usize>,
    },
    /// Derive the hearing window from a date, hour and jornada.
    Schedule {
        #[arg(long)]
        date: String,
        #[arg(long)]
        hora: String,
        #[arg(long, default_value = "")]
        jornada: String,
    },
    /// Validate and schedule a saved record.
    Validate { json: PathBuf },
    /// Put a file into the object store.
    Upload { file: PathBuf },
}

/// Page limits follow the same rule as `processing.max_pages`: at least 1.
fn page_limit() -> RangedU64ValueParser<usize> {
    RangedU64ValueParser::<usize>::new().range(1..)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logs go to stderr, records to stdout
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Install crypto provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "failed to install rustls crypto provider")?;

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    match cli.command {
        Command::Process {
            pdf,
            output,
            pages,
            no_webhook,
            webhook,
        } => process(&cfg, &pdf, output, pages, no_webhook, webhook).await,
        Command::Trim { pdf, out, pages } => {
            let bytes = tokio::fs::read(&pdf).await?;
            let max_pages = pages.unwrap_or(cfg.processing.max_pages);
            let (trimmed, kept, total) = pdf::trim_pdf(&bytes, max_pages)?;
            tokio::fs::write(&out, trimmed).await?;
            println!("{}: kept {kept} of {total} pages -> {}", pdf.display(), out.display());
            Ok(())
        }
        Command::Schedule { date, hora, jornada } => {
            match schedule::assemble(&date, &hora, &jornada) {
                Ok(window) => {
                    let resolved = window.jornada.map(|j| j.as_str()).unwrap_or("-");
                    println!("fecha_inicio: {}", window.start_iso());
                    println!("fecha_fin:    {}", window.end_iso());
                    println!("hora (24h):   {}", window.clock);
                    println!("jornada:      {resolved}");
                }
                Err(reason) => println!("skipped: {reason}"),
            }
            Ok(())
        }
        Command::Validate { json } => {
            let content = tokio::fs::read_to_string(&json).await?;
            let mut record = ExtractedRecord::from_value(serde_json::from_str(&content)?)?;
            let warnings = ResponseValidator::new(cfg.validation.clone()).validate(&record);
            if let ScheduleOutcome::Skipped(reason) = schedule::apply_schedule(&mut record) {
                eprintln!("schedule skipped: {reason}");
            }
            for w in &warnings {
                eprintln!("warning: {w}");
            }
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Command::Upload { file } => {
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or("upload path has no file name")?
                .to_string();
            let bytes = tokio::fs::read(&file).await?;
            let stored = LocalObjectStore::new(&cfg.storage).put(&name, bytes).await?;
            println!("key: {}", stored.key);
            println!("url: {}", stored.url);
            Ok(())
        }
    }
}

async fn process(
    cfg: &Config,
    pdf: &Path,
    output: Option<PathBuf>,
    pages: Option<usize>,
    no_webhook: bool,
    webhook_url: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let file_name = pdf
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document.pdf")
        .to_string();
    let bytes = tokio::fs::read(pdf).await?;

    let url = webhook_url.or_else(|| {
        cfg.webhook
            .enabled
            .then(|| cfg.webhook.url.clone())
            .flatten()
    });
    let webhook: Option<Box<dyn Webhook>> = match (&url, no_webhook) {
        (Some(url), false) => Some(Box::new(HttpWebhook::new(url, &cfg.webhook)?)),
        _ => None,
    };

    let pipeline = Pipeline::new(
        extract::from_config(&cfg.llm).await?,
        webhook,
        prompts::PromptSet::from_config(&cfg.prompts),
        ResponseValidator::new(cfg.validation.clone()),
    );
    let opts = ProcessOptions {
        max_pages: pages.unwrap_or(cfg.processing.max_pages),
        output,
        deliver: url.is_some() && !no_webhook,
    };

    match pipeline.process(&file_name, bytes, &opts).await {
        Ok(outcome) => {
            info!(
                id = %outcome.document_id,
                trim = ?outcome.trim,
                warnings = outcome.warnings.len(),
                "Pipeline finished"
            );
            println!("{}", serde_json::to_string_pretty(&outcome.record)?);
            if let Some(receipt) = outcome.delivery {
                eprintln!("delivered to {} ({}) at {}", receipt.url, receipt.status, receipt.timestamp);
            }
            Ok(())
        }
        Err(PipelineError::Webhook { source, record }) => {
            // the record is still useful to the operator
            println!("{}", serde_json::to_string_pretty(&record)?);
            error!(error = %source, "Webhook delivery failed");
            Err(source.into())
        }
        Err(e) => Err(e.into()),
    }
}
