//! Thyrocase: Hybrid CBR & decision fusion engine
//!
//! Command-line entry point. Responses are written to stdout as JSON; logs
//! go to stderr or a file.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use thyrocase::adapters::sanitize::SanitizingMakeWriter;
use thyrocase::adapters::CsvReferenceSource;
use thyrocase::application::{evaluate, BatchProgress, BatchWorker, PredictionService};
use thyrocase::config::ServiceConfig;
use thyrocase::ports::ReferenceSource;

#[derive(Debug, Parser)]
#[command(
    name = "thyrocase",
    version,
    about = "Hybrid case-based reasoning and decision fusion for thyroid status classification",
    long_about = "Classifies thyroid status (Normal / Hypothyroid / Hyperthyroid) by fusing a trained \
        classifier with case matching against labeled reference cohorts.\n\n\
        Configuration is read from THYROCASE_* environment variables.\n\n\
        EXAMPLES:\n\
        \n  echo '{\"TSH\": 6.2, \"Age\": 51}' | thyrocase predict\n\
        \n  thyrocase batch --input requests.ndjson\n\
        \n  thyrocase evaluate --input thyroid_lab_reference.csv\n\
        \n  thyrocase info"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Assess one JSON request (stdin by default)
    Predict {
        /// Read the request from FILE instead of stdin
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,
    },
    /// Assess newline-delimited JSON requests, one response per line
    Batch {
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
    },
    /// Score a labeled reference CSV: confusion matrix and per-class metrics
    Evaluate {
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
    },
    /// Show which collaborators and reference cohorts were loaded
    Info,
}

fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_mode = std::env::var("THYROCASE_LOG_MODE").unwrap_or_else(|_| "stderr".to_string());

    let (writer, guard) = if log_mode == "file" {
        let log_file =
            std::env::var("THYROCASE_LOG_FILE").unwrap_or_else(|_| "thyrocase.log".to_string());

        if let Some(parent) = Path::new(&log_file).parent() {
            // Best-effort: don't fail startup just because the directory is missing.
            let _ = std::fs::create_dir_all(parent);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .with_context(|| format!("Failed to open log file {log_file}"))?;
        tracing_appender::non_blocking(file)
    } else {
        tracing_appender::non_blocking(std::io::stderr())
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(SanitizingMakeWriter::new(writer)),
        )
        .init();

    Ok(guard)
}

fn read_request(input: Option<&Path>) -> Result<Value> {
    let mut content = String::new();
    match input {
        Some(path) => {
            content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
        }
        None => {
            std::io::stdin()
                .read_to_string(&mut content)
                .context("Failed to read request from stdin")?;
        }
    }
    if content.trim().is_empty() {
        return Ok(Value::Null);
    }
    // Unparseable input is answered like an empty request.
    Ok(serde_json::from_str(&content).unwrap_or_else(|e| {
        tracing::warn!("Request is not valid JSON: {}", e);
        Value::Null
    }))
}

fn read_batch(path: &Path) -> Result<Vec<Value>> {
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut payloads = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", n + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        payloads.push(serde_json::from_str(&line).unwrap_or_else(|e| {
            tracing::warn!("Line {} is not valid JSON: {}", n + 1, e);
            Value::Null
        }));
    }
    Ok(payloads)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging()?;

    let config = ServiceConfig::from_env()?;
    tracing::info!("Starting Thyrocase...");
    let service = Arc::new(PredictionService::from_config(&config));

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Predict { input } => {
            let request = read_request(input.as_deref())?;
            let response = service.respond(&request);
            serde_json::to_writer_pretty(&mut out, &response)?;
            writeln!(out)?;
        }
        Command::Batch { input } => {
            let payloads = read_batch(&input)?;
            let handle = BatchWorker::spawn(Arc::clone(&service), payloads);
            let mut total = 0;
            for update in handle {
                match update {
                    BatchProgress::Started { total: n } => total = n,
                    BatchProgress::Completed { index, response } => {
                        serde_json::to_writer(&mut out, &response)?;
                        writeln!(out)?;
                        tracing::info!("Processed {}/{}", index + 1, total);
                    }
                    BatchProgress::Finished { succeeded, failed } => {
                        tracing::info!("Batch finished: {} succeeded, {} failed", succeeded, failed);
                    }
                }
            }
        }
        Command::Evaluate { input } => {
            let table = CsvReferenceSource::new(&input)
                .load()
                .with_context(|| format!("Failed to load {}", input.display()))?;
            let report = evaluate(Arc::clone(&service), &table);
            serde_json::to_writer_pretty(&mut out, &report)?;
            writeln!(out)?;
        }
        Command::Info => {
            let info = json!({
                "fusion_profile": config.fusion_profile,
                "policy": service.policy(),
                "cohort_size": config.cohort_size,
                "pipelines": service.status(),
            });
            serde_json::to_writer_pretty(&mut out, &info)?;
            writeln!(out)?;
        }
    }
    out.flush()?;

    tracing::info!("Thyrocase shutdown complete.");
    Ok(())
}
