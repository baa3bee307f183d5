//! clipstash: operator CLI for the Clipstash upload and preview pipeline.
//!
//! Configuration comes from the environment (see `.env.example`). Record commands need
//! DATABASE_URL; without it, records live in memory for the duration of the command.

use anyhow::Context;
use clap::{Parser, Subcommand};
use clipstash_cli::{ingest_file, IngestOptions, Services};
use clipstash_core::{AppError, ClipstashConfig};
use clipstash_infra::{init_telemetry, shutdown_telemetry, ErrorReport, TelemetryConfig};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "clipstash", about = "Clipstash upload and preview pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file through the chunked upload path
    Ingest {
        file: PathBuf,
        /// Chunk size in KiB
        #[arg(long, default_value = "1024")]
        chunk_size_kb: u64,
        /// Send chunks in random order
        #[arg(long)]
        shuffle: bool,
        /// Owner recorded on the media record (random when omitted)
        #[arg(long)]
        owner: Option<Uuid>,
        /// Declared content type (derived from the file extension when omitted)
        #[arg(long)]
        content_type: Option<String>,
        /// Return without waiting for previews
        #[arg(long)]
        no_wait: bool,
    },
    /// Show a media record
    Status { record_id: Uuid },
    /// Regenerate previews for records that have none
    Repair {
        #[arg(long, default_value = "100")]
        limit: i64,
    },
    /// Reclaim orphaned chunk directories and leftover temp files
    Sweep {
        /// Minimum age in seconds (defaults to SESSION_IDLE_TIMEOUT_SECS)
        #[arg(long)]
        older_than_secs: Option<u64>,
    },
    /// Check every storage directory for mount, permissions and free space
    CheckStorage {
        /// Bytes the next write needs, in MiB, on top of the safety margin
        #[arg(long, default_value = "0")]
        required_mb: u64,
    },
    /// Show detected ffmpeg and ffprobe versions
    Tools,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let telemetry = TelemetryConfig::from_env("clipstash");
    if let Err(e) = init_telemetry(&telemetry) {
        eprintln!("Failed to initialise tracing: {}", e);
    }

    let cli = Cli::parse();
    let config = match ClipstashConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    let is_production = config.is_production();

    let result = run(cli.command, config).await;
    shutdown_telemetry().await;

    match result {
        Ok(code) => code,
        Err(e) => {
            match e.downcast_ref::<AppError>() {
                Some(app_error) => {
                    eprintln!("{}", ErrorReport::from_app_error(app_error, is_production).to_json())
                }
                None => eprintln!("Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: ClipstashConfig) -> anyhow::Result<ExitCode> {
    let services = Services::connect(config).await?;

    match command {
        Commands::Ingest {
            file,
            chunk_size_kb,
            shuffle,
            owner,
            content_type,
            no_wait,
        } => {
            let options = IngestOptions {
                chunk_size: chunk_size_kb * 1024,
                shuffle,
                owner_id: owner.unwrap_or_else(Uuid::new_v4),
                content_type,
            };
            let summary = ingest_file(&services.assembler, &file, &options).await?;

            if no_wait {
                services.queue.shutdown().await;
            } else {
                services.queue.drain().await;
            }

            print_json(&serde_json::json!({
                "upload": summary,
                "record": services.repository.get(summary.record_id).await?,
            }))?;
        }
        Commands::Status { record_id } => {
            require_database(&services)?;
            let record = services
                .repository
                .get(record_id)
                .await?
                .with_context(|| format!("No media record {}", record_id))?;
            print_json(&record)?;
        }
        Commands::Repair { limit } => {
            require_database(&services)?;
            let summary = services.pipeline.repair_missing(limit).await?;
            services.queue.shutdown().await;
            print_json(&serde_json::json!({
                "scanned": summary.scanned,
                "repaired": summary.repaired,
                "failed": summary.failed,
            }))?;
            if summary.failed > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Sweep { older_than_secs } => {
            let older_than = older_than_secs
                .map(Duration::from_secs)
                .unwrap_or(services.config.upload.session_idle_timeout);
            let report = services.sweeper(older_than).sweep_once().await;
            services.queue.shutdown().await;
            print_json(&serde_json::json!({
                "idle_sessions": report.idle_sessions,
                "orphaned_dirs": report.orphaned_dirs,
                "temp_files": report.temp_files,
            }))?;
        }
        Commands::CheckStorage { required_mb } => {
            let reports = services
                .check_storage(required_mb * clipstash_core::constants::BYTES_PER_MB)
                .await;
            services.queue.shutdown().await;

            let healthy = reports.iter().all(|r| r.is_ok());
            let rendered: Vec<_> = reports
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "directory": r.directory,
                        "ok": r.is_ok(),
                        "kind": r.kind().map(|k| k.as_str()),
                        "detail": r.failure.as_ref().map(|f| f.to_string()),
                        "remediation": r.kind().map(|k| k.remediation_hint()),
                    })
                })
                .collect();
            print_json(&rendered)?;
            if !healthy {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Tools => {
            let versions = services.tools.versions().await;
            services.queue.shutdown().await;
            match versions {
                Ok(v) => print_json(&serde_json::json!({
                    "ffmpeg": v.ffmpeg,
                    "ffprobe": v.ffprobe,
                }))?,
                Err(e) => {
                    let err: AppError = e.into();
                    return Err(err.into());
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn require_database(services: &Services) -> anyhow::Result<()> {
    if !services.has_database {
        anyhow::bail!("DATABASE_URL must be set for this command");
    }
    Ok(())
}
