//! Ingest command implementation
//!
//! Consumes NDJSON inbound events, one per line, the way a queue consumer
//! would. A failing line is logged and counted; it never stops the run.

use crate::config::load_config;
use crate::core::engine::SyncEngine;
use crate::domain::events::InboundEvent;
use clap::Args;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::watch;

/// Arguments for the ingest command
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// NDJSON file of events, or "-" for stdin
    #[arg(short, long, default_value = "-")]
    pub file: String,
}

/// Counters of one ingest run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub lines: usize,
    pub handled: usize,
    pub malformed: usize,
    pub failed: usize,
    pub interrupted: bool,
}

impl IngestSummary {
    pub fn is_successful(&self) -> bool {
        self.malformed == 0 && self.failed == 0
    }
}

impl IngestArgs {
    /// Execute the ingest command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Configuration load failed");
                eprintln!("Configuration error: {e}");
                return Ok(2);
            }
        };

        let engine = match SyncEngine::from_config(&config).await {
            Ok(engine) => engine.with_shutdown(shutdown_signal.clone()),
            Err(e) => {
                tracing::error!(error = %e, "Failed to create sync engine");
                eprintln!("Failed to initialize: {e}");
                return Ok(4);
            }
        };

        tracing::info!(source = %self.file, "Starting ingest");
        let summary = if self.file == "-" {
            let reader = BufReader::new(tokio::io::stdin());
            ingest_lines(&engine, reader, &shutdown_signal).await?
        } else {
            let file = match tokio::fs::File::open(&self.file).await {
                Ok(file) => file,
                Err(e) => {
                    eprintln!("Cannot open {}: {e}", self.file);
                    return Ok(2);
                }
            };
            ingest_lines(&engine, BufReader::new(file), &shutdown_signal).await?
        };

        println!("📥 Ingest Summary:");
        println!("  Lines: {}", summary.lines);
        println!("  Handled: {}", summary.handled);
        println!("  Malformed: {}", summary.malformed);
        println!("  Failed: {}", summary.failed);

        Ok(if summary.interrupted {
            130
        } else if summary.is_successful() {
            0
        } else {
            1
        })
    }
}

/// Handles every line of `reader` in order
pub async fn ingest_lines<R>(
    engine: &SyncEngine,
    reader: R,
    shutdown: &watch::Receiver<bool>,
) -> std::io::Result<IngestSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = IngestSummary::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        if *shutdown.borrow() {
            summary.interrupted = true;
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        summary.lines += 1;

        let event: InboundEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                summary.malformed += 1;
                tracing::warn!(line = summary.lines, error = %e, "Malformed event skipped");
                continue;
            }
        };

        match engine.handle(event).await {
            Ok(_) => summary.handled += 1,
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(line = summary.lines, error = %e, "Event failed");
            }
        }
    }

    tracing::info!(
        lines = summary.lines,
        handled = summary.handled,
        malformed = summary.malformed,
        failed = summary.failed,
        "Ingest finished"
    );
    Ok(summary)
}
