//! Sweep command implementation
//!
//! Runs one reconciliation sweep and prints its summary.

use crate::config::load_config;
use crate::core::engine::SyncEngine;
use crate::core::reconcile::SweepSummary;
use crate::domain::events::SweepKind;
use clap::Args;
use tokio::sync::watch;

/// Arguments for the sweep command
#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Which sweep to run (encounters, items, duplicates, all)
    #[arg(default_value = "all")]
    pub sweep: SweepKind,

    /// Force dry-run mode regardless of configuration
    #[arg(long)]
    pub dry_run: bool,
}

impl SweepArgs {
    /// Execute the sweep command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Configuration load failed");
                eprintln!("Configuration error: {e}");
                return Ok(2);
            }
        };
        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }

        let engine = match SyncEngine::from_config(&config).await {
            Ok(engine) => engine.with_shutdown(shutdown_signal),
            Err(e) => {
                tracing::error!(error = %e, "Failed to create sync engine");
                eprintln!("Failed to initialize: {e}");
                return Ok(4);
            }
        };

        crate::log_sweep_start!(self.sweep, "cli");
        println!("🚀 Running {} sweep...", self.sweep);
        println!();

        let summary = match engine.reconcile(self.sweep).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!(error = %e, "Sweep failed");
                eprintln!("Sweep failed: {e}");
                return Ok(5);
            }
        };

        print_summary(&summary);
        Ok(exit_code(&summary))
    }
}

fn print_summary(summary: &SweepSummary) {
    println!("📊 Sweep Summary:");
    println!("  Encounters Examined: {}", summary.encounters_examined);
    println!("  Encounters Submitted: {}", summary.encounters_submitted);
    println!("  Encounters Not Ready: {}", summary.encounters_not_ready);
    println!("  Encounters Failed: {}", summary.encounters_failed);
    println!("  Duplicates Recorded: {}", summary.duplicates_recorded);
    println!("  Duplicates Resolved: {}", summary.duplicates_resolved);
    println!("  Items Accepted: {}", summary.items.accepted);
    println!("  Items Rejected: {}", summary.items.rejected);
    println!("  Items Failed: {}", summary.items.failed);
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
    println!();

    if !summary.errors.is_empty() {
        println!("⚠️  Errors encountered:");
        for error in &summary.errors {
            println!("  - {:?}: {}", error.error_type, error.message);
            if let Some(context) = &error.context {
                println!("    Context: {context}");
            }
        }
        println!();
    }
}

/// 130 when interrupted, 1 on partial failure, 0 otherwise
pub fn exit_code(summary: &SweepSummary) -> i32 {
    if summary.interrupted {
        println!("⚠️  Sweep interrupted. Remaining records are picked up by the next sweep.");
        130
    } else if summary.is_successful() {
        println!("✅ Sweep completed successfully!");
        0
    } else {
        println!("⚠️  Sweep completed with failures");
        1
    }
}
