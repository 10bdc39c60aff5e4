//! trendpost - periodic analytics trend report
//!
//! Usage:
//!   trendpost                      Run on the configured schedule
//!   trendpost --run-immediately    Run once now, then keep the schedule
//!   trendpost --run-once           Run a single report and exit
//!   trendpost --test               Check analytics, LLM and SMTP connectivity

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing::{error, info};

use trendpost_core::config::Config;
use trendpost_worker::{logging, pipeline, scheduler, state::AppState};

#[derive(Debug, Parser)]
#[command(name = "trendpost", version, about = "Periodic analytics trend report by email")]
struct Cli {
    /// Generate and send one report, then exit
    #[arg(long, conflicts_with = "test")]
    run_once: bool,

    /// Test connections to all collaborators, then exit
    #[arg(long)]
    test: bool,

    /// Run a report at startup before following the schedule
    #[arg(long)]
    run_immediately: bool,

    /// Overrides TRENDPOST_LOG_LEVEL
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;
    if let Some(level) = cli.log_level {
        cfg.logging.level = level.to_lowercase();
    }
    let _log_guard = logging::init(&cfg.logging)?;
    info!(site = %cfg.target_website, "configuration loaded");

    let state = Arc::new(AppState::from_config(cfg)?);

    if cli.test {
        let report = pipeline::test_connections(&state).await;
        if !report.all_ok() {
            anyhow::bail!("connection test failed");
        }
        info!("all connections ok");
        return Ok(());
    }

    if cli.run_once {
        pipeline::run_report(&state, Utc::now()).await?;
        return Ok(());
    }

    tokio::select! {
        _ = scheduler::run_scheduler_loop(Arc::clone(&state), cli.run_immediately) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received, stopping scheduler");
        }
    }
    Ok(())
}
