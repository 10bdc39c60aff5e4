use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trendpost_core::config::LoggingConfig;

pub const LOG_FILE_NAME: &str = "trendpost.log";

/// Flushes the file writer when dropped; keep it alive for the whole process.
pub struct LoggingGuard {
    _guard: Option<WorkerGuard>,
}

/// `RUST_LOG` wins over the configured level.
fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

pub fn init(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let stdout_layer = fmt::layer().json();

    let (file_layer, guard) = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {dir}"))?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_NAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter(&config.level))
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    tracing::info!(
        level = %config.level,
        log_dir = config.dir.as_deref().unwrap_or("-"),
        "logging initialized"
    );
    Ok(LoggingGuard { _guard: guard })
}
