//! Tracing setup.
//!
//! The interactive wizard owns the terminal, so it logs to
//! `<state>/logs/regwizard-{timestamp}.log`. Subcommands log to stderr.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Keeps the file writer alive; dropping it flushes buffered lines
pub struct LoggingHandle {
    pub _guard: Option<WorkerGuard>,
    pub log_file_path: Option<PathBuf>,
}

/// Where log output should go for this run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    File,
    Stderr,
}

impl LogTarget {
    pub fn select(config: &Config, interactive: bool) -> Self {
        if interactive && config.logging.to_file {
            LogTarget::File
        } else {
            LogTarget::Stderr
        }
    }
}

pub fn log_file_name(now: DateTime<Utc>) -> String {
    format!("regwizard-{}.log", now.format("%Y%m%dT%H%M%SZ"))
}

/// `RUST_LOG` wins over the configured level; `--debug` wins over both
fn level_directive(config: &Config, debug_override: bool) -> String {
    if debug_override {
        return "debug".to_string();
    }
    std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone())
}

/// Install the global subscriber. Call once per process.
pub fn init_logging(
    config: &Config,
    interactive: bool,
    debug_override: bool,
) -> Result<LoggingHandle> {
    let filter = EnvFilter::new(level_directive(config, debug_override));

    match LogTarget::select(config, interactive) {
        LogTarget::File => {
            let logs_dir = config.logs_path();
            std::fs::create_dir_all(&logs_dir)?;
            let file_name = log_file_name(Utc::now());
            let log_file_path = logs_dir.join(&file_name);

            let appender = tracing_appender::rolling::never(&logs_dir, &file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();

            Ok(LoggingHandle {
                _guard: Some(guard),
                log_file_path: Some(log_file_path),
            })
        }
        LogTarget::Stderr => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .init();

            Ok(LoggingHandle {
                _guard: None,
                log_file_path: None,
            })
        }
    }
}
