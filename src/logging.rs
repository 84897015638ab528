//! Subscriber setup for the agent binary
//!
//! Console output goes to stderr (colored unless disabled), an optional log file
//! receives the same events without ANSI escapes. Dependencies are capped at WARN.

use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::Context;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

pub fn targets(config: &LoggingConfig, verbose: bool) -> anyhow::Result<filter::Targets> {
    let level = if verbose {
        LevelFilter::DEBUG.max(config.level_filter()?)
    } else {
        config.level_filter()?
    };

    Ok(filter::Targets::new()
        .with_default(LevelFilter::WARN)
        .with_targets(vec![("metrics_courier", level), ("courier_agent", level)]))
}

pub fn init(config: &LoggingConfig, verbose: bool) -> anyhow::Result<()> {
    let filter = targets(config, verbose)?;

    let file_layer = match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create log directory for {}", path.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;

            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(config.ansi),
        )
        .with(file_layer)
        .with(filter)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(())
}
