use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{self, LoadedConfig};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install the global subscriber; logs go to stderr so stdout stays parseable.
pub fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let level: tracing::Level = level.parse().context("Invalid log level")?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    }
    .context("Failed to install tracing subscriber")?;

    Ok(())
}

pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let loaded = config::load(path).context("Failed to load configuration")?;
    match &loaded.path {
        Some(path) => info!("Loaded configuration from: {}", path.display()),
        None => warn!("No configuration file found, using defaults"),
    }
    Ok(loaded)
}
