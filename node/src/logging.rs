//! Structured logging setup.
//!
//! Format and level come from the node configuration, with RUST_LOG
//! taking precedence over the configured level so operators can raise
//! verbosity per module without touching the config file.

use crate::config::LogSettings;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub fn init_logging(settings: &LogSettings) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.clone()));

    match &settings.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            init_with_writer(settings, filter, Arc::new(file))?;
        }
        None => init_stdout(settings, filter)?,
    }
    Ok(())
}

fn init_stdout(settings: &LogSettings, filter: EnvFilter) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match settings.format.as_str() {
        "json" => builder.json().try_init(),
        "compact" => builder.compact().try_init(),
        _ => builder.try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to init logging: {e}"))
}

fn init_with_writer(
    settings: &LogSettings,
    filter: EnvFilter,
    writer: Arc<std::fs::File>,
) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false);
    match settings.format.as_str() {
        "json" => builder.json().try_init(),
        "compact" => builder.compact().try_init(),
        _ => builder.try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to init logging: {e}"))
}
