//! Logger setup.
//!
//! `RUST_LOG` wins when set; otherwise the configured filter applies. Output
//! goes to the configured log file, or stderr.

use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};

use crate::config::Config;

/// Logger builder for `config`. Creates (truncates) the log file if one is set.
pub fn builder(config: &Config) -> Result<Builder> {
    let mut builder = Builder::from_env(Env::default().default_filter_or(config.log_filter.as_str()));
    match &config.log_file {
        Some(path) => {
            let log_file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create log file at {}", path.display()))?;
            builder.target(Target::Pipe(Box::new(log_file)));
        }
        None => {
            builder.target(Target::Stderr);
        }
    }
    builder.format_timestamp_secs();
    Ok(builder)
}

/// Install the global logger.
pub fn init(config: &Config) -> Result<()> {
    builder(config)?
        .try_init()
        .context("Logger already initialized")
}
