// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tracing setup for processor binaries.
//!
//! Stdout carries the protocol, so every subscriber installed here writes to
//! stderr.

use kcl_config::{BridgeConfig, LogFormat};
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;

/// Failure to install the global subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The log level or `RUST_LOG` is not a valid filter.
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),
    /// A global subscriber is already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Install(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Install a global `tracing` subscriber configured from `config`.
///
/// `RUST_LOG`, when set, takes precedence over `config.log_level`.
pub fn init_tracing(config: &BridgeConfig) -> Result<(), TelemetryError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(config, rust_log.as_deref())?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    match config.log_format() {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(TelemetryError::Install)
}

fn build_filter(config: &BridgeConfig, rust_log: Option<&str>) -> Result<EnvFilter, ParseError> {
    match rust_log.filter(|directives| !directives.trim().is_empty()) {
        Some(directives) => EnvFilter::try_new(directives),
        None => EnvFilter::try_new(config.log_level()),
    }
}
