// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and merging for the multilang bridge.
//!
//! This crate provides [`BridgeConfig`] together with helpers for loading it
//! from a TOML file, applying `KCL_*` environment overrides, merging overlays,
//! and producing advisory [`ConfigWarning`]s.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file could not be read.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// An environment override held a value of the wrong type.
    #[error("invalid value for {var}: {reason}")]
    InvalidEnv {
        /// Variable name.
        var: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Retries are enabled with no pause between them.
    ZeroRetryDelay {
        /// Configured retry budget.
        retries: u32,
    },
    /// Worst-case time spent retrying one checkpoint is long enough to stall
    /// the shard noticeably.
    LongRetryWindow {
        /// Total seconds across all retries.
        secs: u64,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::ZeroRetryDelay { retries } => {
                write!(f, "{retries} checkpoint retries with no delay between them")
            }
            ConfigWarning::LongRetryWindow { secs } => {
                write!(f, "a failing checkpoint can block processing for {secs}s")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Output format for diagnostic logs on stderr.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Runtime configuration for a record processor bridge.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Log level or `EnvFilter` directive (e.g. `"debug"`, `"kcl=trace"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Log output format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_format: Option<LogFormat>,

    /// How many times a failed checkpoint is retried by the retrying handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_retries: Option<u32>,

    /// Pause before each checkpoint retry, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_retry_delay_ms: Option<u64>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_level: Some("info".into()),
            log_format: None,
            checkpoint_retries: None,
            checkpoint_retry_delay_ms: None,
        }
    }
}

impl BridgeConfig {
    /// Effective log filter directive.
    #[must_use]
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// Effective log format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_default()
    }

    /// Effective checkpoint retry budget.
    #[must_use]
    pub fn checkpoint_retries(&self) -> u32 {
        self.checkpoint_retries.unwrap_or(DEFAULT_CHECKPOINT_RETRIES)
    }

    /// Effective pause between checkpoint retries.
    #[must_use]
    pub fn checkpoint_retry_delay(&self) -> Duration {
        Duration::from_millis(
            self.checkpoint_retry_delay_ms
                .unwrap_or(DEFAULT_CHECKPOINT_RETRY_DELAY_MS),
        )
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Retry budget used when none is configured.
pub const DEFAULT_CHECKPOINT_RETRIES: u32 = 5;

/// Retry delay used when none is configured (5 seconds).
pub const DEFAULT_CHECKPOINT_RETRY_DELAY_MS: u64 = 5_000;

const MAX_CHECKPOINT_RETRIES: u32 = 100;

const MAX_RETRY_DELAY_MS: u64 = 600_000;

/// Total retry time above which a warning is produced.
const LONG_RETRY_WINDOW_SECS: u64 = 300;

/// Recognised bare log levels.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace", "off"];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`BridgeConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`BridgeConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<BridgeConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => BridgeConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Parse a TOML string into a [`BridgeConfig`].
pub fn parse_toml(content: &str) -> Result<BridgeConfig, ConfigError> {
    toml::from_str::<BridgeConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

/// JSON schema describing the TOML file layout.
#[must_use]
pub fn config_schema() -> schemars::Schema {
    schemars::schema_for!(BridgeConfig)
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides from the process environment.
///
/// Recognised variables:
/// - `KCL_LOG_LEVEL`
/// - `KCL_LOG_FORMAT` (`text` or `json`)
/// - `KCL_CHECKPOINT_RETRIES`
/// - `KCL_CHECKPOINT_RETRY_DELAY_MS`
pub fn apply_env_overrides(config: &mut BridgeConfig) -> Result<(), ConfigError> {
    apply_overrides_from(config, |var| std::env::var(var).ok())
}

/// Apply overrides using `lookup` in place of the process environment.
pub fn apply_overrides_from<F>(config: &mut BridgeConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("KCL_LOG_LEVEL") {
        config.log_level = Some(val);
    }
    if let Some(val) = lookup("KCL_LOG_FORMAT") {
        config.log_format = Some(match val.to_ascii_lowercase().as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => {
                return Err(ConfigError::InvalidEnv {
                    var: "KCL_LOG_FORMAT".into(),
                    reason: format!("unknown format '{other}'"),
                });
            }
        });
    }
    if let Some(val) = lookup("KCL_CHECKPOINT_RETRIES") {
        config.checkpoint_retries = Some(parse_env_number("KCL_CHECKPOINT_RETRIES", &val)?);
    }
    if let Some(val) = lookup("KCL_CHECKPOINT_RETRY_DELAY_MS") {
        config.checkpoint_retry_delay_ms =
            Some(parse_env_number("KCL_CHECKPOINT_RETRY_DELAY_MS", &val)?);
    }
    Ok(())
}

fn parse_env_number<T>(var: &str, val: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    val.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
        var: var.into(),
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (unknown log level, out-of-range retry settings) are returned
/// as a [`ConfigError::ValidationError`]; soft issues come back as warnings.
pub fn validate_config(config: &BridgeConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    // Directives such as "kcl=debug" are passed to the filter unchecked.
    if let Some(ref level) = config.log_level
        && !level.contains('=')
        && !VALID_LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str())
    {
        errors.push(format!("invalid log_level '{level}'"));
    }

    let retries = config.checkpoint_retries();
    if retries > MAX_CHECKPOINT_RETRIES {
        errors.push(format!(
            "checkpoint_retries {retries} out of range (0..={MAX_CHECKPOINT_RETRIES})"
        ));
    }

    let delay_ms = config
        .checkpoint_retry_delay_ms
        .unwrap_or(DEFAULT_CHECKPOINT_RETRY_DELAY_MS);
    if delay_ms > MAX_RETRY_DELAY_MS {
        errors.push(format!(
            "checkpoint_retry_delay_ms {delay_ms} out of range (0..={MAX_RETRY_DELAY_MS})"
        ));
    }

    if !errors.is_empty() {
        return Err(ConfigError::ValidationError { reasons: errors });
    }

    if retries > 0 && delay_ms == 0 {
        warnings.push(ConfigWarning::ZeroRetryDelay { retries });
    }
    let window_secs = u64::from(retries).saturating_mul(delay_ms) / 1_000;
    if window_secs > LONG_RETRY_WINDOW_SECS {
        warnings.push(ConfigWarning::LongRetryWindow { secs: window_secs });
    }

    Ok(warnings)
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merge two configurations.  Values in `overlay` take precedence over `base`.
pub fn merge_configs(base: BridgeConfig, overlay: BridgeConfig) -> BridgeConfig {
    BridgeConfig {
        log_level: overlay.log_level.or(base.log_level),
        log_format: overlay.log_format.or(base.log_format),
        checkpoint_retries: overlay.checkpoint_retries.or(base.checkpoint_retries),
        checkpoint_retry_delay_ms: overlay
            .checkpoint_retry_delay_ms
            .or(base.checkpoint_retry_delay_ms),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
