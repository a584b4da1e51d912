// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and merging for the test-case
//! management service.
//!
//! This crate provides [`ServerConfig`] — the top-level runtime settings —
//! together with helpers for loading from TOML files, merging overlays, and
//! producing advisory [`ConfigWarning`]s.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
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
    /// A recommended optional field is missing.
    MissingOptionalField {
        /// Name of the missing field.
        field: String,
        /// Why it matters.
        hint: String,
    },
    /// The session TTL is unusually long.
    LongSessionTtl {
        /// TTL value in seconds.
        secs: u64,
    },
    /// The login rate limit is unusually permissive.
    PermissiveLoginLimit {
        /// Allowed attempts per window.
        attempts: u32,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
            ConfigWarning::LongSessionTtl { secs } => {
                write!(f, "session TTL is very long ({secs}s)")
            }
            ConfigWarning::PermissiveLoginLimit { attempts } => {
                write!(f, "login rate limit allows {attempts} attempts per window")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level runtime configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Directory for the JSON data snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Log level override (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Login rate limiting knobs.
    #[serde(default)]
    pub login_limit: LoginLimit,

    /// Session lifetime in seconds.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8080".into()
}

fn default_session_ttl() -> u64 {
    // Two weeks, matching the usual web-framework default.
    1_209_600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            data_dir: None,
            log_level: Some("info".into()),
            login_limit: LoginLimit::default(),
            session_ttl_secs: default_session_ttl(),
        }
    }
}

/// Per-username login throttling: `max_attempts` POSTs per `window_secs`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct LoginLimit {
    /// Attempts allowed inside one window.
    #[serde(default = "default_login_attempts")]
    pub max_attempts: u32,
    /// Window length in seconds.
    #[serde(default = "default_login_window")]
    pub window_secs: u64,
}

fn default_login_attempts() -> u32 {
    5
}

fn default_login_window() -> u64 {
    60
}

impl Default for LoginLimit {
    fn default() -> Self {
        Self {
            max_attempts: default_login_attempts(),
            window_secs: default_login_window(),
        }
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Session TTLs above this threshold generate a warning (30 days).
const LONG_SESSION_TTL_SECS: u64 = 2_592_000;

/// Login limits above this threshold generate a warning.
const PERMISSIVE_LOGIN_ATTEMPTS: u32 = 20;

/// Recognised log levels.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`ServerConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`ServerConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => ServerConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a TOML string into a [`ServerConfig`].
pub fn parse_toml(content: &str) -> Result<ServerConfig, ConfigError> {
    toml::from_str::<ServerConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides.
///
/// Recognised variables:
/// - `MT_BIND`
/// - `MT_LOG_LEVEL`
/// - `MT_DATA_DIR`
pub fn apply_env_overrides(config: &mut ServerConfig) {
    if let Ok(val) = std::env::var("MT_BIND") {
        config.bind = val;
    }
    if let Ok(val) = std::env::var("MT_LOG_LEVEL") {
        config.log_level = Some(val);
    }
    if let Ok(val) = std::env::var("MT_DATA_DIR") {
        config.data_dir = Some(val);
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (empty bind address, zero-width rate-limit windows) are
/// returned as a [`ConfigError::ValidationError`]; soft issues come back as
/// warnings.
pub fn validate_config(config: &ServerConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if config.bind.trim().is_empty() {
        errors.push("bind address must not be empty".into());
    }

    if let Some(ref level) = config.log_level
        && !VALID_LOG_LEVELS.contains(&level.as_str())
    {
        errors.push(format!("invalid log_level '{level}'"));
    }

    if config.login_limit.max_attempts == 0 {
        errors.push("login_limit.max_attempts must be at least 1".into());
    } else if config.login_limit.max_attempts > PERMISSIVE_LOGIN_ATTEMPTS {
        warnings.push(ConfigWarning::PermissiveLoginLimit {
            attempts: config.login_limit.max_attempts,
        });
    }

    if config.login_limit.window_secs == 0 {
        errors.push("login_limit.window_secs must be at least 1".into());
    }

    if config.session_ttl_secs == 0 {
        errors.push("session_ttl_secs must be at least 1".into());
    } else if config.session_ttl_secs > LONG_SESSION_TTL_SECS {
        warnings.push(ConfigWarning::LongSessionTtl {
            secs: config.session_ttl_secs,
        });
    }

    // Advisory: missing optional fields.
    if config.data_dir.is_none() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "data_dir".into(),
            hint: "entities will not be persisted across restarts".into(),
        });
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merge two configurations.  Values in `overlay` take precedence over `base`
/// wherever the overlay strays from the defaults.
pub fn merge_configs(base: ServerConfig, overlay: ServerConfig) -> ServerConfig {
    let defaults = ServerConfig::default();
    ServerConfig {
        bind: if overlay.bind == defaults.bind {
            base.bind
        } else {
            overlay.bind
        },
        data_dir: overlay.data_dir.or(base.data_dir),
        log_level: overlay.log_level.or(base.log_level),
        login_limit: if overlay.login_limit == defaults.login_limit {
            base.login_limit
        } else {
            overlay.login_limit
        },
        session_ttl_secs: if overlay.session_ttl_secs == defaults.session_ttl_secs {
            base.session_ttl_secs
        } else {
            overlay.session_ttl_secs
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
