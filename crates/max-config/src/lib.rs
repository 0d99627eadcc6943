// SPDX-License-Identifier: MIT OR Apache-2.0
//! Project configuration loading, validation, and merging for Max.
//!
//! This crate provides [`MaxConfig`] — the `max.json` project-root
//! settings — together with helpers for loading from a JSON file,
//! merging overlays, and producing advisory [`ConfigWarning`]s. An
//! absent or empty `max.json` is valid: every field defaults.
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

    /// The file could not be parsed as valid JSON.
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
    /// A daemon idle timeout is unusually large.
    LargeIdleTimeout {
        /// Timeout value in seconds.
        secs: u64,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
            ConfigWarning::LargeIdleTimeout { secs } => {
                write!(f, "daemon idle timeout is unusually large ({secs}s)")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level project configuration, loaded from `max.json` at the
/// project root.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MaxConfig {
    /// Workspace used when a command does not specify one explicitly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_workspace: Option<String>,

    /// Directory holding `.max/` state, relative to the project root.
    /// Defaults to `.max` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Log level override (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Daemon-specific settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daemon: Option<DaemonConfig>,
}

impl Default for MaxConfig {
    fn default() -> Self {
        Self {
            default_workspace: None,
            data_dir: None,
            log_level: Some("info".into()),
            daemon: None,
        }
    }
}

/// Settings for the background daemon that hosts subprocess and remote
/// installations.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DaemonConfig {
    /// Seconds of inactivity before the daemon may shut itself down.
    /// `0` disables the idle shutdown entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Threshold above which an idle timeout generates a warning.
const LARGE_IDLE_TIMEOUT_THRESHOLD: u64 = 86_400;

/// Recognised log levels.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`MaxConfig`] from an optional `max.json` path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`MaxConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<MaxConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_json(&content)?
        }
        None => MaxConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a JSON string into a [`MaxConfig`]. An empty string is treated
/// as `{}`, matching the project-root contract's "empty JSON allowed".
pub fn parse_json(content: &str) -> Result<MaxConfig, ConfigError> {
    let content = if content.trim().is_empty() { "{}" } else { content };
    serde_json::from_str::<MaxConfig>(content).map_err(|e| ConfigError::ParseError { reason: e.to_string() })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides.
///
/// Recognised variables:
/// - `MAX_DEFAULT_WORKSPACE`
/// - `MAX_LOG_LEVEL`
/// - `MAX_DATA_DIR`
pub fn apply_env_overrides(config: &mut MaxConfig) {
    if let Ok(val) = std::env::var("MAX_DEFAULT_WORKSPACE") {
        config.default_workspace = Some(val);
    }
    if let Ok(val) = std::env::var("MAX_LOG_LEVEL") {
        config.log_level = Some(val);
    }
    if let Ok(val) = std::env::var("MAX_DATA_DIR") {
        config.data_dir = Some(val);
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (unrecognised log levels) are returned as a
/// [`ConfigError::ValidationError`]; soft issues come back as warnings.
pub fn validate_config(config: &MaxConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if let Some(ref level) = config.log_level
        && !VALID_LOG_LEVELS.contains(&level.as_str())
    {
        errors.push(format!("invalid log_level '{level}'"));
    }

    if let Some(ref daemon) = config.daemon
        && let Some(secs) = daemon.idle_timeout_secs
        && secs > LARGE_IDLE_TIMEOUT_THRESHOLD
    {
        warnings.push(ConfigWarning::LargeIdleTimeout { secs });
    }

    if config.default_workspace.is_none() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "default_workspace".into(),
            hint: "callers must always specify a workspace explicitly".into(),
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

/// Merge two configurations. Values in `overlay` take precedence over
/// `base`.
pub fn merge_configs(base: MaxConfig, overlay: MaxConfig) -> MaxConfig {
    MaxConfig {
        default_workspace: overlay.default_workspace.or(base.default_workspace),
        data_dir: overlay.data_dir.or(base.data_dir),
        log_level: overlay.log_level.or(base.log_level),
        daemon: overlay.daemon.or(base.daemon),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::field_reassign_with_default)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let cfg = MaxConfig::default();
        let warnings = validate_config(&cfg).expect("default config should be valid");
        assert!(!warnings.is_empty(), "should have advisory warnings");
    }

    #[test]
    fn default_config_has_sensible_defaults() {
        let cfg = MaxConfig::default();
        assert_eq!(cfg.log_level.as_deref(), Some("info"));
        assert!(cfg.default_workspace.is_none());
    }

    #[test]
    fn parse_valid_json_string() {
        let json = r#"{"defaultWorkspace": "acme", "logLevel": "debug", "dataDir": "/tmp/max"}"#;
        let cfg = parse_json(json).unwrap();
        assert_eq!(cfg.default_workspace.as_deref(), Some("acme"));
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn parse_invalid_json_gives_parse_error() {
        let bad = "{not valid json";
        let err = parse_json(bad).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn empty_string_parses_to_defaults() {
        let cfg = parse_json("").unwrap();
        assert_eq!(cfg.default_workspace, None);
        assert_eq!(cfg.log_level.as_deref(), Some("info"));
    }

    #[test]
    fn validation_catches_invalid_log_level() {
        let cfg = MaxConfig {
            log_level: Some("verbose".into()),
            ..Default::default()
        };
        let err = validate_config(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn large_idle_timeout_produces_warning() {
        let mut cfg = MaxConfig::default();
        cfg.default_workspace = Some("acme".into());
        cfg.daemon = Some(DaemonConfig { idle_timeout_secs: Some(200_000) });
        let warnings = validate_config(&cfg).unwrap();
        assert!(warnings.iter().any(|w| matches!(w, ConfigWarning::LargeIdleTimeout { .. })));
    }

    #[test]
    fn merge_overlay_overrides_base() {
        let base = MaxConfig {
            default_workspace: Some("mock".into()),
            log_level: Some("info".into()),
            ..Default::default()
        };
        let overlay = MaxConfig {
            default_workspace: Some("prod".into()),
            log_level: None,
            ..Default::default()
        };
        let merged = merge_configs(base, overlay);
        assert_eq!(merged.default_workspace.as_deref(), Some("prod"));
        assert_eq!(merged.log_level.as_deref(), Some("info"));
    }

    #[test]
    fn merge_preserves_base_when_overlay_is_default() {
        let base = MaxConfig {
            default_workspace: Some("mock".into()),
            data_dir: Some("/work/.max".into()),
            log_level: Some("debug".into()),
            daemon: Some(DaemonConfig { idle_timeout_secs: Some(60) }),
        };
        let merged = merge_configs(base.clone(), MaxConfig::default());
        assert_eq!(merged.default_workspace.as_deref(), Some("mock"));
        assert_eq!(merged.data_dir.as_deref(), Some("/work/.max"));
        assert_eq!(merged.log_level.as_deref(), Some("info"));
        assert_eq!(merged.daemon, base.daemon);
    }

    #[test]
    fn json_roundtrip() {
        let cfg = MaxConfig {
            default_workspace: Some("mock".into()),
            data_dir: Some("/ws/.max".into()),
            log_level: Some("debug".into()),
            daemon: Some(DaemonConfig { idle_timeout_secs: Some(300) }),
        };
        let serialized = serde_json::to_string(&cfg).unwrap();
        let deserialized: MaxConfig = serde_json::from_str(&serialized).unwrap();
        assert_eq!(cfg, deserialized);
    }

    #[test]
    fn load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("max.json");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, r#"{{"defaultWorkspace": "mock", "logLevel": "warn"}}"#).unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.default_workspace.as_deref(), Some("mock"));
        assert_eq!(cfg.log_level.as_deref(), Some("warn"));
    }

    #[test]
    fn load_missing_file_gives_file_not_found() {
        let err = load_config(Some(Path::new("/nonexistent/max.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn load_none_returns_default() {
        let cfg = load_config(None).unwrap();
        assert_eq!(cfg.log_level.as_deref(), Some("info"));
    }

    #[test]
    fn config_error_display() {
        let e = ConfigError::FileNotFound { path: "/foo".into() };
        assert!(e.to_string().contains("/foo"));

        let e = ConfigError::ParseError { reason: "bad json".into() };
        assert!(e.to_string().contains("bad json"));
    }

    #[test]
    fn config_warning_display() {
        let w = ConfigWarning::MissingOptionalField { field: "f".into(), hint: "h".into() };
        assert!(w.to_string().contains('f'));

        let w = ConfigWarning::LargeIdleTimeout { secs: 999_999 };
        assert!(w.to_string().contains("999999"));
    }
}
