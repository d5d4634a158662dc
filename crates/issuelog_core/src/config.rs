//! Engine configuration.
//!
//! # Responsibility
//! - Describe store location, logging target and history paging knobs.
//! - Normalize caller-provided values into safe runtime settings.
//!
//! # Invariants
//! - Missing fields fall back to [`EngineConfig::default`] values.
//! - `history_page_size` is always within `1..=HISTORY_PAGE_SIZE_MAX` once
//!   read through [`EngineConfig::page_size`].

use serde::Deserialize;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

const HISTORY_PAGE_SIZE_DEFAULT: u32 = 64;
const HISTORY_PAGE_SIZE_MAX: u32 = 1_000;
const BUSY_TIMEOUT_MS_DEFAULT: u64 = 5_000;

/// Runtime settings for the history engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// SQLite file. `None` means callers use an in-memory store.
    pub db_path: Option<PathBuf>,
    /// One of `trace|debug|info|warn|error`; `None` uses the build default.
    pub log_level: Option<String>,
    /// Absolute directory for rolling log files; `None` disables file logging.
    pub log_dir: Option<PathBuf>,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    /// Versions fetched per page by lazy history iteration.
    pub history_page_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            log_level: None,
            log_dir: None,
            busy_timeout_ms: BUSY_TIMEOUT_MS_DEFAULT,
            history_page_size: HISTORY_PAGE_SIZE_DEFAULT,
        }
    }
}

/// Config parse failure.
#[derive(Debug)]
pub struct ConfigError(serde_json::Error);

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid engine config: {}", self.0)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl EngineConfig {
    /// Parses a JSON config document. Absent keys keep their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(ConfigError)
    }

    /// Normalized history page size.
    pub fn page_size(&self) -> u32 {
        normalize_page_size(Some(self.history_page_size))
    }

    /// Busy timeout as a `Duration`.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Effective log level, falling back to the build-mode default.
    pub fn effective_log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(default_log_level())
    }
}

/// `debug` for debug builds, `info` for release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Normalizes a requested page size: `0`/absent -> default, capped at max.
pub fn normalize_page_size(requested: Option<u32>) -> u32 {
    match requested {
        Some(0) | None => HISTORY_PAGE_SIZE_DEFAULT,
        Some(value) if value > HISTORY_PAGE_SIZE_MAX => HISTORY_PAGE_SIZE_MAX,
        Some(value) => value,
    }
}

#[cfg(test)]
mod tests {
    use super::{default_log_level, normalize_page_size, EngineConfig, HISTORY_PAGE_SIZE_MAX};
    use std::path::PathBuf;

    #[test]
    fn empty_document_yields_defaults() {
        let config = EngineConfig::from_json_str("{}").expect("empty object should parse");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.page_size(), 64);
        assert_eq!(config.busy_timeout().as_millis(), 5_000);
    }

    #[test]
    fn partial_document_overrides_selected_fields() {
        let config = EngineConfig::from_json_str(
            r#"{"db_path": "/var/lib/issuelog/history.db", "history_page_size": 5000}"#,
        )
        .expect("partial config should parse");
        assert_eq!(
            config.db_path,
            Some(PathBuf::from("/var/lib/issuelog/history.db"))
        );
        assert_eq!(config.page_size(), HISTORY_PAGE_SIZE_MAX);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = EngineConfig::from_json_str(r#"{"page": 3}"#).expect_err("unknown key");
        assert!(err.to_string().contains("invalid engine config"));
    }

    #[test]
    fn zero_page_size_falls_back_to_default() {
        assert_eq!(normalize_page_size(Some(0)), 64);
        assert_eq!(normalize_page_size(Some(7)), 7);
    }

    #[test]
    fn log_level_falls_back_to_build_default() {
        let config = EngineConfig::default();
        assert_eq!(config.effective_log_level(), default_log_level());

        let config = EngineConfig::from_json_str(r#"{"log_level": "warn"}"#).unwrap();
        assert_eq!(config.effective_log_level(), "warn");
    }
}
