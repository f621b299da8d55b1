//! Configuration file parser for ~/.config/reelsync/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as warnings since they are
//! usually typos.
use crate::feed::{DEFAULT_RESUME_ITEMS, MAX_PAGE_SIZE};
use crate::navigation::{DEFAULT_TRANSITION_TIMEOUT, DEFAULT_WHEEL_THRESHOLD};
use crate::util::{validate_url, UrlValidationError};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Environment variable that overrides `api_token`.
pub const API_TOKEN_ENV: &str = "REELSYNC_API_TOKEN";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// `source_url` is missing, malformed, or points somewhere not allowed.
    #[error("Invalid source URL: {0}")]
    InvalidUrl(String),
}

impl From<UrlValidationError> for ConfigError {
    fn from(e: UrlValidationError) -> Self {
        ConfigError::InvalidUrl(e.to_string())
    }
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
///
/// Custom Debug impl masks `api_token` so it never reaches the log file.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the feed service. Required from the file or `--source`.
    pub source_url: Option<String>,

    /// Permit loopback and private-network hosts (local development).
    pub allow_local_source: bool,

    /// Bearer token for the feed service. `REELSYNC_API_TOKEN` takes precedence.
    pub api_token: Option<String>,

    /// Seconds between polls of the feed window.
    pub poll_interval_secs: u64,

    /// Window size requested from the source (clamped to 1..=50).
    pub page_size: usize,

    /// Items kept in the resume snapshot.
    pub resume_items: usize,

    /// Concurrent author lookups per batch.
    pub lookup_concurrency: usize,

    /// Minimum wheel delta (pixels) that counts as an intent.
    pub wheel_threshold: f64,

    /// Pixel delta reported per terminal wheel notch.
    pub wheel_step: f64,

    /// Fallback release of the transition lock.
    pub transition_timeout_ms: u64,

    /// Duration of the slide animation before a settle is reported.
    pub animation_ms: u64,

    /// Idle delay before a resume snapshot is written.
    pub save_idle_ms: u64,

    /// SQLite file for resume snapshots. `None` keeps them in memory.
    pub session_db: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_url: None,
            allow_local_source: false,
            api_token: None,
            poll_interval_secs: 5,
            page_size: MAX_PAGE_SIZE,
            resume_items: DEFAULT_RESUME_ITEMS,
            lookup_concurrency: 8,
            wheel_threshold: DEFAULT_WHEEL_THRESHOLD,
            wheel_step: 100.0,
            transition_timeout_ms: DEFAULT_TRANSITION_TIMEOUT.as_millis() as u64,
            animation_ms: 180,
            save_idle_ms: 250,
            session_db: None,
        }
    }
}

/// Mask api_token in Debug output.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("source_url", &self.source_url)
            .field("allow_local_source", &self.allow_local_source)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("page_size", &self.page_size)
            .field("resume_items", &self.resume_items)
            .field("lookup_concurrency", &self.lookup_concurrency)
            .field("wheel_threshold", &self.wheel_threshold)
            .field("wheel_step", &self.wheel_step)
            .field("transition_timeout_ms", &self.transition_timeout_ms)
            .field("animation_ms", &self.animation_ms)
            .field("save_idle_ms", &self.save_idle_ms)
            .field("session_db", &self.session_db)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 13] = [
        "source_url",
        "allow_local_source",
        "api_token",
        "poll_interval_secs",
        "page_size",
        "resume_items",
        "lookup_concurrency",
        "wheel_threshold",
        "wheel_step",
        "transition_timeout_ms",
        "animation_ms",
        "save_idle_ms",
        "session_db",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check the size before reading so a corrupted file can't exhaust memory
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            source = config.source_url.as_deref().unwrap_or("<unset>"),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Default location: `$XDG_CONFIG_HOME/reelsync` or `~/.config/reelsync`.
    pub fn dir() -> PathBuf {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("reelsync")
    }

    /// Parse and vet `source_url`.
    ///
    /// Loopback and private hosts are refused unless `allow_local_source` is set.
    pub fn source(&self) -> Result<Url, ConfigError> {
        let raw = self
            .source_url
            .as_deref()
            .ok_or_else(|| ConfigError::InvalidUrl("no source_url configured".to_string()))?;
        Ok(validate_url(raw, self.allow_local_source)?)
    }

    /// The bearer token, preferring the environment over the file.
    pub fn api_token(&self) -> Option<SecretString> {
        std::env::var(API_TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.api_token.clone())
            .map(SecretString::from)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, content: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("reelsync_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.source_url.is_none());
        assert!(!config.allow_local_source);
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.page_size, 50);
        assert_eq!(config.resume_items, 30);
        assert_eq!(config.wheel_threshold, 30.0);
        assert_eq!(config.transition_timeout_ms, 800);
        assert_eq!(config.save_idle_ms, 250);
        assert!(config.session_db.is_none());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/reelsync_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.page_size, 50);
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let (dir, path) = write_config("whitespace", "   \n  \n  ");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.poll_interval_secs, 5);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (dir, path) = write_config("partial", "source_url = \"https://feed.example.com\"\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.source_url.as_deref(), Some("https://feed.example.com"));
        assert_eq!(config.animation_ms, 180);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let content = r#"
source_url = "http://127.0.0.1:8080/api"
allow_local_source = true
api_token = "tok-123"
poll_interval_secs = 2
page_size = 20
resume_items = 10
lookup_concurrency = 4
wheel_threshold = 40.0
wheel_step = 120.0
transition_timeout_ms = 500
animation_ms = 100
save_idle_ms = 50
session_db = "/tmp/reelsync.db"
"#;
        let (dir, path) = write_config("full", content);
        let config = Config::load(&path).unwrap();
        assert!(config.allow_local_source);
        assert_eq!(config.page_size, 20);
        assert_eq!(config.wheel_step, 120.0);
        assert_eq!(config.session_db, Some(PathBuf::from("/tmp/reelsync.db")));
        assert_eq!(config.source().unwrap().port(), Some(8080));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (dir, path) = write_config("invalid", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let (dir, path) = write_config("unknown", "page_size = 10\ntheme = \"dark\"\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.page_size, 10);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let (dir, path) = write_config("wrongtype", "page_size = \"many\"\n");
        assert!(Config::load(&path).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_source_requires_url() {
        let err = Config::default().source().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl(_)));
    }

    #[test]
    fn test_source_rejects_local_unless_allowed() {
        let mut config = Config {
            source_url: Some("http://localhost:3000".to_string()),
            ..Config::default()
        };
        assert!(config.source().is_err());

        config.allow_local_source = true;
        assert_eq!(config.source().unwrap().host_str(), Some("localhost"));
    }

    #[test]
    fn test_debug_masks_api_token() {
        let config = Config {
            api_token: Some("super-secret-token-12345".to_string()),
            ..Config::default()
        };
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("super-secret-token-12345"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_debug_shows_none_when_no_token() {
        let debug_output = format!("{:?}", Config::default());
        assert!(!debug_output.contains("[REDACTED]"));
    }
}
