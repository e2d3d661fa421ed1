//! Configuration file parser for ~/.config/feedpipe/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`,
//! which has no sources. Unknown keys are accepted but logged as warnings.
use crate::types::Source;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Provider Seam
// ============================================================================

/// Extraction envelope as seen by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionConfig {
    pub enabled: bool,
    pub max_concurrent: usize,
    /// Minimum spacing between successive extraction calls, all sources combined
    pub rate_limit: Duration,
}

/// Where the aggregator reads its sources and limits from.
///
/// Read once at the start of every run, so an implementation may hand out a
/// different list on each call.
pub trait ConfigProvider: Send + Sync {
    fn sources(&self) -> Vec<Source>;

    fn extraction(&self) -> ExtractionConfig;

    /// Maximum fetches in flight. `0` means one per source.
    fn fetch_concurrency(&self) -> usize {
        0
    }
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-source timeout covering request, body and parse.
    pub fetch_timeout_secs: u64,

    /// Maximum concurrent source fetches. 0 = one per source.
    pub max_concurrent_fetches: usize,

    /// Refresh interval in minutes for the binary's loop. 0 = run once.
    pub refresh_interval_minutes: u64,

    pub sources: Vec<Source>,

    pub extraction: ExtractionSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 30,
            max_concurrent_fetches: 0,
            refresh_interval_minutes: 0,
            sources: Vec::new(),
            extraction: ExtractionSettings::default(),
        }
    }
}

/// The `[extraction]` table.
///
/// Custom Debug masks `jina_api_key`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    pub enabled: bool,
    pub max_concurrent: usize,
    pub rate_limit_ms: u64,
    /// Reader endpoint override (HTTPS, or http://localhost for testing).
    pub jina_base_url: Option<String>,
    /// Jina.ai API key (alternative to JINA_API_KEY env var).
    /// Env var takes precedence over config file.
    pub jina_api_key: Option<String>,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_concurrent: 4,
            rate_limit_ms: 500,
            jina_base_url: None,
            jina_api_key: None,
        }
    }
}

impl std::fmt::Debug for ExtractionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionSettings")
            .field("enabled", &self.enabled)
            .field("max_concurrent", &self.max_concurrent)
            .field("rate_limit_ms", &self.rate_limit_ms)
            .field("jina_base_url", &self.jina_base_url)
            .field(
                "jina_api_key",
                &self.jina_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 5] = [
        "fetch_timeout_secs",
        "max_concurrent_fetches",
        "refresh_interval_minutes",
        "sources",
        "extraction",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing or empty file → `Ok(Config::default())`
    /// - Larger than 1 MB → `Err(ConfigError::TooLarge)`
    /// - Invalid TOML → `Err(ConfigError::Parse)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
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

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            sources = config.sources.len(),
            extraction = config.extraction.enabled,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        Ok(toml::from_str(content)?)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl ConfigProvider for Config {
    fn sources(&self) -> Vec<Source> {
        self.sources.clone()
    }

    fn extraction(&self) -> ExtractionConfig {
        ExtractionConfig {
            enabled: self.extraction.enabled,
            max_concurrent: self.extraction.max_concurrent,
            rate_limit: Duration::from_millis(self.extraction.rate_limit_ms),
        }
    }

    fn fetch_concurrency(&self) -> usize {
        self.max_concurrent_fetches
    }
}

// ============================================================================
// Tests
// ============================================================================
