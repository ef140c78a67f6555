//! Configuration management for scamcrawl
//!
//! Configuration is loaded from `./config/scamcrawl.toml`.
//! The embedded template is the only place defaults live; when no file exists it is used as-is.

use serde::Deserialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/scamcrawl.toml";

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = include_str!("../config/scamcrawl.toml");

/// Upper bound on the per-page browser timeout
pub const MAX_PAGE_LOAD_TIMEOUT_SECS: u64 = 30;

const MAX_WORKERS: usize = 64;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Configuration field '{field}' out of range: {value} (allowed {min}..={max})")]
    OutOfRange {
        field: String,
        value: u64,
        min: u64,
        max: u64,
    },
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub crawl: CrawlConfig,
    pub browser: BrowserConfig,
    pub whois: WhoisConfig,
    pub gate: GateConfig,
    pub assets: AssetsConfig,
}

/// Work distribution and output locations
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    pub workers: usize,
    pub cache_dir: PathBuf,
    pub output: PathBuf,
}

/// Chrome sandbox handling
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SandboxMode {
    /// Disable the sandbox only when running inside a container
    Auto,
    On,
    Off,
}

/// Headless browser session settings
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    pub page_load_timeout_secs: u64,
    pub settle_delay_ms: u64,
    /// DevTools websocket URL of a remote Chrome used when the local session fails
    #[serde(default)]
    pub remote_debugging_url: Option<String>,
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,
    pub sandbox: SandboxMode,
}

/// WHOIS lookup settings
#[derive(Debug, Clone, Deserialize)]
pub struct WhoisConfig {
    pub servers_file: PathBuf,
    pub system_whois_fallback: bool,
    /// Reject domains whose WHOIS lookup yields no record
    #[serde(default)]
    pub require_record: bool,
}

/// Content gate thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    pub min_content_length: usize,
    pub language_filter: bool,
    pub languages: Vec<String>,
}

/// Locations of the lookup tables loaded at worker start
#[derive(Debug, Clone, Deserialize)]
pub struct AssetsConfig {
    pub country_table: PathBuf,
    pub ip_country_db: PathBuf,
}

impl AppConfig {
    /// Load configuration from the default path, falling back to the embedded template
    pub fn load() -> Result<Self, ConfigError> {
        match Self::load_from_path(Path::new(CONFIG_PATH)) {
            Err(ConfigError::FileNotFound(_)) => Self::from_toml(DEFAULT_CONFIG),
            other => other,
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crawl.workers == 0 || self.crawl.workers > MAX_WORKERS {
            return Err(ConfigError::OutOfRange {
                field: "crawl.workers".to_string(),
                value: self.crawl.workers as u64,
                min: 1,
                max: MAX_WORKERS as u64,
            });
        }

        if self.crawl.cache_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "crawl.cache_dir".to_string(),
            });
        }

        if self.crawl.output.as_os_str().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "crawl.output".to_string(),
            });
        }

        if self.browser.page_load_timeout_secs == 0
            || self.browser.page_load_timeout_secs > MAX_PAGE_LOAD_TIMEOUT_SECS
        {
            return Err(ConfigError::OutOfRange {
                field: "browser.page_load_timeout_secs".to_string(),
                value: self.browser.page_load_timeout_secs,
                min: 1,
                max: MAX_PAGE_LOAD_TIMEOUT_SECS,
            });
        }

        if self.gate.language_filter && self.gate.languages.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "gate.languages (required when gate.language_filter = true)".to_string(),
            });
        }

        Ok(())
    }

    /// Create default configuration file at the standard location
    pub fn create_default_config() -> Result<PathBuf, ConfigError> {
        let path = Path::new(CONFIG_PATH);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }
}

/// Split a comma-separated language list, dropping blanks
pub fn parse_language_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|lang| lang.trim().to_lowercase())
        .filter(|lang| !lang.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config: Result<AppConfig, _> = toml::from_str(DEFAULT_CONFIG);
        assert!(config.is_ok(), "Default config should parse: {:?}", config.err());
    }

    #[test]
    fn test_default_config_validates() {
        let config = AppConfig::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.crawl.workers, 5);
        assert_eq!(config.browser.page_load_timeout_secs, 30);
        assert_eq!(config.browser.sandbox, SandboxMode::Auto);
        assert_eq!(config.gate.min_content_length, 3000);
        assert!(!config.gate.language_filter);
        assert!(!config.whois.require_record);
    }

    #[test]
    fn test_rejects_zero_workers() {
        let mut config = AppConfig::from_toml(DEFAULT_CONFIG).unwrap();
        config.crawl.workers = 0;
        assert!(matches!(config.validate(), Err(ConfigError::OutOfRange { .. })));
    }

    #[test]
    fn test_rejects_long_page_timeout() {
        let mut config = AppConfig::from_toml(DEFAULT_CONFIG).unwrap();
        config.browser.page_load_timeout_secs = 31;
        assert!(matches!(config.validate(), Err(ConfigError::OutOfRange { .. })));
    }

    #[test]
    fn test_language_filter_needs_languages() {
        let mut config = AppConfig::from_toml(DEFAULT_CONFIG).unwrap();
        config.gate.language_filter = true;
        config.gate.languages.clear();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyRequired { .. })));
    }

    #[test]
    fn test_optional_browser_fields() {
        let config = AppConfig::from_toml(DEFAULT_CONFIG).unwrap();
        assert!(config.browser.remote_debugging_url.is_none());

        let custom = DEFAULT_CONFIG.replace(
            "sandbox = \"auto\"",
            "sandbox = \"off\"\nremote_debugging_url = \"ws://127.0.0.1:9222/devtools/browser/abc\"",
        );
        let config = AppConfig::from_toml(&custom).unwrap();
        assert_eq!(config.browser.sandbox, SandboxMode::Off);
        assert_eq!(
            config.browser.remote_debugging_url.as_deref(),
            Some("ws://127.0.0.1:9222/devtools/browser/abc")
        );
    }

    #[test]
    fn test_missing_file_is_reported() {
        let result = AppConfig::load_from_path(Path::new("/nonexistent/scamcrawl.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_parse_language_list() {
        assert_eq!(parse_language_list("en, DE,,fr "), vec!["en", "de", "fr"]);
        assert!(parse_language_list(" , ").is_empty());
    }
}
