//! Configuration management for Lector.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories.

use crate::error::{BridgeError, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Application name used for config directory.
const APP_NAME: &str = "Lector";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Kindle Cloud Reader does not advertise support for headless engines, so a
/// desktop Chrome user agent is presented instead.
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote application endpoints.
    pub reader: ReaderConfig,

    /// Browser and WebDriver settings.
    pub browser: BrowserConfig,

    /// Deadlines for navigation and page scripts.
    pub timeouts: TimeoutsConfig,
}

/// Endpoints of the Kindle Cloud Reader application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Reader home; redirects to sign-in when there is no session.
    pub cloud_reader_url: String,

    /// Sign-in endpoint the home redirects to.
    pub signin_url: String,

    /// User agent presented by the browser.
    pub user_agent: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            cloud_reader_url: "https://read.amazon.com".to_string(),
            signin_url: "https://www.amazon.com/ap/signin".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ReaderConfig {
    /// Parsed reader home URL.
    pub fn home_url(&self) -> Result<Url, BridgeError> {
        parse_url(&self.cloud_reader_url)
    }

    /// Reader view for a single book.
    pub fn book_url(&self, asin: &str) -> Result<Url, BridgeError> {
        let mut url = self.home_url()?;
        url.query_pairs_mut().append_pair("asin", asin);
        Ok(url)
    }
}

fn parse_url(raw: &str) -> Result<Url, BridgeError> {
    Url::parse(raw).map_err(|e| BridgeError::Navigation {
        url: raw.to_string(),
        message: e.to_string(),
    })
}

/// Supported WebDriver engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    Chrome,
    Firefox,
}

/// Browser and WebDriver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Engine the WebDriver endpoint drives.
    pub kind: BrowserKind,

    /// WebDriver endpoint used when no driver is spawned.
    pub webdriver_url: String,

    /// Run without a visible window.
    pub headless: bool,

    /// Window width in pixels.
    pub window_width: u32,

    /// Window height in pixels.
    pub window_height: u32,

    /// Driver executable to spawn (e.g. "chromedriver").
    /// If not set, an already running endpoint at `webdriver_url` is used.
    pub driver_command: Option<String>,

    /// Port for a spawned driver.
    pub driver_port: u16,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            kind: BrowserKind::Chrome,
            webdriver_url: "http://localhost:4444".to_string(),
            headless: true,
            window_width: 1920,
            window_height: 1080,
            driver_command: None,
            driver_port: 9515,
        }
    }
}

/// Deadlines, in seconds unless noted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Navigation plus the first page probe.
    pub page_load_sec: f64,

    /// Scripts that read already-computed state.
    pub script_sec: f64,

    /// Waiting for the page that follows a sign-in submit.
    pub sign_in_sec: f64,

    /// Opening a book and computing its pagination.
    pub pagination_sec: f64,

    /// Waiting for a WebDriver endpoint to report ready.
    pub driver_start_sec: f64,

    /// Pause between page probes, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            page_load_sec: 30.0,
            script_sec: 10.0,
            sign_in_sec: 15.0,
            pagination_sec: 30.0,
            driver_start_sec: 10.0,
            poll_interval_ms: 250,
        }
    }
}

/// Upper bound for any single deadline.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Converts a seconds value into a deadline within `0..=MAX_TIMEOUT`.
///
/// Values that `validate` rejects still map to a deadline here: huge ones
/// saturate, and negative or NaN ones become zero.
fn seconds(value: f64) -> Duration {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) => duration.min(MAX_TIMEOUT),
        Err(_) if value > 0.0 => MAX_TIMEOUT,
        Err(_) => Duration::ZERO,
    }
}

impl TimeoutsConfig {
    pub fn page_load(&self) -> Duration {
        seconds(self.page_load_sec)
    }

    pub fn script(&self) -> Duration {
        seconds(self.script_sec)
    }

    pub fn sign_in(&self) -> Duration {
        seconds(self.sign_in_sec)
    }

    pub fn pagination(&self) -> Duration {
        seconds(self.pagination_sec)
    }

    pub fn driver_start(&self) -> Duration {
        seconds(self.driver_start_sec)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Longest crate-side deadline; WebDriver's own timeouts are set above it.
    pub fn longest(&self) -> Duration {
        [
            self.page_load(),
            self.script(),
            self.sign_in(),
            self.pagination(),
        ]
        .into_iter()
        .max()
        .unwrap_or_default()
    }
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("reader.cloud_reader_url", &self.reader.cloud_reader_url),
            ("reader.signin_url", &self.reader.signin_url),
            ("browser.webdriver_url", &self.browser.webdriver_url),
        ] {
            Url::parse(value).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        }

        for (key, value) in [
            ("timeouts.page_load_sec", self.timeouts.page_load_sec),
            ("timeouts.script_sec", self.timeouts.script_sec),
            ("timeouts.sign_in_sec", self.timeouts.sign_in_sec),
            ("timeouts.pagination_sec", self.timeouts.pagination_sec),
            ("timeouts.driver_start_sec", self.timeouts.driver_start_sec),
        ] {
            let in_range = Duration::try_from_secs_f64(value)
                .is_ok_and(|duration| !duration.is_zero() && duration <= MAX_TIMEOUT);
            if !in_range {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!(
                        "must be more than 0 and at most {} seconds",
                        MAX_TIMEOUT.as_secs()
                    ),
                });
            }
        }

        if self.timeouts.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timeouts.poll_interval_ms".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}
