//! Harvester configuration.
//!
//! One TOML file under the per-user config directory, every section
//! optional, a few `HARVEST_*` variables applied on top.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Process configuration, read from `~/.config/harvester/config.toml` (or
/// the platform equivalent). Missing file or sections mean defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Browser session settings
    pub browser: BrowserConfig,
    /// Target site endpoints
    pub site: SiteConfig,
    /// Message broker settings
    pub broker: BrokerConfig,
    /// Document store settings
    pub storage: StorageConfig,
    /// Task handling behavior
    pub crawl: CrawlConfig,
}

impl AppConfig {
    /// Read the per-user config file, or defaults when there is none.
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Read `path`, or defaults when it does not exist.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            let contents = fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `HARVEST_HEADLESS`: Override browser headless mode (true/false)
    /// - `HARVEST_SWITCH_IP`: Override proxy IP rotation (true/false)
    /// - `HARVEST_RATE_LIMIT`: Override permits per second
    /// - `HARVEST_BROKER_SERVERS`: Override broker bootstrap servers
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `HARVEST_*` environment overrides in place.
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("HARVEST_HEADLESS") {
            if let Ok(headless) = val.parse() {
                self.browser.headless = headless;
                tracing::debug!("Override browser.headless from env: {}", headless);
            }
        }

        if let Ok(val) = std::env::var("HARVEST_SWITCH_IP") {
            if let Ok(switch_ip) = val.parse() {
                self.browser.switch_ip = switch_ip;
                tracing::debug!("Override browser.switch_ip from env: {}", switch_ip);
            }
        }

        if let Ok(val) = std::env::var("HARVEST_RATE_LIMIT") {
            if let Ok(rate) = val.parse() {
                self.browser.rate_limit = rate;
                tracing::debug!("Override browser.rate_limit from env: {}", rate);
            }
        }

        if let Ok(val) = std::env::var("HARVEST_BROKER_SERVERS") {
            if !val.trim().is_empty() {
                tracing::debug!("Override broker.servers from env: {}", val);
                self.broker.servers = val;
            }
        }
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.browser.rate_limit.is_nan() || self.browser.rate_limit <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "browser.rate_limit".to_string(),
                reason: format!("must be positive, got {}", self.browser.rate_limit),
            });
        }

        if self.browser.use_proxy || self.browser.switch_ip {
            let valid = self
                .browser
                .proxy
                .rsplit_once(':')
                .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
            if !valid {
                return Err(ConfigError::InvalidValue {
                    field: "browser.proxy".to_string(),
                    reason: format!("expected host:port, got '{}'", self.browser.proxy),
                });
            }
        }

        if self.broker.high_water <= self.broker.low_water {
            return Err(ConfigError::InvalidValue {
                field: "broker.high_water".to_string(),
                reason: format!(
                    "must be above low_water ({}), got {}",
                    self.broker.low_water, self.broker.high_water
                ),
            });
        }

        Ok(())
    }

    /// Write this configuration as TOML to `path`, creating parent
    /// directories as needed.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        tracing::info!("Writing config to {}", path.display());
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/harvester/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "harvester", "harvester").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/harvester`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "harvester", "harvester").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Resolve the database path, defaulting into the data directory.
    pub fn database_path(&self) -> ConfigResult<PathBuf> {
        match &self.storage.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("harvester.db")),
        }
    }
}

/// Browser session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,
    /// Connect to an already running browser instead of launching one
    pub remote_url: Option<String>,
    /// Route traffic through `proxy`
    pub use_proxy: bool,
    /// Proxy endpoint as `host:port`
    pub proxy: String,
    /// Rotate the upstream proxy IP on every refresh
    pub switch_ip: bool,
    /// Permits per second shared by every outbound action
    pub rate_limit: f64,
    /// Navigation timeout in seconds
    pub navigation_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            remote_url: None,
            use_proxy: false,
            proxy: "10.0.0.18:3128".to_string(),
            switch_ip: false,
            rate_limit: 5.0,
            navigation_timeout_secs: 30,
        }
    }
}

impl BrowserConfig {
    /// Proxy endpoint in effect, if any.
    #[must_use]
    pub fn active_proxy(&self) -> Option<&str> {
        (self.use_proxy || self.switch_ip).then_some(self.proxy.as_str())
    }
}

/// Target site endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Site origin, also sent as the `Origin` header
    pub base_url: String,
    /// Listing page navigated to during refresh; exposes the full cookie set
    pub bootstrap_url: String,
    /// List API path, relative to `base_url`
    pub list_path: String,
    /// Content script endpoint, document id is appended
    pub content_url: String,
    /// Verification page, document id is appended
    pub verify_url: String,
    /// Plain content page used by the DOM fallback, document id is appended
    pub content_page_url: String,
    /// Proxy provider endpoint that switches the exit IP
    pub proxy_switch_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://wenshu.court.gov.cn".to_string(),
            bootstrap_url: "http://wenshu.court.gov.cn/List/List?sorttype=1&conditions=searchWord+1+AJLX++%E6%A1%88%E4%BB%B6%E7%B1%BB%E5%9E%8B:%E5%88%91%E4%BA%8B%E6%A1%88%E4%BB%B6".to_string(),
            list_path: "/List/ListContent".to_string(),
            content_url: "http://wenshu.court.gov.cn/CreateContentJS/CreateContentJS.aspx?DocID=".to_string(),
            verify_url: "http://wenshu.court.gov.cn/Html_Pages/VisitRemind20180914.html?DocID=".to_string(),
            content_page_url: "http://wenshu.court.gov.cn/content/content?DocID=".to_string(),
            proxy_switch_url: "http://proxy.abuyun.com/switch-ip".to_string(),
        }
    }
}

impl SiteConfig {
    /// Absolute list API URL.
    #[must_use]
    pub fn list_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.list_path)
    }
}

/// Message broker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Bootstrap servers, comma separated
    pub servers: String,
    /// Topic carrying every task tag
    pub topic: String,
    /// Consumer group id
    pub group_id: String,
    /// Bounded wait of a single poll in milliseconds
    pub poll_wait_ms: u64,
    /// Records returned by one poll at most
    pub max_poll_records: usize,
    /// Poll again once buffer occupancy drops under this mark
    pub low_water: usize,
    /// Stop polling while buffer occupancy is above this mark
    pub high_water: usize,
    /// Least time between two polls while the buffer sits between the
    /// marks, in milliseconds
    pub min_poll_interval_ms: u64,
    /// Consumer session timeout in milliseconds
    pub session_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            servers: "10.0.0.18:9092".to_string(),
            topic: "courtcrawls".to_string(),
            group_id: "harvester".to_string(),
            poll_wait_ms: 5000,
            max_poll_records: 10,
            low_water: 3,
            high_water: 100,
            min_poll_interval_ms: 1000,
            session_timeout_ms: 10_000,
        }
    }
}

/// Document store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `SQLite` database file; defaults to `harvester.db` in the data directory
    pub database_path: Option<PathBuf>,
}

/// Task handling behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Requeue list tasks untouched instead of handling them
    pub ignore_list_task: bool,
    /// Requeue API tasks untouched instead of handling them
    pub ignore_api_task: bool,
    /// Attempts per task before it is dropped or converted
    pub max_task_retries: u32,
    /// Optional TOML file overriding the response classification rules
    pub rules_path: Option<PathBuf>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            ignore_list_task: false,
            ignore_api_task: false,
            max_task_retries: 5,
            rules_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(!config.browser.headless);
        assert!((config.browser.rate_limit - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.broker.topic, "courtcrawls");
        assert_eq!(config.broker.low_water, 3);
        assert_eq!(config.broker.high_water, 100);
        assert_eq!(config.crawl.max_task_retries, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("[browser]"));
        assert!(toml_str.contains("[site]"));
        assert!(toml_str.contains("[broker]"));

        let parsed: AppConfig = toml::from_str(&toml_str).expect("parse serialized config");
        assert_eq!(parsed.site.base_url, config.site.base_url);
        assert_eq!(parsed.broker.servers, config.broker.servers);
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new().expect("create temp dir");
        let config_path = tmp.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.browser.switch_ip = true;
        config.crawl.ignore_api_task = true;
        config.save_to(&config_path).expect("save config");

        let loaded = AppConfig::load_from(&config_path).expect("load config");
        assert!(loaded.browser.switch_ip);
        assert!(loaded.crawl.ignore_api_task);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = TempDir::new().expect("create temp dir");
        let loaded = AppConfig::load_from(&tmp.path().join("absent.toml")).expect("load");
        assert_eq!(loaded.crawl.max_task_retries, 5);
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("HARVEST_HEADLESS", "true");
        std::env::set_var("HARVEST_RATE_LIMIT", "2.5");
        std::env::set_var("HARVEST_BROKER_SERVERS", "broker-a:9092,broker-b:9092");

        let mut config = AppConfig::default();
        config.apply_env();
        assert!(config.browser.headless);
        assert!((config.browser.rate_limit - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.broker.servers, "broker-a:9092,broker-b:9092");

        std::env::remove_var("HARVEST_HEADLESS");
        std::env::remove_var("HARVEST_RATE_LIMIT");
        std::env::remove_var("HARVEST_BROKER_SERVERS");
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[browser]
switch_ip = true

[crawl]
max_task_retries = 2
"#;

        let config: AppConfig = toml::from_str(toml_str).expect("parse partial config");
        assert!(config.browser.switch_ip);
        assert_eq!(config.crawl.max_task_retries, 2);
        assert_eq!(config.broker.poll_wait_ms, 5000);
        assert_eq!(config.browser.active_proxy(), Some("10.0.0.18:3128"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.browser.rate_limit = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.browser.use_proxy = true;
        config.browser.proxy = "no-port".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.broker.high_water = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_list_url() {
        let site = SiteConfig::default();
        assert_eq!(site.list_url(), "http://wenshu.court.gov.cn/List/ListContent");
    }
}
