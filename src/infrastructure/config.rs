//! Configuration infrastructure
//!
//! One JSON document with a section per concern. Every section (and every
//! field inside it) falls back to the values in [`defaults`], so a partial
//! file written by hand is enough to run.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use chrono::{FixedOffset, TimeDelta};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::crawling::{CrawlPlan, RunSchedule, SearchFailurePolicy};
use crate::infrastructure::product_store::CorruptRecordPolicy;

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub crawl: CrawlConfig,
    pub schedule: ScheduleConfig,
    pub batch: BatchConfig,
    pub http: HttpConfig,
    pub parsing: ParsingConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// What to crawl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Category search URLs, crawled in order
    pub search_urls: Vec<String>,

    /// Pages past this number are never requested for a search URL
    pub max_pages_per_search: u32,

    /// Pause after each processed search page in milliseconds
    pub page_delay_ms: u64,

    pub search_failure_policy: SearchFailurePolicy,
}

/// When the job runs and how long it may take
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Hours of day the job is started at
    pub hours: Vec<u32>,

    pub max_run_minutes: u64,

    /// Stop this long before the next scheduled start
    pub soft_margin_minutes: u64,

    /// Offset of the scheduler clock (and of observation dates) from UTC
    pub utc_offset_minutes: i32,
}

/// Product detail fan-out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Products fetched concurrently
    pub batch_size: usize,

    /// Delay between batches in milliseconds
    pub batch_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub request_timeout_seconds: u64,
    pub max_requests_per_second: u32,
    /// Extra attempts for transient failures (5xx, 429, network)
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

/// Selectors and keywords for BOOTH markup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    pub search_item_selector: String,
    pub search_id_attribute: String,
    pub detail_base_url: String,
    /// Tried in order until one yields text
    pub title_selectors: Vec<String>,
    pub variation_selector: String,
    pub variation_name_selector: String,
    pub variation_price_selector: String,
    /// Product price when no variation block exists
    pub main_price_selector: String,
    pub description_selector: String,
    /// Class on a price element that marks it discounted
    pub sale_class: String,
    pub sale_marker_selector: String,
    /// Matched case-insensitively against name and description
    pub sale_keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the sharded product files and the checkpoint
    pub data_dir: PathBuf,
    pub corrupt_record_policy: CorruptRecordPolicy,
}

/// Logging configuration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    pub json_format: bool,
    pub console_output: bool,
    pub file_output: bool,

    /// Defaults to `logs/` next to the executable
    pub log_dir: Option<PathBuf>,
    pub file_name: String,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,
    pub auto_cleanup_logs: bool,

    /// Module-specific level overrides (e.g. "reqwest": "debug")
    pub module_filters: HashMap<String, String>,
}

/// Default values for every setting
pub mod defaults {
    pub const SEARCH_URLS: [&str; 2] = [
        "https://booth.pm/ja/browse/3D%E3%83%A2%E3%83%87%E3%83%AB?sort=new&tags%5B%5D=VRChat&type=digital",
        "https://booth.pm/ja/browse/%E3%82%BD%E3%83%95%E3%83%88%E3%82%A6%E3%82%A7%E3%82%A2%E3%83%BB%E3%83%8F%E3%83%BC%E3%83%89%E3%82%A6%E3%82%A7%E3%82%A2?sort=new&tags%5B%5D=VRChat&type=digital",
    ];

    /// BOOTH's search pagination limit
    pub const MAX_PAGES_PER_SEARCH: u32 = 3333;
    pub const PAGE_DELAY_MS: u64 = 1500;

    pub const SCHEDULE_HOURS: [u32; 4] = [0, 6, 12, 18];
    pub const MAX_RUN_MINUTES: u64 = 5 * 60;
    pub const SOFT_MARGIN_MINUTES: u64 = 30;
    pub const UTC_OFFSET_MINUTES: i32 = 0;

    pub const BATCH_SIZE: usize = 5;
    pub const BATCH_DELAY_MS: u64 = 1000;

    pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;
    pub const MAX_REQUESTS_PER_SECOND: u32 = 2;
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_BASE_DELAY_MS: u64 = 1000;

    pub const SEARCH_ITEM_SELECTOR: &str = ".item-card[data-product-id]";
    pub const SEARCH_ID_ATTRIBUTE: &str = "data-product-id";
    pub const DETAIL_BASE_URL: &str = "https://booth.pm/ja/items";
    pub const TITLE_SELECTORS: [&str; 3] = ["h2.font-bold", ".item-name", "h1"];
    pub const VARIATION_SELECTOR: &str = ".variation-item";
    pub const VARIATION_NAME_SELECTOR: &str = ".variation-name";
    pub const VARIATION_PRICE_SELECTOR: &str = ".variation-price";
    pub const MAIN_PRICE_SELECTOR: &str = ".price";
    pub const DESCRIPTION_SELECTOR: &str = ".js-market-item-detail-description";
    pub const SALE_CLASS: &str = "is-sale";
    pub const SALE_MARKER_SELECTOR: &str = ".on-sale";
    pub const SALE_KEYWORDS: [&str; 4] = ["sale", "セール", "割引", "off"];

    pub const DATA_DIR: &str = "data";

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_FILE_NAME: &str = "booth-price-tracker.log";
    pub const LOG_MAX_FILES: u32 = 10;
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            search_urls: defaults::SEARCH_URLS.iter().map(|s| s.to_string()).collect(),
            max_pages_per_search: defaults::MAX_PAGES_PER_SEARCH,
            page_delay_ms: defaults::PAGE_DELAY_MS,
            search_failure_policy: SearchFailurePolicy::default(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            hours: defaults::SCHEDULE_HOURS.to_vec(),
            max_run_minutes: defaults::MAX_RUN_MINUTES,
            soft_margin_minutes: defaults::SOFT_MARGIN_MINUTES,
            utc_offset_minutes: defaults::UTC_OFFSET_MINUTES,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            batch_delay_ms: defaults::BATCH_DELAY_MS,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::USER_AGENT.to_string(),
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            max_retries: defaults::MAX_RETRIES,
            retry_base_delay_ms: defaults::RETRY_BASE_DELAY_MS,
        }
    }
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            search_item_selector: defaults::SEARCH_ITEM_SELECTOR.to_string(),
            search_id_attribute: defaults::SEARCH_ID_ATTRIBUTE.to_string(),
            detail_base_url: defaults::DETAIL_BASE_URL.to_string(),
            title_selectors: defaults::TITLE_SELECTORS.iter().map(|s| s.to_string()).collect(),
            variation_selector: defaults::VARIATION_SELECTOR.to_string(),
            variation_name_selector: defaults::VARIATION_NAME_SELECTOR.to_string(),
            variation_price_selector: defaults::VARIATION_PRICE_SELECTOR.to_string(),
            main_price_selector: defaults::MAIN_PRICE_SELECTOR.to_string(),
            description_selector: defaults::DESCRIPTION_SELECTOR.to_string(),
            sale_class: defaults::SALE_CLASS.to_string(),
            sale_marker_selector: defaults::SALE_MARKER_SELECTOR.to_string(),
            sale_keywords: defaults::SALE_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(defaults::DATA_DIR),
            corrupt_record_policy: CorruptRecordPolicy::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            log_dir: None,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            max_files: defaults::LOG_MAX_FILES,
            auto_cleanup_logs: true,
            module_filters: HashMap::new(),
        }
    }
}

/// Settings that cannot produce a working crawler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("crawl.search_urls must contain at least one URL")]
    NoSearchUrls,

    #[error("Invalid search URL {url}: {reason}")]
    InvalidSearchUrl { url: String, reason: String },

    #[error("crawl.max_pages_per_search must be at least 1")]
    ZeroPageCap,

    #[error("batch.batch_size must be at least 1")]
    ZeroBatchSize,

    #[error("schedule.hours contains {0}, hours must be in 0..24")]
    InvalidHour(u32),

    #[error("schedule.{field} must be between {min} and {max} minutes, got {value}")]
    DurationOutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("schedule.utc_offset_minutes {0} is out of range")]
    InvalidUtcOffset(i32),

    #[error("http.max_requests_per_second must be at least 1")]
    ZeroRateLimit,

    #[error("Invalid parsing.{field}: {reason}")]
    InvalidParsing { field: &'static str, reason: String },
}

impl AppConfig {
    /// Reject values the crawler cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crawl.search_urls.is_empty() {
            return Err(ConfigError::NoSearchUrls);
        }
        for url in &self.crawl.search_urls {
            url::Url::parse(url).map_err(|e| ConfigError::InvalidSearchUrl {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        }
        if self.crawl.max_pages_per_search == 0 {
            return Err(ConfigError::ZeroPageCap);
        }
        if self.batch.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if let Some(hour) = self.schedule.hours.iter().find(|h| **h >= 24) {
            return Err(ConfigError::InvalidHour(*hour));
        }
        self.schedule.to_run_schedule()?;
        if self.http.max_requests_per_second == 0 {
            return Err(ConfigError::ZeroRateLimit);
        }
        url::Url::parse(&self.parsing.detail_base_url).map_err(|e| ConfigError::InvalidParsing {
            field: "detail_base_url",
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

impl CrawlConfig {
    pub fn to_plan(&self) -> CrawlPlan {
        CrawlPlan {
            search_urls: self.search_urls.clone(),
            max_pages_per_search: self.max_pages_per_search,
            page_delay: Duration::from_millis(self.page_delay_ms),
            search_failure_policy: self.search_failure_policy,
        }
    }
}

impl ScheduleConfig {
    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::InvalidUtcOffset(self.utc_offset_minutes))
    }

    pub fn to_run_schedule(&self) -> Result<RunSchedule, ConfigError> {
        Ok(RunSchedule {
            hours: self.hours.clone(),
            max_run_duration: bounded_minutes("max_run_minutes", self.max_run_minutes, 1, MAX_SCHEDULE_MINUTES)?,
            soft_margin: bounded_minutes("soft_margin_minutes", self.soft_margin_minutes, 0, MAX_SCHEDULE_MINUTES)?,
            offset: self.offset()?,
        })
    }
}

/// One week; anything longer is a typo
const MAX_SCHEDULE_MINUTES: u64 = 7 * 24 * 60;

fn bounded_minutes(field: &'static str, value: u64, min: u64, max: u64) -> Result<TimeDelta, ConfigError> {
    if !(min..=max).contains(&value) {
        return Err(ConfigError::DurationOutOfRange { field, value, min, max });
    }
    // bounded above, so the cast cannot truncate
    Ok(TimeDelta::minutes(value as i64))
}

impl BatchConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

/// Loads and persists [`AppConfig`]
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("booth-price-tracker");

        Ok(config_dir)
    }

    /// Manager for the per-user default location
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join("config.json");
        Ok(Self { config_path })
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Load configuration from file, creating default if it doesn't exist.
    ///
    /// An unparseable file is copied to `*.json.corrupted` and replaced by
    /// defaults.
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !fs::try_exists(&self.config_path).await.unwrap_or(false) {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .with_context(|| format!("Failed to read configuration file {:?}", self.config_path))?;

        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("Loaded configuration from: {:?}", self.config_path);
                Ok(config)
            }
            Err(parse_error) => {
                warn!("Configuration file is unreadable: {}", parse_error);
                warn!("Resetting to default configuration");

                let backup_path = self.config_path.with_extension("json.corrupted");
                if let Err(e) = fs::copy(&self.config_path, &backup_path).await {
                    warn!("Failed to create backup of corrupted config: {}", e);
                } else {
                    info!("Backed up corrupted config to: {:?}", backup_path);
                }

                let default_config = AppConfig::default();
                self.save_config(&default_config)
                    .await
                    .context("Failed to save default configuration")?;
                Ok(default_config)
            }
        }
    }

    /// Load and validate; the only entry point the binary uses
    pub async fn load_validated(&self) -> Result<AppConfig> {
        let config = self.load_config().await?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {:?}", self.config_path))?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}
