//! Application configuration.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use stockwatch_jobs::JobSettings;
use stockwatch_sync::PriceFetchConfig;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "STOCKWATCH_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Backend connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Upper bound for any single HTTP request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Job status polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_analysis_interval_ms")]
    pub analysis_interval_ms: u64,
    #[serde(default = "default_backtest_interval_ms")]
    pub backtest_interval_ms: u64,
    /// How long `completed`/`failed` stays visible before `idle`.
    #[serde(default = "default_settle_hold_ms")]
    pub settle_hold_ms: u64,
}

fn default_analysis_interval_ms() -> u64 {
    2000
}

fn default_backtest_interval_ms() -> u64 {
    200
}

fn default_settle_hold_ms() -> u64 {
    3000
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            analysis_interval_ms: default_analysis_interval_ms(),
            backtest_interval_ms: default_backtest_interval_ms(),
            settle_hold_ms: default_settle_hold_ms(),
        }
    }
}

impl PollingConfig {
    pub fn analysis(&self) -> JobSettings {
        JobSettings {
            interval: Duration::from_millis(self.analysis_interval_ms),
            settle_hold: Duration::from_millis(self.settle_hold_ms),
        }
    }

    pub fn backtest(&self) -> JobSettings {
        JobSettings {
            interval: Duration::from_millis(self.backtest_interval_ms),
            settle_hold: Duration::from_millis(self.settle_hold_ms),
        }
    }
}

/// Price lookup timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricesConfig {
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    #[serde(default = "default_item_timeout_ms")]
    pub item_timeout_ms: u64,
    #[serde(default = "default_fallback_timeout_ms")]
    pub fallback_timeout_ms: u64,
}

fn default_batch_timeout_ms() -> u64 {
    8000
}

fn default_item_timeout_ms() -> u64 {
    10_000
}

fn default_fallback_timeout_ms() -> u64 {
    12_000
}

impl Default for PricesConfig {
    fn default() -> Self {
        Self {
            batch_timeout_ms: default_batch_timeout_ms(),
            item_timeout_ms: default_item_timeout_ms(),
            fallback_timeout_ms: default_fallback_timeout_ms(),
        }
    }
}

impl From<&PricesConfig> for PriceFetchConfig {
    fn from(cfg: &PricesConfig) -> Self {
        Self {
            batch_timeout: Duration::from_millis(cfg.batch_timeout_ms),
            item_timeout: Duration::from_millis(cfg.item_timeout_ms),
            fallback_timeout: Duration::from_millis(cfg.fallback_timeout_ms),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_log_filter() -> String {
    stockwatch_telemetry::logging::DEFAULT_FILTER.to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub prices: PricesConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Path from `STOCKWATCH_CONFIG`, else the default path.
    pub fn default_path() -> String {
        std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Load from the default path, falling back to built-in defaults when the
    /// file does not exist.
    pub fn load() -> AppResult<Self> {
        let path = Self::default_path();
        if Path::new(&path).exists() {
            Self::from_file(&path)
        } else {
            tracing::warn!(path = %path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.backend.base_url.trim().is_empty() {
            return Err(AppError::Config("backend.base_url is empty".to_string()));
        }
        let nonzero = [
            ("backend.request_timeout_ms", self.backend.request_timeout_ms),
            ("polling.analysis_interval_ms", self.polling.analysis_interval_ms),
            ("polling.backtest_interval_ms", self.polling.backtest_interval_ms),
            ("prices.batch_timeout_ms", self.prices.batch_timeout_ms),
            ("prices.item_timeout_ms", self.prices.item_timeout_ms),
            ("prices.fallback_timeout_ms", self.prices.fallback_timeout_ms),
        ];
        if let Some((key, _)) = nonzero.iter().find(|(_, v)| *v == 0) {
            return Err(AppError::Config(format!("{key} must be greater than 0")));
        }
        if self.prices.batch_timeout_ms >= self.prices.fallback_timeout_ms {
            return Err(AppError::Config(format!(
                "prices.batch_timeout_ms ({}) must be shorter than prices.fallback_timeout_ms ({})",
                self.prices.batch_timeout_ms, self.prices.fallback_timeout_ms
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.backend.request_timeout_ms)
    }
}
