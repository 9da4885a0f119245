use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::ConfigError;
use crate::models::{LatLng, MAX_PAGE_LIMIT};

const APP_DIR: &str = "rental-scout";
const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub list: ListConfig,
    pub ping: PingConfig,
    pub scrape: ScrapeConfig,
    pub live: LiveConfig,
    pub notifications: NotificationConfig,
    pub map: MapConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    /// Only the offer list request is cut off; everything else waits.
    pub list_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            list_timeout_secs: 10,
            user_agent: format!("rental-scout/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ServerConfig {
    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListConfig {
    /// Offers requested per list fetch, at most 500.
    pub page_limit: u32,
    /// Cards revealed per infinite-scroll step.
    pub page_size: usize,
    /// Distance from the bottom of the list that triggers the next step.
    pub scroll_threshold_px: u32,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            page_limit: MAX_PAGE_LIMIT,
            page_size: 50,
            scroll_threshold_px: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingConfig {
    pub debounce_ms: u64,
    pub batch_size: usize,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            batch_size: 50,
        }
    }
}

impl PingConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub poll_interval_secs: u64,
    pub max_duration_secs: u64,
    /// Pause between the finished status and the final reload.
    pub settle_secs: u64,
    pub status_initial_delay_secs: u64,
    pub status_interval_secs: u64,
    pub status_busy_interval_secs: u64,
    pub status_error_interval_secs: u64,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            max_duration_secs: 10 * 60,
            settle_secs: 2,
            status_initial_delay_secs: 10,
            status_interval_secs: 10,
            status_busy_interval_secs: 3,
            status_error_interval_secs: 5,
        }
    }
}

impl ScrapeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
    /// 1.0 keeps the delay fixed.
    pub backoff_multiplier: f64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: 5,
            max_reconnect_delay_secs: 5,
            backoff_multiplier: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub min_spacing_ms: u64,
    pub display_ms: u64,
    pub exit_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            min_spacing_ms: 3000,
            display_ms: 5000,
            exit_ms: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Coordinate the backend assigns when geocoding failed (Prague centre).
    pub fallback_lat: f64,
    pub fallback_lng: f64,
    pub fan_out_radius: f64,
    pub fan_out_slots: u32,
    pub fit_padding: f64,
    pub district_zoom: u8,
    pub min_zoom: u8,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            fallback_lat: 50.0755,
            fallback_lng: 14.4378,
            fan_out_radius: 0.005,
            fan_out_slots: 20,
            fit_padding: 0.1,
            district_zoom: 13,
            min_zoom: 10,
        }
    }
}

impl MapConfig {
    pub fn fallback(&self) -> LatLng {
        LatLng::new(self.fallback_lat, self.fallback_lng)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

impl LoggingConfig {
    /// Initialize the tracing subscriber. `RUST_LOG` wins over `level`.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.format.as_str() {
            "json" => {
                fmt().json().with_env_filter(filter).init();
            }
            _ => {
                fmt().with_env_filter(filter).init();
            }
        }
    }
}

impl Config {
    /// First config file found on the search path, defaults otherwise.
    pub fn load() -> Result<Self, ConfigError> {
        for path in Self::config_paths() {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(&path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;

        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::WriteFile {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_err)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.list.page_limit == 0 || self.list.page_limit > MAX_PAGE_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "list.page_limit",
                reason: format!("must be within 1..={MAX_PAGE_LIMIT}"),
            });
        }
        if self.list.page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "list.page_size",
                reason: "must be positive".to_string(),
            });
        }
        if self.map.fan_out_slots == 0 {
            return Err(ConfigError::InvalidValue {
                field: "map.fan_out_slots",
                reason: "must be positive".to_string(),
            });
        }
        let multiplier = self.live.backoff_multiplier;
        if !(1.0..=MAX_BACKOFF_MULTIPLIER).contains(&multiplier) {
            return Err(ConfigError::InvalidValue {
                field: "live.backoff_multiplier",
                reason: format!("must be between 1.0 and {MAX_BACKOFF_MULTIPLIER}"),
            });
        }
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("rental-scout.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join(APP_DIR).join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".rental-scout").join("config.toml"));
        }

        paths
    }
}
