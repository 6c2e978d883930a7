use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}, time::Duration};

use crate::{
    error::ConfigError,
    model::{Coordinate, NotableQuery},
    source::ebird::DEFAULT_BASE_URL,
};

pub const MAX_RADIUS_KM: u32 = 50;
pub const MAX_BACK_DAYS: u32 = 30;
pub const MAX_RESULTS_LIMIT: u32 = 10_000;
pub const MAX_TIMEOUT_SECS: u64 = 300;

/// Index of the published map archive, linked from every page's title bar.
pub const DEFAULT_ARCHIVE_URL: &str = "https://mmcgee.github.io/ebird-notable-maps/";

/// Environment variables that override file settings.
pub const OUTPUT_DIR_ENV: &str = "OUTPUT_DIR";
pub const KEEP_COUNT_ENV: &str = "KEEP_COUNT";
pub const RADIUS_ENV: &str = "BIRDMAP_RADIUS_KM";
pub const BACK_DAYS_ENV: &str = "BIRDMAP_BACK_DAYS";

/// Where to look and how wide.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_km: u32,
    pub back_days: u32,
    pub max_results: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            center_lat: 42.397_404_2,
            center_lon: -71.136_633_7,
            radius_km: 10,
            back_days: 2,
            max_results: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub zoom_start: u8,
    /// Above this many distinct species all markers share one layer.
    pub species_layer_threshold: usize,
    /// Link shown in the title bar. An empty string hides it.
    pub archive_url: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            zoom_start: 11,
            species_layer_threshold: 25,
            archive_url: Some(DEFAULT_ARCHIVE_URL.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub output_dir: PathBuf,
    /// Also write a timestamped copy next to `latest.html`.
    pub archive: bool,
    /// Number of timestamped copies to keep.
    pub keep_count: usize,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self { output_dir: PathBuf::from("maps"), archive: true, keep_count: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Total attempts for transient network failures, including the first.
    pub max_attempts: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { base_url: DEFAULT_BASE_URL.to_string(), timeout_secs: 30, max_attempts: 2 }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Top-level configuration.
///
/// Example TOML:
/// ```toml
/// [query]
/// center_lat = 42.3974042
/// center_lon = -71.1366337
/// radius_km = 10
/// back_days = 2
///
/// [publish]
/// output_dir = "maps"
/// keep_count = 30
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub query: QueryConfig,
    pub render: RenderConfig,
    pub publish: PublishConfig,
    pub http: HttpConfig,
}

impl Config {
    /// Load config from `path` if given (it must exist), otherwise from the
    /// platform config file if present, otherwise the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = Self::config_file_path()?;
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the default config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "birdmap", "birdmap")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Apply overrides from the environment. `lookup` is `std::env::var` in
    /// production and a map in tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(dir) = get(OUTPUT_DIR_ENV) {
            self.publish.output_dir = PathBuf::from(dir);
        }
        if let Some(raw) = get(KEEP_COUNT_ENV) {
            self.publish.keep_count = parse_env(KEEP_COUNT_ENV, &raw)?;
        }
        if let Some(raw) = get(RADIUS_ENV) {
            self.query.radius_km = parse_env(RADIUS_ENV, &raw)?;
        }
        if let Some(raw) = get(BACK_DAYS_ENV) {
            self.query.back_days = parse_env(BACK_DAYS_ENV, &raw)?;
        }

        Ok(())
    }

    /// Check bounds and build the query. Must succeed before any request is made.
    pub fn notable_query(&self) -> Result<NotableQuery, ConfigError> {
        let q = &self.query;

        if !(-90.0..=90.0).contains(&q.center_lat) {
            return Err(ConfigError::out_of_range("center_lat", q.center_lat, -90.0, 90.0));
        }
        if !(-180.0..=180.0).contains(&q.center_lon) {
            return Err(ConfigError::out_of_range("center_lon", q.center_lon, -180.0, 180.0));
        }
        if !(1..=MAX_RADIUS_KM).contains(&q.radius_km) {
            return Err(ConfigError::out_of_range("radius_km", q.radius_km, 1, MAX_RADIUS_KM));
        }
        if !(1..=MAX_BACK_DAYS).contains(&q.back_days) {
            return Err(ConfigError::out_of_range("back_days", q.back_days, 1, MAX_BACK_DAYS));
        }
        if !(1..=MAX_RESULTS_LIMIT).contains(&q.max_results) {
            return Err(ConfigError::out_of_range(
                "max_results",
                q.max_results,
                1,
                MAX_RESULTS_LIMIT,
            ));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.http.timeout_secs) {
            return Err(ConfigError::out_of_range(
                "http.timeout_secs",
                self.http.timeout_secs,
                1,
                MAX_TIMEOUT_SECS,
            ));
        }
        if self.http.max_attempts == 0 {
            return Err(ConfigError::out_of_range("http.max_attempts", 0, 1, u32::MAX));
        }

        Ok(NotableQuery {
            center: Coordinate::new(q.center_lat, q.center_lon),
            radius_km: q.radius_km,
            back_days: q.back_days,
            max_results: q.max_results,
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidEnv { name, value: raw.to_string() })
}
