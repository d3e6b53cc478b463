//! Service configuration module.
//!
//! Handles loading and validating `photofeed.toml`. Every value has a stock
//! default; a config file only needs the keys it wants to override.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! data_dir = "data"       # Originals: data/image/{ref}.jpg, data/icon/{ref}.png
//! cache_dir = "static"    # Derivatives: static/{image,icon}/{size}/{ref}.{ext}
//! log_level = "info"      # Overridden by RUST_LOG when set
//!
//! [feed]
//! timeout_secs = 30       # How long a poll may block before answering empty
//! interval_secs = 2       # Pause between re-queries while nothing is new
//! page_size = 30          # Max items per response
//!
//! [images]
//! small = 128             # Square edge in pixels
//! medium = 256
//! large = -1              # Negative = serve the original unresized
//! quality = 75            # JPEG quality (1-100)
//!
//! [icons]
//! small = 32
//! medium = 64
//! large = 128
//!
//! [processing]
//! max_processes = 4       # Max prewarm workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "photofeed.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Service configuration loaded from `photofeed.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Root directory for original uploads.
    pub data_dir: PathBuf,
    /// Root directory for cached derivatives.
    pub cache_dir: PathBuf,
    /// Default tracing filter.
    pub log_level: String,
    pub feed: FeedConfig,
    #[serde(deserialize_with = "image_table")]
    pub images: SizeTable,
    #[serde(deserialize_with = "icon_table")]
    pub icons: SizeTable,
    pub processing: ProcessingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            cache_dir: PathBuf::from("static"),
            log_level: "info".to_string(),
            feed: FeedConfig::default(),
            images: SizeTable::image_defaults(),
            icons: SizeTable::icon_defaults(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "feed.interval_secs must be positive".into(),
            ));
        }
        if self.feed.timeout_secs < self.feed.interval_secs {
            return Err(ConfigError::Validation(
                "feed.timeout_secs must be at least feed.interval_secs".into(),
            ));
        }
        if self.feed.page_size == 0 {
            return Err(ConfigError::Validation(
                "feed.page_size must be positive".into(),
            ));
        }
        if !(1..=100).contains(&self.images.quality) {
            return Err(ConfigError::Validation(
                "images.quality must be 1-100".into(),
            ));
        }
        for (name, width) in self.icons.entries() {
            if width <= 0 {
                return Err(ConfigError::Validation(format!(
                    "icons.{name} must be a positive pixel size"
                )));
            }
        }
        for (name, width) in self.images.entries() {
            if width == 0 {
                return Err(ConfigError::Validation(format!(
                    "images.{name} must be non-zero (use a negative value for the original)"
                )));
            }
        }
        Ok(())
    }
}

/// Long-poll timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedConfig {
    pub timeout_secs: u64,
    pub interval_secs: u64,
    pub page_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            interval_secs: 2,
            page_size: 30,
        }
    }
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Pixel sizes for the `s` / `m` / `l` size classes.
///
/// A negative value means "original, unresized". In a config file each
/// table is partial: missing keys keep the defaults of its kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizeTable {
    pub small: i32,
    pub medium: i32,
    pub large: i32,
    /// Lossy encoding quality; ignored for PNG output.
    pub quality: u32,
}

fn default_quality() -> u32 {
    75
}

impl SizeTable {
    pub fn image_defaults() -> Self {
        Self {
            small: 128,
            medium: 256,
            large: -1,
            quality: default_quality(),
        }
    }

    pub fn icon_defaults() -> Self {
        Self {
            small: 32,
            medium: 64,
            large: 128,
            quality: default_quality(),
        }
    }

    /// Overlay the keys present in `overrides`.
    fn merged(self, overrides: SizeOverrides) -> Self {
        Self {
            small: overrides.small.unwrap_or(self.small),
            medium: overrides.medium.unwrap_or(self.medium),
            large: overrides.large.unwrap_or(self.large),
            quality: overrides.quality.unwrap_or(self.quality),
        }
    }

    fn entries(&self) -> [(&'static str, i32); 3] {
        [
            ("small", self.small),
            ("medium", self.medium),
            ("large", self.large),
        ]
    }
}

/// What a `[images]` / `[icons]` table actually contains.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SizeOverrides {
    small: Option<i32>,
    medium: Option<i32>,
    large: Option<i32>,
    quality: Option<u32>,
}

fn image_table<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SizeTable, D::Error> {
    let overrides = SizeOverrides::deserialize(deserializer)?;
    Ok(SizeTable::image_defaults().merged(overrides))
}

fn icon_table<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SizeTable, D::Error> {
    let overrides = SizeOverrides::deserialize(deserializer)?;
    Ok(SizeTable::icon_defaults().merged(overrides))
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel prewarm workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Load config from `path`, falling back to stock defaults when the file
/// does not exist. The result is validated.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let config = if path.exists() {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)?
    } else {
        ServiceConfig::default()
    };
    config.validate()?;
    Ok(config)
}

/// A documented stock `photofeed.toml` with every option at its default.
pub fn stock_config_toml() -> &'static str {
    r#"# photofeed configuration
# All options are optional; the values below are the defaults.

# Root directory for original uploads (image/{ref}.jpg, icon/{ref}.png).
data_dir = "data"

# Root directory for cached derivatives ({image,icon}/{s,m,l}/{ref}.{ext}).
cache_dir = "static"

# Default log filter. RUST_LOG takes precedence when set.
log_level = "info"

[feed]
# Seconds a poll blocks before answering with an empty page.
timeout_secs = 30
# Seconds between re-queries while nothing new is visible.
interval_secs = 2
# Maximum number of items per response.
page_size = 30

[images]
# Square edge in pixels per size class. Negative = original, unresized.
small = 128
medium = 256
large = -1
# JPEG quality (1-100).
quality = 75

[icons]
small = 32
medium = 64
large = 128

[processing]
# Maximum parallel prewarm workers. Omit for one per CPU core.
# max_processes = 4
"#
}
