//! The composed configuration and its RON persistence.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tessera_lod::LodConfig;
use tessera_terrain::PlanetConfig;
use tessera_tile::{CacheConfig, SchedulerConfig};

use crate::error::ConfigError;

/// File name inside the config directory.
pub const CONFIG_FILE: &str = "config.ron";

/// Everything the engine reads at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Tile cache capacity and storage layers.
    pub cache: CacheConfig,
    /// Per-frame task budget and compute backend.
    pub scheduler: SchedulerConfig,
    /// Quadtree subdivision policy.
    pub lod: LodConfig,
    /// Planet shape and terrain noise.
    pub planet: PlanetConfig,
    pub debug: DebugConfig,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Filter directive used when `RUST_LOG` is unset (e.g. "info", "tessera_tile=debug").
    pub log_level: String,
    /// Frames the headless demo runs.
    pub frames: u32,
    /// Frames between statistics reports in the demo.
    pub report_interval: u32,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            frames: 600,
            report_interval: 60,
        }
    }
}

/// `<platform config dir>/tessera`, or `./tessera` when the platform has none.
#[must_use]
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tessera")
}

impl Config {
    /// Load config from `config_dir`, writing the defaults there first if no
    /// file exists.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        ron::from_str(&contents).map_err(ConfigError::ParseError)
    }

    /// Write `config.ron` into `config_dir`, creating the directory.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(config_dir.join(CONFIG_FILE), serialized).map_err(ConfigError::WriteError)
    }

    /// Re-read the file: `Some` with the new settings if they differ from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE))?;
        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Check every section and the constraints between them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cache = &self.cache;
        if cache.capacity == 0 {
            return Err(ConfigError::Invalid("cache.capacity must be at least 1".into()));
        }
        if cache.layers.is_empty() {
            return Err(ConfigError::Invalid("cache.layers is empty".into()));
        }
        let mut names = HashSet::new();
        for layer in &cache.layers {
            if layer.channels == 0 {
                return Err(ConfigError::Invalid(format!(
                    "cache layer '{}' has no channels",
                    layer.name
                )));
            }
            if !names.insert(layer.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "cache layer '{}' is listed twice",
                    layer.name
                )));
            }
        }
        // Two border rims plus at least two interior texels.
        let min_size = 2 * self.planet.border + 2;
        if cache.tile_size < min_size {
            return Err(ConfigError::Invalid(format!(
                "cache.tile_size {} is too small for a border of {} (need {min_size})",
                cache.tile_size, self.planet.border
            )));
        }

        if self.scheduler.max_tasks_per_tick == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.max_tasks_per_tick must be at least 1".into(),
            ));
        }
        if (self.scheduler.worker_threads > 0 || self.scheduler.auto_workers)
            && self.scheduler.queue_capacity == 0
        {
            return Err(ConfigError::Invalid(
                "scheduler.queue_capacity must be at least 1 with worker threads".into(),
            ));
        }

        self.lod.validate().map_err(ConfigError::Invalid)?;
        self.planet.validate().map_err(ConfigError::Invalid)?;
        if self.lod.max_level > self.planet.max_level {
            return Err(ConfigError::Invalid(format!(
                "lod.max_level {} is deeper than planet.max_level {}",
                self.lod.max_level, self.planet.max_level
            )));
        }
        Ok(())
    }
}
