//! Configuration loading and typed config structures for Tradepost.
//!
//! The canonical configuration lives in `tradepost-config.yaml` at the
//! project root. This module defines strongly-typed structs that mirror the
//! YAML structure and a loader that reads and validates the file. Every
//! section and field has a default, so an empty file is a valid config.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tradepost_market::MarketConfig;
use tradepost_types::ResourceId;

/// Environment variable overriding `persistence.path`.
pub const ENV_SAVE_PATH: &str = "TRADEPOST_SAVE_PATH";

/// Environment variable overriding `world.seed`.
pub const ENV_SEED: &str = "TRADEPOST_SEED";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but makes no sense.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration, mirroring `tradepost-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// World-level settings (name, seed, timing).
    #[serde(default)]
    pub world: WorldConfig,

    /// Contract market tunables.
    #[serde(default)]
    pub market: MarketConfig,

    /// Towns created when no save file exists.
    #[serde(default)]
    pub towns: Vec<TownConfig>,

    /// Save file settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file, apply environment overrides, and
    /// validate it.
    ///
    /// Environment variables override YAML values:
    /// - `TRADEPOST_SAVE_PATH` overrides `persistence.path`
    /// - `TRADEPOST_SEED` overrides `world.seed`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides and
    /// no validation are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply overrides from `lookup`, which maps an environment variable name
    /// to its value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `TRADEPOST_SEED` is not a `u64`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(path) = lookup(ENV_SAVE_PATH) {
            self.persistence.path = PathBuf::from(path);
        }
        if let Some(seed) = lookup(ENV_SEED) {
            self.world.seed = seed.trim().parse().map_err(|_err| ConfigError::Invalid {
                reason: format!("{ENV_SEED} must be an unsigned integer, got {seed:?}"),
            })?;
        }
        Ok(())
    }

    /// Check cross-field constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let market = &self.market;
        if market.excess_threshold < 0 || market.need_threshold < 0 {
            return Err(invalid("market thresholds must not be negative"));
        }
        if market.default_unit_price <= 0 || market.unit_prices.values().any(|p| *p <= 0) {
            return Err(invalid("unit prices must be positive"));
        }
        if market.max_bid_multiplier.is_sign_negative()
            || market.bid_raise_factor.is_sign_negative()
        {
            return Err(invalid("market multipliers must not be negative"));
        }
        if market.contract_duration_ticks == 0 {
            return Err(invalid("market.contract_duration_ticks must be at least 1"));
        }
        if self.persistence.save_interval_ticks == 0 {
            return Err(invalid("persistence.save_interval_ticks must be at least 1"));
        }

        let mut names = BTreeSet::new();
        for town in &self.towns {
            if !names.insert(town.name.as_str()) {
                return Err(invalid(&format!("duplicate town name {:?}", town.name)));
            }
            if !town.position.x.is_finite() || !town.position.y.is_finite() {
                return Err(invalid(&format!("town {:?} has a non-finite position", town.name)));
            }
            if let Some((resource, _)) = town.stock.iter().find(|(_, qty)| **qty < 0) {
                return Err(invalid(&format!(
                    "town {:?} starts with negative {resource}",
                    town.name
                )));
            }
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.to_owned(),
    }
}

/// World-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Human-readable world name.
    #[serde(default = "default_world_name")]
    pub name: String,

    /// Random seed for bid jitter.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Real-time milliseconds between ticks (0 runs as fast as possible).
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Stop after this many ticks (0 = run until shut down).
    #[serde(default)]
    pub max_ticks: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: default_world_name(),
            seed: default_seed(),
            tick_interval_ms: default_tick_interval_ms(),
            max_ticks: 0,
        }
    }
}

fn default_world_name() -> String {
    "Tradepost".to_owned()
}

const fn default_seed() -> u64 {
    42
}

const fn default_tick_interval_ms() -> u64 {
    50
}

/// A point on the world map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// East-west coordinate.
    pub x: f64,
    /// North-south coordinate.
    pub y: f64,
}

impl Position {
    /// Straight-line distance to `other`.
    pub fn distance_to(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// A town created at world start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TownConfig {
    /// Unique town name.
    pub name: String,

    /// Location of the town.
    #[serde(default)]
    pub position: Position,

    /// Starting stock per resource.
    #[serde(default)]
    pub stock: BTreeMap<ResourceId, i64>,
}

/// Save file configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Path of the JSON save file.
    #[serde(default = "default_save_path")]
    pub path: PathBuf,

    /// Save every N ticks when the board changed.
    #[serde(default = "default_save_interval_ticks")]
    pub save_interval_ticks: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: default_save_path(),
            save_interval_ticks: default_save_interval_ticks(),
        }
    }
}

fn default_save_path() -> PathBuf {
    PathBuf::from("tradepost-save.json")
}

const fn default_save_interval_ticks() -> u64 {
    100
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
world:
  name: "Test World"
  seed: 123
  tick_interval_ms: 0
  max_ticks: 500

market:
  currency: emerald
  excess_threshold: 250
  max_bid_multiplier: "2.5"
  unit_prices:
    wood: 2
  courier_timeout_ticks: null

towns:
  - name: Oakvale
    position: { x: 0.0, y: 0.0 }
    stock:
      wood: 400
      emerald: 50
  - name: Stonebrook
    position: { x: 30.0, y: 40.0 }
    stock:
      emerald: 900

persistence:
  path: "/tmp/save.json"
  save_interval_ticks: 10

logging:
  level: debug
  json: true
"#;
        let config = SimulationConfig::parse(yaml).unwrap();
        assert_eq!(config.world.name, "Test World");
        assert_eq!(config.world.max_ticks, 500);
        assert_eq!(config.market.currency, ResourceId::from("emerald"));
        assert_eq!(config.market.max_bid_multiplier, dec!(2.5));
        assert_eq!(config.market.courier_timeout_ticks, None);
        assert_eq!(config.market.need_threshold, 100);
        assert_eq!(config.towns.len(), 2);
        let oakvale = config.towns.first().unwrap();
        let stonebrook = config.towns.get(1).unwrap();
        assert_eq!(oakvale.stock.get(&ResourceId::from("wood")), Some(&400));
        assert!((oakvale.position.distance_to(stonebrook.position) - 50.0).abs() < f64::EPSILON);
        assert_eq!(config.persistence.save_interval_ticks, 10);
        assert!(config.logging.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = SimulationConfig::parse("world:\n  seed: 7\n").unwrap();
        assert_eq!(config.world.seed, 7);
        assert_eq!(config.world.tick_interval_ms, 50);
        assert_eq!(config.market, MarketConfig::default());
        assert!(config.towns.is_empty());
    }

    #[test]
    fn parse_empty_yaml() {
        assert_eq!(SimulationConfig::parse("").unwrap(), SimulationConfig::default());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = SimulationConfig::default();
        config
            .apply_overrides(|key| match key {
                ENV_SAVE_PATH => Some("/data/world.json".to_owned()),
                ENV_SEED => Some(" 99 ".to_owned()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.persistence.path, PathBuf::from("/data/world.json"));
        assert_eq!(config.world.seed, 99);
    }

    #[test]
    fn bad_seed_override_is_rejected() {
        let mut config = SimulationConfig::default();
        let result = config.apply_overrides(|key| (key == ENV_SEED).then(|| "abc".to_owned()));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
        assert_eq!(config.world.seed, 42);
    }

    #[test]
    fn duplicate_town_names_are_invalid() {
        let yaml = "towns:\n  - name: A\n  - name: A\n";
        let config = SimulationConfig::parse(yaml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn negative_stock_is_invalid() {
        let yaml = "towns:\n  - name: A\n    stock:\n      wood: -5\n";
        let config = SimulationConfig::parse(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("tradepost-config.yaml");
        if path.exists() {
            let config = SimulationConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
