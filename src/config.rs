//! Indexer configuration.
//!
//! Every field has a serde default so partial JSON or TOML documents load
//! cleanly. Call [`Config::validate`] (done automatically by the loaders and
//! by [`IndexerBuilder::build`](crate::IndexerBuilder::build)) before use.
use serde::de::Error;
use serde::{Deserialize, Serialize};

/// Deepest level of the S2 cell hierarchy.
pub const MAX_CELL_LEVEL: u8 = 30;

/// Synchronization policy for the commit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// Never sync to disk (fastest, least safe)
    Never,
    /// Sync every second (recommended default)
    #[default]
    EverySecond,
    /// Sync after every commit (slowest, safest)
    Always,
}

/// File synchronization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Call `File::sync_all` to persist metadata + data.
    #[default]
    All,
    /// Call `File::sync_data` to persist data only.
    Data,
}

/// Indexer configuration
///
/// # Example
///
/// ```rust
/// use geottn::Config;
///
/// let json = r#"{ "prefix": "FLEET", "max_cells": 16 }"#;
/// let config = Config::from_json(json).unwrap();
/// assert_eq!(config.prefix, "FLEET");
/// assert_eq!(config.max_level, 30);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Namespace prepended to every key so the index can share a store
    #[serde(default = "Config::default_prefix")]
    pub prefix: String,

    /// Upper bound on the number of cells used to cover a search region.
    /// More cells give a tighter covering at the cost of more range scans.
    #[serde(default = "Config::default_max_cells")]
    pub max_cells: usize,

    /// Coarsest cell level a covering may use
    #[serde(default)]
    pub min_level: u8,

    /// Finest cell level a covering may use
    #[serde(default = "Config::default_max_level")]
    pub max_level: u8,

    #[serde(default)]
    pub sync_policy: SyncPolicy,

    #[serde(default)]
    pub sync_mode: SyncMode,
}

impl Config {
    fn default_prefix() -> String {
        "TT".to_string()
    }

    const fn default_max_cells() -> usize {
        8
    }

    const fn default_max_level() -> u8 {
        MAX_CELL_LEVEL
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_max_cells(mut self, max_cells: usize) -> Self {
        assert!(max_cells > 0, "Covering cell budget must be greater than zero");
        self.max_cells = max_cells;
        self
    }

    pub fn with_levels(mut self, min_level: u8, max_level: u8) -> Self {
        assert!(
            min_level <= max_level && max_level <= MAX_CELL_LEVEL,
            "Cell levels must satisfy min <= max <= 30"
        );
        self.min_level = min_level;
        self.max_level = max_level;
        self
    }

    pub fn with_sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync_policy = policy;
        self
    }

    pub fn with_sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.max_cells == 0 {
            return Err("Covering cell budget must be greater than zero".to_string());
        }

        if self.max_level > MAX_CELL_LEVEL {
            return Err(format!(
                "Max cell level {} exceeds {}",
                self.max_level, MAX_CELL_LEVEL
            ));
        }

        if self.min_level > self.max_level {
            return Err(format!(
                "Min cell level {} is above max cell level {}",
                self.min_level, self.max_level
            ));
        }

        Ok(())
    }

    /// Load configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load configuration from TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix: Self::default_prefix(),
            max_cells: Self::default_max_cells(),
            min_level: 0,
            max_level: Self::default_max_level(),
            sync_policy: SyncPolicy::default(),
            sync_mode: SyncMode::default(),
        }
    }
}
