//! Indexer builder for flexible configuration
//!
//! Wires a [`Config`], an optional commit log and a metrics sink into a
//! [`GeoIndexer`] over the bundled [`MemoryStore`].

use crate::config::Config;
use crate::error::{GeoError, Result};
use crate::indexer::GeoIndexer;
use crate::metrics::MetricsSink;
use crate::storage::MemoryStore;
#[cfg(feature = "aof")]
use std::path::PathBuf;
use std::sync::Arc;

/// Builder for an indexer with custom persistence paths and settings.
pub struct IndexerBuilder {
    #[cfg(feature = "aof")]
    commit_log_path: Option<PathBuf>,
    config: Config,
    metrics: Option<Arc<dyn MetricsSink>>,
    in_memory: bool,
}

impl IndexerBuilder {
    /// Create a new builder with default in-memory configuration.
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "aof")]
            commit_log_path: None,
            config: Config::default(),
            metrics: None,
            in_memory: true,
        }
    }

    /// Persist commits to a log at `path`. The file is created if needed and
    /// replayed on startup.
    #[cfg(feature = "aof")]
    pub fn commit_log_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.commit_log_path = Some(path.into());
        self.in_memory = false;
        self
    }

    /// Configure for in-memory storage with no persistence.
    pub fn in_memory(mut self) -> Self {
        self.in_memory = true;
        #[cfg(feature = "aof")]
        {
            self.commit_log_path = None;
        }
        self
    }

    /// Set the indexer configuration (prefix, covering, sync policy).
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the indexer. Opens and replays the commit log if configured.
    pub fn build(self) -> Result<GeoIndexer> {
        self.config.validate().map_err(GeoError::Config)?;

        let store = self.open_store()?;
        let indexer = GeoIndexer::new(store, &self.config)?;
        Ok(match self.metrics {
            Some(metrics) => indexer.with_metrics(metrics),
            None => indexer,
        })
    }

    #[cfg(feature = "aof")]
    fn open_store(&self) -> Result<MemoryStore> {
        match &self.commit_log_path {
            Some(path) if !self.in_memory => {
                log::info!("Opening geo index at {}", path.display());
                Ok(MemoryStore::open(
                    path,
                    self.config.sync_policy,
                    self.config.sync_mode,
                )?)
            }
            _ => Ok(MemoryStore::new()),
        }
    }

    #[cfg(not(feature = "aof"))]
    fn open_store(&self) -> Result<MemoryStore> {
        Ok(MemoryStore::new())
    }
}

impl Default for IndexerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
