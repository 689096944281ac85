//! Embedded geospatial index for geotagged device telemetry.
//!
//! Devices report `(payload, lat, lng, time)` readings. The index keeps the
//! full history of every device, a single live position per device indexed
//! by S2 cell, and answers radius and rectangle searches over those live
//! positions, all on top of a plain ordered key-value store.
//!
//! ```rust
//! use geottn::{GeoIndexer, rank_by_distance};
//! use std::time::SystemTime;
//!
//! let indexer = GeoIndexer::memory()?;
//! indexer.store("bus-12", b"{\"speed\":31}", 48.8566, 2.3522, SystemTime::now())?;
//! indexer.store("bus-40", b"{\"speed\":0}", 48.8610, 2.3360, SystemTime::now())?;
//!
//! let nearby = indexer.radius_search(48.8566, 2.3522, 2_000.0)?;
//! let ranked = rank_by_distance(nearby, 48.8566, 2.3522);
//! assert_eq!(ranked[0].0.key, "bus-12");
//! # Ok::<(), geottn::GeoError>(())
//! ```

pub mod builder;
pub mod cell;
pub mod config;
pub mod cover;
pub mod error;
pub mod indexer;
pub mod keys;
pub mod metrics;
pub mod storage;
pub mod types;

pub use builder::IndexerBuilder;
pub use cell::{CellId, CellRange};
pub use config::{Config, SyncMode, SyncPolicy};
pub use cover::{CellCoverer, S2Coverer, S2Region, SearchRegion};
pub use error::{GeoError, Result, StoreError};
pub use indexer::GeoIndexer;
pub use keys::{KeyCodec, max_geo_time, min_geo_time};
pub use metrics::{CounterMetrics, MetricsSink, MetricsSnapshot, NoopMetrics};
pub use types::{DataPoint, rank_by_distance};

pub use storage::{
    KvEntry, KvStore, MemoryStore, MemoryTransaction, ScanOptions, StorageOp, StorageStats,
    Transaction,
};

#[cfg(feature = "aof")]
pub use storage::CommitLog;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {
    pub use crate::{GeoError, GeoIndexer, IndexerBuilder, Result};

    pub use crate::{Config, SyncMode, SyncPolicy};

    pub use crate::{DataPoint, rank_by_distance};

    pub use crate::{KvStore, MemoryStore, Transaction};

    pub use crate::{CounterMetrics, MetricsSink};
}
