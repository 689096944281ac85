//! Error types for the geospatial indexer and its backing store.

use thiserror::Error;

/// Failures raised by a [`KvStore`](crate::storage::KvStore) implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Another transaction committed a key this transaction read.
    #[error("transaction conflict, retry the operation")]
    Conflict,

    /// A write was attempted on a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// The store was closed.
    #[error("store is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The commit log contains a record this version cannot decode.
    #[error("invalid commit log format")]
    InvalidFormat,

    #[error("unexpected end of commit log")]
    UnexpectedEof,
}

/// Errors returned by [`GeoIndexer`](crate::GeoIndexer) operations.
#[derive(Error, Debug)]
pub enum GeoError {
    /// A stored key is truncated or does not belong to its namespace.
    #[error("malformed key: {0}")]
    MalformedKey(String),

    /// The transaction handle was not opened on this indexer's store.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(&'static str),

    /// The underlying store failed to read, write or commit.
    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("invalid device key: {0}")]
    InvalidKey(String),

    #[error("invalid coordinates: lat={lat}, lng={lng}")]
    InvalidCoordinates { lat: f64, lng: f64 },

    #[error("invalid search: {0}")]
    InvalidQuery(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl GeoError {
    /// True when the failure came from the store rather than from the inputs.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, GeoError::Store(_))
    }

    /// True when retrying the whole operation may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, GeoError::Store(StoreError::Conflict))
    }
}

pub type Result<T> = std::result::Result<T, GeoError>;
