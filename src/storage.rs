//! Ordered key-value store abstraction.
//!
//! The indexer only talks to storage through [`KvStore`] and [`Transaction`]:
//! snapshot reads, ordered range scans and atomic multi-key commits over
//! plain byte keys. [`MemoryStore`] is the bundled engine; anything offering
//! the same guarantees (an embedded LSM, a B-tree file) can be plugged in.

use crate::error::StoreError;
use bytes::Bytes;
use uuid::Uuid;

#[cfg(feature = "aof")]
mod aof;
mod memory;

#[cfg(feature = "aof")]
pub use aof::CommitLog;
pub use memory::{MemoryStore, MemoryTransaction};

pub type Result<T> = std::result::Result<T, StoreError>;

/// A store handle able to open transactions.
pub trait KvStore: Send + Sync {
    type Txn: Transaction;

    /// Identity of the store, carried by every transaction it opens.
    fn id(&self) -> Uuid;

    /// Open a transaction reading from a snapshot taken now.
    fn new_transaction(&self, writable: bool) -> Self::Txn;

    /// Run `f` inside a read-only transaction that is discarded afterwards.
    fn view<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Self::Txn) -> std::result::Result<T, E>,
    {
        let mut txn = self.new_transaction(false);
        let out = f(&mut txn);
        txn.discard();
        out
    }

    /// Run `f` inside a writable transaction and commit it if `f` succeeds.
    fn update<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut Self::Txn) -> std::result::Result<T, E>,
    {
        let mut txn = self.new_transaction(true);
        match f(&mut txn) {
            Ok(out) => {
                txn.commit()?;
                Ok(out)
            }
            Err(e) => {
                txn.discard();
                Err(e)
            }
        }
    }
}

/// A snapshot-isolated unit of work.
///
/// Reads observe the snapshot plus this transaction's own pending writes.
/// Nothing becomes visible to others until [`commit`](Transaction::commit)
/// succeeds. Dropping a transaction without committing discards it.
pub trait Transaction: Send {
    fn store_id(&self) -> Uuid;

    fn is_writable(&self) -> bool;

    fn get(&mut self, key: &[u8]) -> Result<Option<Bytes>>;

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Entries in ascending key order within the bounds of `opts`.
    fn scan(&mut self, opts: &ScanOptions) -> Result<Vec<KvEntry>>;

    fn commit(self) -> Result<()>
    where
        Self: Sized;

    fn discard(self)
    where
        Self: Sized;
}

/// Bounds and shape of a range scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Inclusive lower bound
    pub start: Bytes,
    /// Exclusive upper bound, `None` scans to the end of the keyspace
    pub end: Option<Bytes>,
    /// Fetch values along with keys
    pub prefetch_values: bool,
    /// Stop after this many entries
    pub limit: Option<usize>,
}

impl ScanOptions {
    /// Every key starting with `prefix`.
    pub fn prefix(prefix: impl AsRef<[u8]>) -> Self {
        let start = Bytes::copy_from_slice(prefix.as_ref());
        let end = prefix_successor(&start);
        Self {
            start,
            end,
            prefetch_values: true,
            limit: None,
        }
    }

    /// Keys in `[start, end)`.
    pub fn range(start: Bytes, end: Option<Bytes>) -> Self {
        Self {
            start,
            end,
            prefetch_values: true,
            limit: None,
        }
    }

    pub fn keys_only(mut self) -> Self {
        self.prefetch_values = false;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn is_empty_range(&self) -> bool {
        matches!(&self.end, Some(end) if end.as_ref() <= self.start.as_ref())
    }
}

/// Smallest key greater than every key starting with `prefix`.
pub fn prefix_successor(prefix: &[u8]) -> Option<Bytes> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(Bytes::from(end));
        }
    }
    None
}

/// A key and, when requested, its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: Bytes,
    pub value: Option<Bytes>,
}

/// A single mutation of a committed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    Put { key: Bytes, value: Bytes },
    Delete { key: Bytes },
}

impl StorageOp {
    pub fn key(&self) -> &Bytes {
        match self {
            StorageOp::Put { key, .. } | StorageOp::Delete { key } => key,
        }
    }
}

/// Storage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Live keys at the latest commit
    pub key_count: usize,
    /// Successful commits that wrote at least one key
    pub commits: u64,
    /// Commits rejected because of a conflicting writer
    pub conflicts: u64,
    /// Transactions currently open
    pub open_transactions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_successor() {
        assert_eq!(prefix_successor(b"TTD").unwrap().as_ref(), b"TTE");
        assert_eq!(prefix_successor(b"a\xff\xff").unwrap().as_ref(), b"b");
        assert!(prefix_successor(b"\xff\xff").is_none());
        assert!(prefix_successor(b"").is_none());
    }

    #[test]
    fn test_scan_options() {
        let opts = ScanOptions::prefix("TTL").keys_only().with_limit(3);
        assert_eq!(opts.start.as_ref(), b"TTL");
        assert_eq!(opts.end.as_deref(), Some(&b"TTM"[..]));
        assert!(!opts.prefetch_values);
        assert_eq!(opts.limit, Some(3));
        assert!(!opts.is_empty_range());

        let inverted = ScanOptions::range(Bytes::from_static(b"b"), Some(Bytes::from_static(b"a")));
        assert!(inverted.is_empty_range());
    }
}
