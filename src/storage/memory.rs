//! Multi-version in-memory store with optimistic transactions.
//!
//! Every key keeps a short list of `(commit_ts, value)` versions. A
//! transaction reads the newest version at or below the commit timestamp
//! current when it began, so readers never block writers. At commit, any key
//! or scanned range the transaction read that was rewritten by a later commit
//! aborts it with [`StoreError::Conflict`]. Versions nobody can still observe
//! are pruned as keys are rewritten, or all at once by [`MemoryStore::compact`].

use super::{KvEntry, KvStore, Result, ScanOptions, StorageOp, StorageStats, Transaction};
#[cfg(feature = "aof")]
use super::CommitLog;
#[cfg(feature = "aof")]
use crate::config::{SyncMode, SyncPolicy};
use crate::error::StoreError;
use bytes::Bytes;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;
#[cfg(feature = "aof")]
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Version {
    ts: u64,
    /// `None` marks a deletion
    value: Option<Bytes>,
}

type Versions = SmallVec<[Version; 2]>;

fn visible(versions: &Versions, read_ts: u64) -> Option<&Bytes> {
    versions
        .iter()
        .rev()
        .find(|v| v.ts <= read_ts)
        .and_then(|v| v.value.as_ref())
}

struct StoreInner {
    data: BTreeMap<Bytes, Versions>,
    last_commit: u64,
    /// Open transactions by snapshot timestamp
    active: BTreeMap<u64, usize>,
    #[cfg(feature = "aof")]
    log: Option<DurableLog>,
    closed: bool,
    commits: u64,
    conflicts: u64,
}

#[cfg(feature = "aof")]
struct DurableLog {
    file: CommitLog,
    policy: SyncPolicy,
    mode: SyncMode,
}

impl StoreInner {
    fn new() -> Self {
        Self {
            data: BTreeMap::new(),
            last_commit: 0,
            active: BTreeMap::new(),
            #[cfg(feature = "aof")]
            log: None,
            closed: false,
            commits: 0,
            conflicts: 0,
        }
    }

    /// Oldest snapshot any open transaction can read, `idle` when none is open.
    fn watermark(&self, idle: u64) -> u64 {
        self.active.keys().next().copied().unwrap_or(idle)
    }

    fn register(&mut self) -> u64 {
        let ts = self.last_commit;
        *self.active.entry(ts).or_insert(0) += 1;
        ts
    }

    fn release(&mut self, read_ts: u64) {
        if let Some(count) = self.active.get_mut(&read_ts) {
            *count -= 1;
            if *count == 0 {
                self.active.remove(&read_ts);
            }
        }
    }

    fn changed_since(&self, key: &[u8], read_ts: u64) -> bool {
        self.data
            .get(key)
            .and_then(|versions| versions.last())
            .is_some_and(|v| v.ts > read_ts)
    }

    fn range_changed_since(&self, start: &Bytes, end: &Option<Bytes>, read_ts: u64) -> bool {
        if matches!(end, Some(end) if end <= start) {
            return false;
        }
        self.data
            .range::<[u8], _>(bounds(start, end))
            .any(|(_, versions)| versions.last().is_some_and(|v| v.ts > read_ts))
    }

    fn apply(&mut self, ops: &[StorageOp], ts: u64) {
        let watermark = self.watermark(ts);
        for op in ops {
            let (key, value) = match op {
                StorageOp::Put { key, value } => (key, Some(value.clone())),
                StorageOp::Delete { key } => (key, None),
            };
            let versions = self.data.entry(key.clone()).or_default();
            versions.push(Version { ts, value });
            if prune(versions, watermark) {
                self.data.remove(key);
            }
        }
        self.last_commit = ts;
    }

    fn compact(&mut self) -> usize {
        let watermark = self.watermark(self.last_commit);
        let before = self.data.len();
        self.data.retain(|_, versions| !prune(versions, watermark));
        before - self.data.len()
    }
}

/// Drop versions hidden from every snapshot at or after `watermark`.
/// Returns true when the key holds nothing but a deletion nobody can see past.
fn prune(versions: &mut Versions, watermark: u64) -> bool {
    if let Some(keep_from) = versions.iter().rposition(|v| v.ts <= watermark) {
        if keep_from > 0 {
            versions.drain(..keep_from);
        }
    }
    versions.len() == 1 && versions[0].value.is_none() && versions[0].ts <= watermark
}

fn bounds<'a>(start: &'a Bytes, end: &'a Option<Bytes>) -> (Bound<&'a [u8]>, Bound<&'a [u8]>) {
    let end = match end {
        Some(end) => Bound::Excluded(end.as_ref()),
        None => Bound::Unbounded,
    };
    (Bound::Included(start.as_ref()), end)
}

/// In-memory ordered store, optionally backed by a commit log.
///
/// Cloning is cheap and every clone shares the same data and identity.
///
/// # Examples
///
/// ```rust
/// use geottn::storage::{KvStore, MemoryStore, ScanOptions, Transaction};
///
/// let store = MemoryStore::new();
/// let mut txn = store.new_transaction(true);
/// txn.set(b"a1", b"x").unwrap();
/// txn.set(b"a2", b"y").unwrap();
/// txn.commit().unwrap();
///
/// let keys = store
///     .view(|txn| txn.scan(&ScanOptions::prefix("a").keys_only()))
///     .unwrap();
/// assert_eq!(keys.len(), 2);
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    id: Uuid,
    inner: Arc<RwLock<StoreInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            inner: Arc::new(RwLock::new(StoreInner::new())),
        }
    }

    /// Open a store persisted in the commit log at `path`, replaying it first.
    #[cfg(feature = "aof")]
    pub fn open<P: AsRef<Path>>(path: P, policy: SyncPolicy, mode: SyncMode) -> Result<Self> {
        let mut file = CommitLog::open(path)?;
        let batches = file.replay()?;

        let mut inner = StoreInner::new();
        for batch in &batches {
            let ts = inner.last_commit + 1;
            inner.apply(batch, ts);
        }
        log::debug!(
            "Replayed {} commits from {} ({} live keys)",
            batches.len(),
            file.path().display(),
            inner.data.len()
        );
        inner.log = Some(DurableLog { file, policy, mode });

        Ok(Self {
            id: Uuid::new_v4(),
            inner: Arc::new(RwLock::new(inner)),
        })
    }

    /// Flush the commit log and refuse further transactions.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Ok(());
        }
        #[cfg(feature = "aof")]
        if let Some(log) = inner.log.as_mut() {
            log.file.sync_with_mode(log.mode)?;
        }
        inner.closed = true;
        Ok(())
    }

    /// Force the commit log to disk regardless of the sync policy.
    pub fn sync(&self) -> Result<()> {
        #[cfg(feature = "aof")]
        {
            let mut inner = self.inner.write();
            if let Some(log) = inner.log.as_mut() {
                log.file.sync_with_mode(log.mode)?;
            }
        }
        Ok(())
    }

    /// Prune every version no open transaction can observe.
    /// Returns the number of keys removed entirely.
    pub fn compact(&self) -> usize {
        self.inner.write().compact()
    }

    pub fn stats(&self) -> StorageStats {
        let inner = self.inner.read();
        let key_count = inner
            .data
            .values()
            .filter(|versions| visible(versions, inner.last_commit).is_some())
            .count();
        StorageStats {
            key_count,
            commits: inner.commits,
            conflicts: inner.conflicts,
            open_transactions: inner.active.values().sum(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryStore {
    type Txn = MemoryTransaction;

    fn id(&self) -> Uuid {
        self.id
    }

    fn new_transaction(&self, writable: bool) -> MemoryTransaction {
        let read_ts = self.inner.write().register();
        MemoryTransaction {
            store_id: self.id,
            inner: Arc::clone(&self.inner),
            read_ts,
            writable,
            pending: BTreeMap::new(),
            reads: FxHashSet::default(),
            ranges: Vec::new(),
            finished: false,
        }
    }
}

/// Transaction over a [`MemoryStore`].
pub struct MemoryTransaction {
    store_id: Uuid,
    inner: Arc<RwLock<StoreInner>>,
    read_ts: u64,
    writable: bool,
    pending: BTreeMap<Bytes, Option<Bytes>>,
    reads: FxHashSet<Bytes>,
    ranges: Vec<(Bytes, Option<Bytes>)>,
    finished: bool,
}

impl MemoryTransaction {
    fn check_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(StoreError::ReadOnly)
        }
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.inner.write().release(self.read_ts);
        }
    }

    fn pending_ops(&mut self) -> Vec<StorageOp> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => StorageOp::Put { key, value },
                None => StorageOp::Delete { key },
            })
            .collect()
    }

    fn try_commit(&mut self) -> Result<()> {
        let shared = Arc::clone(&self.inner);
        let mut inner = shared.write();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        if self.pending.is_empty() {
            return Ok(());
        }

        let conflicted = self
            .reads
            .iter()
            .any(|key| inner.changed_since(key, self.read_ts))
            || self
                .ranges
                .iter()
                .any(|(start, end)| inner.range_changed_since(start, end, self.read_ts));
        if conflicted {
            inner.conflicts += 1;
            return Err(StoreError::Conflict);
        }

        let ops = self.pending_ops();

        #[cfg(feature = "aof")]
        if let Some(log) = inner.log.as_mut() {
            log.file.append(&ops)?;
            log.file.sync_for_policy(log.policy, log.mode)?;
        }

        // our own snapshot must not hold back pruning of what we just wrote
        inner.release(self.read_ts);
        self.finished = true;

        let ts = inner.last_commit + 1;
        inner.apply(&ops, ts);
        inner.commits += 1;
        Ok(())
    }
}

impl Transaction for MemoryTransaction {
    fn store_id(&self) -> Uuid {
        self.store_id
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn get(&mut self, key: &[u8]) -> Result<Option<Bytes>> {
        if let Some(value) = self.pending.get(key) {
            return Ok(value.clone());
        }

        let inner = self.inner.read();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        let value = inner
            .data
            .get(key)
            .and_then(|versions| visible(versions, self.read_ts))
            .cloned();
        drop(inner);

        if self.writable {
            self.reads.insert(Bytes::copy_from_slice(key));
        }
        Ok(value)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_writable()?;
        self.pending.insert(
            Bytes::copy_from_slice(key),
            Some(Bytes::copy_from_slice(value)),
        );
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.check_writable()?;
        self.pending.insert(Bytes::copy_from_slice(key), None);
        Ok(())
    }

    fn scan(&mut self, opts: &ScanOptions) -> Result<Vec<KvEntry>> {
        if opts.is_empty_range() || opts.limit == Some(0) {
            return Ok(Vec::new());
        }

        let inner = self.inner.read();
        if inner.closed {
            return Err(StoreError::Closed);
        }

        let read_ts = self.read_ts;
        let range = bounds(&opts.start, &opts.end);
        let mut committed = inner
            .data
            .range::<[u8], _>(range)
            .filter_map(|(key, versions)| visible(versions, read_ts).map(|value| (key, value)))
            .peekable();
        let mut pending = self.pending.range::<[u8], _>(range).peekable();

        let limit = opts.limit.unwrap_or(usize::MAX);
        let mut out = Vec::new();
        while out.len() < limit {
            let order = match (committed.peek(), pending.peek()) {
                (None, None) => break,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some((ck, _)), Some((pk, _))) => ck.cmp(pk),
            };

            let entry = match order {
                Ordering::Less => committed.next().map(|(key, value)| (key, Some(value))),
                Ordering::Greater => pending.next().map(|(key, value)| (key, value.as_ref())),
                Ordering::Equal => {
                    committed.next();
                    pending.next().map(|(key, value)| (key, value.as_ref()))
                }
            };

            // pending deletions hide the committed entry
            let Some((key, Some(value))) = entry else {
                continue;
            };
            out.push(KvEntry {
                key: key.clone(),
                value: opts.prefetch_values.then(|| value.clone()),
            });
        }
        drop(committed);
        drop(inner);

        if self.writable {
            self.ranges.push((opts.start.clone(), opts.end.clone()));
        }
        Ok(out)
    }

    fn commit(mut self) -> Result<()> {
        let result = self.try_commit();
        self.finish();
        result
    }

    fn discard(mut self) {
        self.finish();
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.finish();
    }
}
