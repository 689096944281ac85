//! The geospatial telemetry index.
//!
//! [`GeoIndexer`] maintains three families of keys over any [`KvStore`]
//! (see [`crate::keys`] for the layouts):
//!
//! - one history entry per `(device, time, cell)`, scanned newest first
//! - one geo entry per device, at its latest known position
//! - one listing entry per device, written on its first store
//!
//! Every logical operation runs in its own transaction or snapshot, so reads
//! never observe a half-applied store.

use crate::cell::CellId;
use crate::config::Config;
use crate::cover::{CellCoverer, S2Coverer, SearchRegion};
use crate::error::{GeoError, Result};
use crate::keys::{HistoryKey, KeyCodec};
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::storage::{KvEntry, KvStore, MemoryStore, ScanOptions, Transaction, prefix_successor};
use crate::types::DataPoint;
use bytes::{BufMut, Bytes, BytesMut};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use std::time::SystemTime;

/// Geospatial index of device positions over time.
///
/// # Examples
///
/// ```rust
/// use geottn::GeoIndexer;
/// use std::time::{Duration, SystemTime};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let indexer = GeoIndexer::memory()?;
/// let now = SystemTime::now();
///
/// indexer.store("truck-1", b"parked", 48.8566, 2.3522, now)?;
/// indexer.store("truck-1", b"moving", 48.8600, 2.3400, now + Duration::from_secs(60))?;
///
/// let last = indexer.get("truck-1")?.unwrap();
/// assert_eq!(last.value.as_ref(), b"moving");
///
/// let nearby = indexer.radius_search(48.8566, 2.3522, 5_000.0)?;
/// assert_eq!(nearby.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct GeoIndexer<S = MemoryStore, C = S2Coverer> {
    store: S,
    coverer: C,
    codec: KeyCodec,
    max_cells: usize,
    metrics: Arc<dyn MetricsSink>,
}

impl GeoIndexer<MemoryStore, S2Coverer> {
    /// In-memory index with the default configuration.
    pub fn memory() -> Result<Self> {
        Self::new(MemoryStore::new(), &Config::default())
    }
}

impl<S: KvStore> GeoIndexer<S, S2Coverer> {
    /// Index over `store` using S2 coverings bounded by the configured levels.
    pub fn new(store: S, config: &Config) -> Result<Self> {
        config.validate().map_err(GeoError::Config)?;
        Self::with_coverer(store, S2Coverer::with_config(config), config)
    }
}

impl<S: KvStore, C: CellCoverer> GeoIndexer<S, C> {
    /// Index over `store` using a custom covering strategy.
    pub fn with_coverer(store: S, coverer: C, config: &Config) -> Result<Self> {
        config.validate().map_err(GeoError::Config)?;
        Ok(Self {
            store,
            coverer,
            codec: KeyCodec::new(config.prefix.as_bytes()),
            max_cells: config.max_cells,
            metrics: Arc::new(NoopMetrics),
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The underlying store.
    pub fn kv_store(&self) -> &S {
        &self.store
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsSink> {
        &self.metrics
    }

    /// Open a writable transaction for batching several
    /// [`store_tx`](Self::store_tx) calls into one commit.
    pub fn begin(&self) -> S::Txn {
        self.store.new_transaction(true)
    }

    /// Record that device `key` reported `value` at `(lat, lng)` at `time`.
    ///
    /// Storing the exact same `(key, time, position)` again is a no-op. The
    /// device's previous geo entry is replaced, its history keeps growing.
    /// A point older than the device's newest one is added to the history
    /// only, so searches keep returning the newest position by time.
    ///
    /// Concurrent stores for the same device conflict and one of them fails
    /// with [`StoreError::Conflict`](crate::StoreError::Conflict). So do stores
    /// for devices where one key is the other followed by `#` (`a` and `a#b`),
    /// since the history scan of `a` covers the keys of `a#b`.
    pub fn store(
        &self,
        key: &str,
        value: &[u8],
        lat: f64,
        lng: f64,
        time: SystemTime,
    ) -> Result<()> {
        let result = validate_point(key, lat, lng).and_then(|_| {
            self.store.update(|txn| self.write_point(txn, key, value, lat, lng, time))
        });

        match self.observe(result)? {
            true => {
                self.metrics.inc_stored();
                log::debug!("Stored {} at ({}, {})", key, lat, lng);
            }
            false => log::debug!("Ignoring replayed point of {}", key),
        }
        Ok(())
    }

    /// Like [`store`](Self::store) but stages the writes in `tx`; nothing is
    /// visible until the caller commits it.
    ///
    /// `tx` must be writable and opened on this indexer's store, otherwise
    /// [`GeoError::InvalidTransaction`] is returned and `tx` is left untouched.
    pub fn store_tx(
        &self,
        tx: &mut S::Txn,
        key: &str,
        value: &[u8],
        lat: f64,
        lng: f64,
        time: SystemTime,
    ) -> Result<()> {
        let result = self
            .check_transaction(tx)
            .and_then(|_| validate_point(key, lat, lng))
            .and_then(|_| self.write_point(tx, key, value, lat, lng, time));

        if self.observe(result)? {
            self.metrics.inc_stored();
        }
        Ok(())
    }

    fn check_transaction(&self, tx: &S::Txn) -> Result<()> {
        if tx.store_id() != self.store.id() {
            return Err(GeoError::InvalidTransaction(
                "transaction belongs to another store",
            ));
        }
        if !tx.is_writable() {
            return Err(GeoError::InvalidTransaction("transaction is read-only"));
        }
        Ok(())
    }

    /// Returns false when the exact history entry already exists.
    fn write_point(
        &self,
        txn: &mut S::Txn,
        key: &str,
        value: &[u8],
        lat: f64,
        lng: f64,
        time: SystemTime,
    ) -> Result<bool> {
        let cell = CellId::from_degrees(lat, lng);
        let history_key = self.codec.history_key_for_cell(key, time, cell);

        let scan = ScanOptions::prefix(self.codec.history_prefix(key)).keys_only();
        let mut previous = Vec::new();
        for entry in txn.scan(&scan)? {
            if entry.key == history_key {
                return Ok(false);
            }
            let decoded = self.codec.decode_history_key(&entry.key)?;
            if decoded.device == key {
                previous.push(decoded);
            }
        }

        // A late report older than the device's latest position only extends
        // its history. Every other geo entry of the device is dropped, normally
        // just the previous live one.
        let is_latest = previous.first().is_none_or(|newest| newest.time <= time);
        let stale = if is_latest { &previous[..] } else { &previous[1..] };
        for old in stale {
            txn.delete(&self.codec.geo_key_for_cell(old.cell, old.time, key))?;
        }

        if is_latest {
            txn.set(&self.codec.geo_key_for_cell(cell, time, key), value)?;
        } else {
            log::debug!("Point of {} predates its latest position, history only", key);
        }
        txn.set(&history_key, value)?;
        if previous.is_empty() {
            txn.set(&self.codec.listing_key(key), &[])?;
        }
        Ok(true)
    }

    /// Up to `count` most recent points of `key`, newest first. `count == 0`
    /// returns the whole history.
    pub fn get_all(&self, key: &str, count: usize) -> Result<Vec<DataPoint>> {
        let start = self.codec.history_prefix(key);
        let end = prefix_successor(&start);
        let result = self
            .store
            .view(|txn| self.scan_history(txn, key, start, end, count));
        self.observe(result)
    }

    /// Latest point of `key`, `None` if the device never reported.
    pub fn get(&self, key: &str) -> Result<Option<DataPoint>> {
        Ok(self.get_all(key, 1)?.into_iter().next())
    }

    /// Points of `key` with `from <= time <= to`, newest first. Bounds given
    /// in the wrong order are swapped.
    pub fn history_between(
        &self,
        key: &str,
        from: SystemTime,
        to: SystemTime,
    ) -> Result<Vec<DataPoint>> {
        let (from, to) = if from <= to { (from, to) } else { (to, from) };
        let start = self.codec.history_time_bound(key, to);
        let end = prefix_successor(&self.codec.history_time_bound(key, from));
        let result = self
            .store
            .view(|txn| self.scan_history(txn, key, start, end, 0));
        self.observe(result)
    }

    /// Scan history keys in `[start, end)`, keeping only entries of `device`.
    ///
    /// The history prefix of device `a` also prefixes device `a#b`, so a
    /// limited scan may have to page past foreign entries.
    fn scan_history(
        &self,
        txn: &mut S::Txn,
        device: &str,
        mut start: Bytes,
        end: Option<Bytes>,
        count: usize,
    ) -> Result<Vec<DataPoint>> {
        let mut points = Vec::new();
        loop {
            let mut opts = ScanOptions::range(start, end.clone());
            if count > 0 {
                opts = opts.with_limit(count - points.len());
            }
            let entries = txn.scan(&opts)?;
            let exhausted = opts.limit.is_none_or(|limit| entries.len() < limit);

            let last = entries.last().map(|entry| entry.key.clone());
            for KvEntry { key, value } in entries {
                let decoded = self.codec.decode_history_key(&key)?;
                if decoded.device == device {
                    points.push(history_point(decoded, value.unwrap_or_default()));
                }
            }

            match last {
                Some(last) if !exhausted && points.len() < count => start = key_after(&last),
                _ => return Ok(points),
            }
        }
    }

    /// Every device that ever stored a point, in key order.
    pub fn keys(&self) -> Result<Vec<String>> {
        let scan = ScanOptions::prefix(self.codec.listing_prefix()).keys_only();
        let result = self.store.view(|txn| {
            txn.scan(&scan)?
                .iter()
                .map(|entry| self.codec.decode_listing_key(&entry.key))
                .collect::<Result<Vec<_>>>()
        });
        self.observe(result)
    }

    /// Latest points of all devices within `radius_meters` of `(lat, lng)`.
    ///
    /// Results come in cell order, not by distance; see
    /// [`rank_by_distance`](crate::rank_by_distance).
    pub fn radius_search(&self, lat: f64, lng: f64, radius_meters: f64) -> Result<Vec<DataPoint>> {
        let region = SearchRegion::Cap {
            lat,
            lng,
            radius_meters,
        };
        let result = validate_region(&region).and_then(|_| self.search(&region));
        self.observe(result)
    }

    /// Latest points of all devices inside the rectangle spanned by its
    /// upper-right and bottom-left corners.
    pub fn rect_search(
        &self,
        ur_lat: f64,
        ur_lng: f64,
        bl_lat: f64,
        bl_lng: f64,
    ) -> Result<Vec<DataPoint>> {
        let region = SearchRegion::Rect {
            ur_lat,
            ur_lng,
            bl_lat,
            bl_lng,
        };
        let result = validate_region(&region).and_then(|_| self.search(&region));
        self.observe(result)
    }

    fn search(&self, region: &SearchRegion) -> Result<Vec<DataPoint>> {
        let region = self.coverer.prepare(region);
        let ranges = self.coverer.cover(&region, self.max_cells);
        log::trace!("Searching {} cell ranges", ranges.len());

        self.store.view(|txn| {
            let mut seen = FxHashSet::default();
            let mut points = Vec::new();
            for range in ranges {
                let (start, end) = self.codec.geo_range(range);
                for KvEntry { key, value } in txn.scan(&ScanOptions::range(start, end))? {
                    let decoded = self.codec.decode_geo_key(&key)?;
                    if !self.coverer.contains(&region, decoded.cell) || !seen.insert(key) {
                        continue;
                    }
                    let (lat, lng) = decoded.cell.to_degrees();
                    points.push(DataPoint {
                        key: decoded.device,
                        value: value.unwrap_or_default(),
                        lat,
                        lng,
                        time: decoded.time,
                    });
                }
            }
            Ok(points)
        })
    }

    fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.metrics.inc_error();
            if e.is_conflict() {
                log::debug!("Indexer transaction conflict: {}", e);
            } else {
                log::warn!("Indexer operation failed: {}", e);
            }
        }
        result
    }
}

fn history_point(key: HistoryKey, value: Bytes) -> DataPoint {
    let (lat, lng) = key.lat_lng();
    DataPoint {
        key: key.device,
        value,
        lat,
        lng,
        time: key.time,
    }
}

/// Smallest key sorting after `key`.
fn key_after(key: &[u8]) -> Bytes {
    let mut next = BytesMut::with_capacity(key.len() + 1);
    next.put_slice(key);
    next.put_u8(0);
    next.freeze()
}

fn validate_point(key: &str, lat: f64, lng: f64) -> Result<()> {
    if key.is_empty() {
        return Err(GeoError::InvalidKey("device key must not be empty".into()));
    }
    if !lat.is_finite() || !lng.is_finite() || lat.abs() > 90.0 || lng.abs() > 180.0 {
        return Err(GeoError::InvalidCoordinates { lat, lng });
    }
    Ok(())
}

fn validate_region(region: &SearchRegion) -> Result<()> {
    match *region {
        SearchRegion::Cap {
            lat,
            lng,
            radius_meters,
        } => {
            if !lat.is_finite() || !lng.is_finite() {
                return Err(GeoError::InvalidQuery(format!(
                    "center ({}, {}) is not finite",
                    lat, lng
                )));
            }
            if !radius_meters.is_finite() || radius_meters < 0.0 {
                return Err(GeoError::InvalidQuery(format!(
                    "radius {} must be a finite, non-negative distance",
                    radius_meters
                )));
            }
        }
        SearchRegion::Rect {
            ur_lat,
            ur_lng,
            bl_lat,
            bl_lng,
        } => {
            if [ur_lat, ur_lng, bl_lat, bl_lng].iter().any(|c| !c.is_finite()) {
                return Err(GeoError::InvalidQuery(
                    "rectangle corners must be finite".into(),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::GEO_TAG;
    use crate::metrics::CounterMetrics;
    use std::time::Duration;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
    }

    fn geo_entries(indexer: &GeoIndexer) -> Vec<Bytes> {
        let mut prefix = indexer.codec().prefix().to_vec();
        prefix.push(GEO_TAG);
        indexer
            .kv_store()
            .view(|txn| txn.scan(&ScanOptions::prefix(&prefix).keys_only()))
            .unwrap()
            .into_iter()
            .map(|entry| entry.key)
            .collect()
    }

    #[test]
    fn test_store_then_get() {
        let indexer = GeoIndexer::memory().unwrap();
        indexer
            .store("truck", b"hello", 48.8566, 2.3522, at(0))
            .unwrap();

        let point = indexer.get("truck").unwrap().unwrap();
        assert_eq!(point.key, "truck");
        assert_eq!(point.value.as_ref(), b"hello");
        assert_eq!(point.time, at(0));
        assert!((point.lat - 48.8566).abs() < 1e-4);
        assert!((point.lng - 2.3522).abs() < 1e-4);
    }

    #[test]
    fn test_replay_is_noop() {
        let indexer = GeoIndexer::memory().unwrap();
        for _ in 0..3 {
            indexer.store("truck", b"v", 48.85, 2.35, at(0)).unwrap();
        }
        assert_eq!(indexer.get_all("truck", 0).unwrap().len(), 1);
        assert_eq!(geo_entries(&indexer).len(), 1);
    }

    #[test]
    fn test_replaying_older_point_keeps_live_geo_entry() {
        let indexer = GeoIndexer::memory().unwrap();
        indexer.store("truck", b"old", 48.85, 2.35, at(0)).unwrap();
        indexer.store("truck", b"new", 48.86, 2.36, at(10)).unwrap();
        indexer.store("truck", b"old", 48.85, 2.35, at(0)).unwrap();

        let found = indexer.radius_search(48.86, 2.36, 200.0).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value.as_ref(), b"new");
    }

    #[test]
    fn test_only_latest_position_is_searchable() {
        let indexer = GeoIndexer::memory().unwrap();
        indexer.store("truck", b"a", 48.85, 2.35, at(0)).unwrap();
        indexer.store("truck", b"b", 45.76, 4.83, at(5)).unwrap();

        assert!(indexer.radius_search(48.85, 2.35, 1_000.0).unwrap().is_empty());
        let lyon = indexer.radius_search(45.76, 4.83, 1_000.0).unwrap();
        assert_eq!(lyon.len(), 1);
        assert_eq!(lyon[0].value.as_ref(), b"b");
        assert_eq!(geo_entries(&indexer).len(), 1);
    }

    #[test]
    fn test_store_removes_every_stale_geo_entry() {
        let indexer = GeoIndexer::memory().unwrap();
        indexer.store("a", b"t0", 10.0, 10.0, at(0)).unwrap();

        // a second live geo entry left behind by a writer bypassing `store`
        let codec = indexer.codec().clone();
        let mut txn = indexer.kv_store().new_transaction(true);
        txn.set(&codec.history_key("a", at(1), 11.0, 11.0), b"t1").unwrap();
        txn.set(&codec.geo_key(11.0, 11.0, at(1), "a"), b"t1").unwrap();
        txn.commit().unwrap();
        assert_eq!(geo_entries(&indexer).len(), 2);

        indexer.store("a", b"t2", 12.0, 12.0, at(2)).unwrap();

        let live = geo_entries(&indexer);
        assert_eq!(live, vec![codec.geo_key(12.0, 12.0, at(2), "a")]);
        assert!(indexer.radius_search(10.0, 10.0, 1_000.0).unwrap().is_empty());
        assert!(indexer.radius_search(11.0, 11.0, 1_000.0).unwrap().is_empty());
        assert_eq!(indexer.get_all("a", 0).unwrap().len(), 3);
    }

    #[test]
    fn test_prefix_sharing_devices_conflict() {
        let indexer = GeoIndexer::memory().unwrap();
        let mut first = indexer.begin();
        let mut second = indexer.begin();
        indexer.store_tx(&mut first, "a#b", b"", 1.0, 1.0, at(0)).unwrap();
        indexer.store_tx(&mut second, "a", b"", 2.0, 2.0, at(0)).unwrap();

        first.commit().unwrap();
        assert!(matches!(
            second.commit(),
            Err(crate::error::StoreError::Conflict)
        ));

        indexer.store("a", b"", 2.0, 2.0, at(0)).unwrap();
        assert_eq!(indexer.keys().unwrap(), vec!["a", "a#b"]);
    }

    #[test]
    fn test_late_point_goes_to_history_only() {
        let indexer = GeoIndexer::memory().unwrap();
        indexer.store("truck", b"new", 45.76, 4.83, at(10)).unwrap();
        indexer.store("truck", b"late", 48.85, 2.35, at(0)).unwrap();

        assert!(indexer.radius_search(48.85, 2.35, 1_000.0).unwrap().is_empty());
        let live = indexer.radius_search(45.76, 4.83, 1_000.0).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].time, at(10));

        let history = indexer.get_all("truck", 0).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].value.as_ref(), b"new");
        assert_eq!(history[1].value.as_ref(), b"late");
        assert_eq!(geo_entries(&indexer).len(), 1);
    }

    #[test]
    fn test_get_all_newest_first_with_count() {
        let indexer = GeoIndexer::memory().unwrap();
        for i in 0..5u64 {
            indexer
                .store("truck", format!("v{}", i).as_bytes(), 48.85, 2.35, at(i))
                .unwrap();
        }

        let all = indexer.get_all("truck", 0).unwrap();
        let times: Vec<_> = all.iter().map(|p| p.time).collect();
        assert_eq!(times, vec![at(4), at(3), at(2), at(1), at(0)]);

        let two = indexer.get_all("truck", 2).unwrap();
        assert_eq!(two.len(), 2);
        assert_eq!(two[0].value.as_ref(), b"v4");
        assert_eq!(two[1].value.as_ref(), b"v3");
    }

    #[test]
    fn test_unknown_key() {
        let indexer = GeoIndexer::memory().unwrap();
        assert!(indexer.get("ghost").unwrap().is_none());
        assert!(indexer.get_all("ghost", 0).unwrap().is_empty());
    }

    #[test]
    fn test_devices_sharing_a_prefix_stay_apart() {
        let indexer = GeoIndexer::memory().unwrap();
        indexer.store("a#b", b"other", 10.0, 10.0, at(0)).unwrap();
        indexer.store("a#b", b"other", 10.0, 10.0, at(1)).unwrap();
        indexer.store("a", b"mine", 20.0, 20.0, at(0)).unwrap();

        let mine = indexer.get_all("a", 1).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].key, "a");
        assert_eq!(indexer.get_all("a", 0).unwrap().len(), 1);
        assert_eq!(indexer.get_all("a#b", 0).unwrap().len(), 2);

        // storing "a" again must not drop the geo entry of "a#b"
        indexer.store("a", b"mine", 21.0, 21.0, at(2)).unwrap();
        assert_eq!(indexer.radius_search(10.0, 10.0, 100.0).unwrap().len(), 1);
        assert_eq!(indexer.keys().unwrap(), vec!["a", "a#b"]);
    }

    #[test]
    fn test_history_between() {
        let indexer = GeoIndexer::memory().unwrap();
        for i in 0..6u64 {
            indexer.store("truck", b"v", 48.85, 2.35, at(i * 10)).unwrap();
        }

        let window = indexer.history_between("truck", at(10), at(30)).unwrap();
        let times: Vec<_> = window.iter().map(|p| p.time).collect();
        assert_eq!(times, vec![at(30), at(20), at(10)]);

        let swapped = indexer.history_between("truck", at(30), at(10)).unwrap();
        assert_eq!(swapped, window);

        let everything = indexer
            .history_between("truck", crate::keys::min_geo_time(), crate::keys::max_geo_time())
            .unwrap();
        assert_eq!(everything.len(), 6);
    }

    #[test]
    fn test_keys_lists_each_device_once() {
        let indexer = GeoIndexer::memory().unwrap();
        indexer.store("b", b"", 1.0, 1.0, at(0)).unwrap();
        indexer.store("a", b"", 1.0, 1.0, at(0)).unwrap();
        indexer.store("a", b"", 2.0, 2.0, at(1)).unwrap();
        assert_eq!(indexer.keys().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_rejects_invalid_input() {
        let metrics = Arc::new(CounterMetrics::new());
        let indexer = GeoIndexer::memory().unwrap().with_metrics(metrics.clone());

        assert!(matches!(
            indexer.store("", b"", 0.0, 0.0, at(0)),
            Err(GeoError::InvalidKey(_))
        ));
        assert!(matches!(
            indexer.store("k", b"", f64::NAN, 0.0, at(0)),
            Err(GeoError::InvalidCoordinates { .. })
        ));
        assert!(matches!(
            indexer.store("k", b"", 91.0, 0.0, at(0)),
            Err(GeoError::InvalidCoordinates { .. })
        ));
        assert!(matches!(
            indexer.radius_search(0.0, 0.0, -1.0),
            Err(GeoError::InvalidQuery(_))
        ));
        assert!(matches!(
            indexer.rect_search(1.0, f64::INFINITY, 0.0, 0.0),
            Err(GeoError::InvalidQuery(_))
        ));

        assert_eq!(metrics.snapshot().errors, 5);
        assert_eq!(metrics.snapshot().stored, 0);
        assert!(indexer.keys().unwrap().is_empty());
    }

    #[test]
    fn test_store_tx_checks_transaction() {
        let indexer = GeoIndexer::memory().unwrap();
        let other = MemoryStore::new();

        let mut foreign = other.new_transaction(true);
        assert!(matches!(
            indexer.store_tx(&mut foreign, "k", b"", 1.0, 1.0, at(0)),
            Err(GeoError::InvalidTransaction(_))
        ));

        let mut read_only = indexer.kv_store().new_transaction(false);
        assert!(matches!(
            indexer.store_tx(&mut read_only, "k", b"", 1.0, 1.0, at(0)),
            Err(GeoError::InvalidTransaction(_))
        ));
    }

    #[test]
    fn test_store_tx_visible_after_commit() {
        let indexer = GeoIndexer::memory().unwrap();
        let mut tx = indexer.begin();
        indexer.store_tx(&mut tx, "k1", b"1", 1.0, 1.0, at(0)).unwrap();
        indexer.store_tx(&mut tx, "k2", b"2", 1.0, 1.0, at(0)).unwrap();
        indexer.store_tx(&mut tx, "k1", b"3", 1.5, 1.5, at(1)).unwrap();

        assert!(indexer.get("k1").unwrap().is_none());
        tx.commit().unwrap();

        assert_eq!(indexer.get("k1").unwrap().unwrap().value.as_ref(), b"3");
        assert_eq!(indexer.get_all("k1", 0).unwrap().len(), 2);
        assert_eq!(indexer.keys().unwrap(), vec!["k1", "k2"]);
        assert_eq!(geo_entries(&indexer).len(), 2);
    }

    #[test]
    fn test_custom_prefix_isolates_indexes() {
        let store = MemoryStore::new();
        let fleet = GeoIndexer::new(store.clone(), &Config::default().with_prefix("FLEET")).unwrap();
        let boats = GeoIndexer::new(store, &Config::default().with_prefix("BOATS")).unwrap();

        fleet.store("x", b"car", 1.0, 1.0, at(0)).unwrap();
        assert!(boats.get("x").unwrap().is_none());
        assert!(boats.radius_search(1.0, 1.0, 1_000.0).unwrap().is_empty());
        assert_eq!(fleet.keys().unwrap(), vec!["x"]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.max_cells = 0;
        assert!(matches!(
            GeoIndexer::new(MemoryStore::new(), &config),
            Err(GeoError::Config(_))
        ));
    }
}
