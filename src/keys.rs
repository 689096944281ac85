//! Binary key layouts of the index.
//!
//! All keys live under a configurable namespace prefix followed by a role byte:
//!
//! ```text
//! history  prefix 'D' device '#' reverse_time(8B) cell(8B)
//! geo      prefix 'G' cell(8B) reverse_time(8B) device
//! listing  prefix 'L' device
//! ```
//!
//! Integers are big-endian so the store's byte order matches numeric order.
//! Time is stored reversed (`i64::MAX - unix_nanos`), which makes an ascending
//! scan of a device's history yield the newest entry first.
//!
//! This layout is the on-disk format. Changing it, the time reversal or the
//! cell level requires migrating stored data.

use crate::cell::{CellId, CellRange};
use crate::error::{GeoError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const HISTORY_TAG: u8 = b'D';
pub const GEO_TAG: u8 = b'G';
pub const LISTING_TAG: u8 = b'L';
pub const SEPARATOR: u8 = b'#';

const TIME_LEN: usize = 8;
const CELL_LEN: usize = 8;
/// Fixed trailing part of a history key and fixed head of a geo key body.
pub const SUFFIX_LEN: usize = TIME_LEN + CELL_LEN;

/// Latest instant representable in a key, for open-ended queries into the future.
pub fn max_geo_time() -> SystemTime {
    from_unix_nanos(i64::MAX)
}

/// The Unix epoch, for open-ended queries into the past.
pub fn min_geo_time() -> SystemTime {
    UNIX_EPOCH
}

/// Nanoseconds since the Unix epoch, negative before it. Saturates outside the `i64` range.
pub fn unix_nanos(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_nanos()).unwrap_or(i64::MAX),
        Err(before) => {
            let nanos = before.duration().as_nanos();
            i64::try_from(nanos).map(|n| -n).unwrap_or(i64::MIN)
        }
    }
}

pub fn from_unix_nanos(nanos: i64) -> SystemTime {
    if nanos >= 0 {
        UNIX_EPOCH + Duration::from_nanos(nanos as u64)
    } else {
        UNIX_EPOCH - Duration::from_nanos(nanos.unsigned_abs())
    }
}

/// `i64::MAX - nanos`, computed wide so pre-epoch instants keep sorting newest-first.
pub fn reverse_time(time: SystemTime) -> u64 {
    (i64::MAX as i128 - unix_nanos(time) as i128) as u64
}

pub fn time_from_reversed(reversed: u64) -> SystemTime {
    from_unix_nanos((i64::MAX as i128 - reversed as i128) as i64)
}

/// Decoded form of a history (`D`) key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryKey {
    pub device: String,
    pub time: SystemTime,
    pub cell: CellId,
}

impl HistoryKey {
    /// Position at cell resolution, as `(lat, lng)`.
    pub fn lat_lng(&self) -> (f64, f64) {
        self.cell.to_degrees()
    }
}

/// Decoded form of a geo (`G`) key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoKey {
    pub cell: CellId,
    pub time: SystemTime,
    pub device: String,
}

/// Encodes and decodes the index keys for one namespace prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    prefix: Bytes,
}

impl KeyCodec {
    pub fn new(prefix: impl AsRef<[u8]>) -> Self {
        Self {
            prefix: Bytes::copy_from_slice(prefix.as_ref()),
        }
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    fn role(&self, tag: u8, extra: usize) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.prefix.len() + 1 + extra);
        buf.put_slice(&self.prefix);
        buf.put_u8(tag);
        buf
    }

    fn head_len(&self) -> usize {
        self.prefix.len() + 1
    }

    fn check_role(&self, raw: &[u8], tag: u8, min_body: usize) -> Result<()> {
        let min = self.head_len() + min_body;
        if raw.len() < min {
            return Err(GeoError::MalformedKey(format!(
                "{} bytes, expected at least {}",
                raw.len(),
                min
            )));
        }
        if !raw.starts_with(&self.prefix) || raw[self.prefix.len()] != tag {
            return Err(GeoError::MalformedKey(format!(
                "not a '{}' key of this namespace",
                tag as char
            )));
        }
        Ok(())
    }

    /// `prefix 'D' device '#' reverse_time cell`
    pub fn history_key(&self, device: &str, time: SystemTime, lat: f64, lng: f64) -> Bytes {
        self.history_key_for_cell(device, time, CellId::from_degrees(lat, lng))
    }

    pub fn history_key_for_cell(&self, device: &str, time: SystemTime, cell: CellId) -> Bytes {
        let mut buf = self.role(HISTORY_TAG, device.len() + 1 + SUFFIX_LEN);
        buf.put_slice(device.as_bytes());
        buf.put_u8(SEPARATOR);
        buf.put_u64(reverse_time(time));
        buf.put_u64(cell.0);
        buf.freeze()
    }

    /// Every history key of `device` starts with this prefix, whatever its time and cell.
    pub fn history_prefix(&self, device: &str) -> Bytes {
        let mut buf = self.role(HISTORY_TAG, device.len() + 1);
        buf.put_slice(device.as_bytes());
        buf.put_u8(SEPARATOR);
        buf.freeze()
    }

    /// Smallest history key of `device` at `time`. Entries newer than `time` sort before it.
    pub fn history_time_bound(&self, device: &str, time: SystemTime) -> Bytes {
        let mut buf = self.role(HISTORY_TAG, device.len() + 1 + TIME_LEN);
        buf.put_slice(device.as_bytes());
        buf.put_u8(SEPARATOR);
        buf.put_u64(reverse_time(time));
        buf.freeze()
    }

    /// Decode a history key. The device part is everything between the role
    /// byte and the fixed suffix, so devices containing `#` decode correctly.
    pub fn decode_history_key(&self, raw: &[u8]) -> Result<HistoryKey> {
        self.check_role(raw, HISTORY_TAG, 1 + SUFFIX_LEN)?;

        let suffix_at = raw.len() - SUFFIX_LEN;
        if raw[suffix_at - 1] != SEPARATOR {
            return Err(GeoError::MalformedKey(
                "missing separator before history suffix".into(),
            ));
        }

        let device = std::str::from_utf8(&raw[self.head_len()..suffix_at - 1])
            .map_err(|e| GeoError::MalformedKey(format!("device key is not UTF-8: {}", e)))?;
        let (time, cell) = read_suffix(&raw[suffix_at..]);

        Ok(HistoryKey {
            device: device.to_string(),
            time: time_from_reversed(time),
            cell: CellId(cell),
        })
    }

    /// `prefix 'G' cell reverse_time device`
    pub fn geo_key(&self, lat: f64, lng: f64, time: SystemTime, device: &str) -> Bytes {
        self.geo_key_for_cell(CellId::from_degrees(lat, lng), time, device)
    }

    pub fn geo_key_for_cell(&self, cell: CellId, time: SystemTime, device: &str) -> Bytes {
        let mut buf = self.role(GEO_TAG, SUFFIX_LEN + device.len());
        buf.put_u64(cell.0);
        buf.put_u64(reverse_time(time));
        buf.put_slice(device.as_bytes());
        buf.freeze()
    }

    pub fn decode_geo_key(&self, raw: &[u8]) -> Result<GeoKey> {
        self.check_role(raw, GEO_TAG, SUFFIX_LEN)?;

        let body = &raw[self.head_len()..];
        let mut cell = [0u8; CELL_LEN];
        cell.copy_from_slice(&body[..CELL_LEN]);
        let mut time = [0u8; TIME_LEN];
        time.copy_from_slice(&body[CELL_LEN..SUFFIX_LEN]);

        let device = std::str::from_utf8(&body[SUFFIX_LEN..])
            .map_err(|e| GeoError::MalformedKey(format!("device key is not UTF-8: {}", e)))?;

        Ok(GeoKey {
            cell: CellId::from_be_bytes(cell),
            time: time_from_reversed(u64::from_be_bytes(time)),
            device: device.to_string(),
        })
    }

    /// Byte interval of geo keys whose cell falls in `range`, as `(start, exclusive end)`.
    /// The end is `None` when the range reaches the top of the id space.
    pub fn geo_range(&self, range: CellRange) -> (Bytes, Option<Bytes>) {
        let mut start = self.role(GEO_TAG, CELL_LEN);
        start.put_u64(range.min.0);

        let end = range.max.0.checked_add(1).map(|next| {
            let mut end = self.role(GEO_TAG, CELL_LEN);
            end.put_u64(next);
            end.freeze()
        });
        (start.freeze(), end)
    }

    /// `prefix 'L' device`
    pub fn listing_key(&self, device: &str) -> Bytes {
        let mut buf = self.role(LISTING_TAG, device.len());
        buf.put_slice(device.as_bytes());
        buf.freeze()
    }

    pub fn listing_prefix(&self) -> Bytes {
        self.role(LISTING_TAG, 0).freeze()
    }

    pub fn decode_listing_key(&self, raw: &[u8]) -> Result<String> {
        self.check_role(raw, LISTING_TAG, 0)?;
        let device = std::str::from_utf8(&raw[self.head_len()..])
            .map_err(|e| GeoError::MalformedKey(format!("device key is not UTF-8: {}", e)))?;
        Ok(device.to_string())
    }
}

fn read_suffix(suffix: &[u8]) -> (u64, u64) {
    let mut time = [0u8; TIME_LEN];
    time.copy_from_slice(&suffix[..TIME_LEN]);
    let mut cell = [0u8; CELL_LEN];
    cell.copy_from_slice(&suffix[TIME_LEN..SUFFIX_LEN]);
    (u64::from_be_bytes(time), u64::from_be_bytes(cell))
}
