//! Leaf-level S2 cell identifiers as stored in index keys.
//!
//! A [`CellId`] is the 64-bit Hilbert-curve position of a leaf cell. Every
//! ancestor cell owns the contiguous interval `[range_min, range_max]` of its
//! descendants, so a spatial lookup over an ancestor is a single byte-range
//! scan once the id is written big-endian.

use s2::cellid::CellID;
use s2::latlng::LatLng;

/// A hierarchical spherical cell identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CellId(pub u64);

impl CellId {
    /// Leaf cell containing the given position.
    pub fn from_degrees(lat: f64, lng: f64) -> Self {
        let ll = LatLng::from_degrees(lat, lng);
        CellId(CellID::from(&ll).0)
    }

    /// Center of the cell in degrees, as `(lat, lng)`.
    ///
    /// For a leaf cell this is within a few centimetres of any point that
    /// was encoded into it, never bit-exact.
    pub fn to_degrees(self) -> (f64, f64) {
        let ll = LatLng::from(&CellID(self.0));
        (ll.lat.deg(), ll.lng.deg())
    }

    pub fn level(self) -> u64 {
        CellID(self.0).level()
    }

    /// Inclusive interval of leaf ids descending from this cell.
    pub fn range(self) -> CellRange {
        let id = CellID(self.0);
        CellRange {
            min: CellId(id.range_min().0),
            max: CellId(id.range_max().0),
        }
    }

    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        CellId(u64::from_be_bytes(bytes))
    }

    pub(crate) fn s2(self) -> CellID {
        CellID(self.0)
    }
}

impl From<CellID> for CellId {
    fn from(id: CellID) -> Self {
        CellId(id.0)
    }
}

/// Inclusive range of leaf cell ids covered by one covering cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub min: CellId,
    pub max: CellId,
}

impl CellRange {
    pub fn contains(&self, cell: CellId) -> bool {
        self.min <= cell && cell <= self.max
    }
}
