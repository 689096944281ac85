//! Region covering over the S2 cell hierarchy.
//!
//! A search turns its region into a handful of cell ranges (the covering),
//! scans each range, and then applies the exact containment test because a
//! covering always over-approximates the region.

use crate::cell::{CellId, CellRange};
use crate::config::Config;
use s2::cap::Cap;
use s2::latlng::LatLng;
use s2::point::Point;
use s2::rect::Rect;
use s2::region::RegionCoverer;

/// Mean equatorial circumference of the Earth in meters.
pub const EARTH_CIRCUMFERENCE_METERS: f64 = 40_075_017.0;

/// Solid-angle area of a spherical cap with the given ground radius.
///
/// Uses the planar approximation `π·θ²`, accurate while the radius stays
/// small compared with the Earth's radius.
pub fn radial_area(radius_meters: f64) -> f64 {
    let angle = (radius_meters / EARTH_CIRCUMFERENCE_METERS) * std::f64::consts::PI * 2.0;
    std::f64::consts::PI * angle * angle
}

/// A region to search, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchRegion {
    /// Disc of `radius_meters` around a center point.
    Cap { lat: f64, lng: f64, radius_meters: f64 },
    /// Lat/lng rectangle given by its upper-right and bottom-left corners.
    Rect {
        ur_lat: f64,
        ur_lng: f64,
        bl_lat: f64,
        bl_lng: f64,
    },
}

/// Maps regions to cell ranges and decides exact point containment.
///
/// The indexer only depends on this trait, so another spherical-geometry
/// implementation can be swapped in as long as it uses the same leaf cells.
/// A search prepares its region once and reuses it for every candidate.
pub trait CellCoverer: Send + Sync {
    /// Region in the coverer's own geometry.
    type Region;

    fn prepare(&self, region: &SearchRegion) -> Self::Region;

    /// Ranges of leaf cells whose union covers `region`, using at most `max_cells` cells.
    fn cover(&self, region: &Self::Region, max_cells: usize) -> Vec<CellRange>;

    /// Whether the center of `cell` lies inside `region`.
    fn contains(&self, region: &Self::Region, cell: CellId) -> bool;
}

/// A [`SearchRegion`] converted to `s2` geometry.
pub enum S2Region {
    Cap(Cap),
    Rect(Rect),
}

impl S2Region {
    pub fn from_region(region: &SearchRegion) -> Self {
        match *region {
            SearchRegion::Cap {
                lat,
                lng,
                radius_meters,
            } => {
                let center = Point::from(&LatLng::from_degrees(lat, lng));
                S2Region::Cap(Cap::from_center_area(&center, radial_area(radius_meters)))
            }
            SearchRegion::Rect {
                ur_lat,
                ur_lng,
                bl_lat,
                bl_lng,
            } => {
                let bl = LatLng::from_degrees(bl_lat, bl_lng);
                let ur = LatLng::from_degrees(ur_lat, ur_lng);
                S2Region::Rect(Rect::from_point_pair(&bl, &ur))
            }
        }
    }
}

/// [`CellCoverer`] backed by the `s2` crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct S2Coverer {
    min_level: u8,
    max_level: u8,
}

impl S2Coverer {
    pub fn new(min_level: u8, max_level: u8) -> Self {
        Self {
            min_level,
            max_level,
        }
    }

    pub fn with_config(config: &Config) -> Self {
        Self::new(config.min_level, config.max_level)
    }

    fn coverer(&self, max_cells: usize) -> RegionCoverer {
        RegionCoverer {
            min_level: self.min_level,
            max_level: self.max_level,
            level_mod: 1,
            max_cells: max_cells.max(1),
        }
    }
}

impl Default for S2Coverer {
    fn default() -> Self {
        Self::with_config(&Config::default())
    }
}

impl CellCoverer for S2Coverer {
    type Region = S2Region;

    fn prepare(&self, region: &SearchRegion) -> S2Region {
        S2Region::from_region(region)
    }

    fn cover(&self, region: &S2Region, max_cells: usize) -> Vec<CellRange> {
        let coverer = self.coverer(max_cells);
        let union = match region {
            S2Region::Cap(cap) => coverer.covering(cap),
            S2Region::Rect(rect) => coverer.covering(rect),
        };

        union
            .0
            .iter()
            .map(|id| CellId::from(*id).range())
            .collect()
    }

    fn contains(&self, region: &S2Region, cell: CellId) -> bool {
        let point = Point::from(cell.s2());
        match region {
            S2Region::Cap(cap) => cap.contains_point(&point),
            S2Region::Rect(rect) => rect.contains_point(&point),
        }
    }
}
