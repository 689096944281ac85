//! Values returned by the indexer.
use bytes::Bytes;
use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// One geotagged reading of a device.
///
/// `lat`/`lng` come back from the stored cell, so they match the input only
/// to leaf-cell resolution (well under 0.0001°).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub key: String,
    pub value: Bytes,
    pub lat: f64,
    pub lng: f64,
    pub time: SystemTime,
}

impl DataPoint {
    /// Position as a `geo` point (`x` = longitude, `y` = latitude).
    pub fn point(&self) -> Point {
        Point::new(self.lng, self.lat)
    }

    /// Haversine distance in meters to `(lat, lng)`.
    pub fn distance_to(&self, lat: f64, lng: f64) -> f64 {
        Haversine.distance(self.point(), Point::new(lng, lat))
    }
}

/// Sort search results by distance to `(lat, lng)`, nearest first.
///
/// Searches return points in cell scan order; use this when ranking matters.
pub fn rank_by_distance(points: Vec<DataPoint>, lat: f64, lng: f64) -> Vec<(DataPoint, f64)> {
    let mut ranked: Vec<(DataPoint, f64)> = points
        .into_iter()
        .map(|dp| {
            let dist = dp.distance_to(lat, lng);
            (dp, dist)
        })
        .collect();

    ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dp(key: &str, lat: f64, lng: f64) -> DataPoint {
        DataPoint {
            key: key.to_string(),
            value: Bytes::from_static(b"v"),
            lat,
            lng,
            time: SystemTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_distance_to() {
        let paris = dp("paris", 48.8566, 2.3522);
        let london = (51.5074, -0.1278);
        let dist = paris.distance_to(london.0, london.1);
        assert!(dist > 340_000.0 && dist < 350_000.0);
        assert!(paris.distance_to(48.8566, 2.3522) < 1e-6);
    }

    #[test]
    fn test_rank_by_distance() {
        let points = vec![dp("far", 44.8, 2.2), dp("near", 48.81, 2.2), dp("here", 48.8, 2.2)];
        let ranked = rank_by_distance(points, 48.8, 2.2);
        let order: Vec<&str> = ranked.iter().map(|(dp, _)| dp.key.as_str()).collect();
        assert_eq!(order, vec!["here", "near", "far"]);
        assert!(ranked[0].1 <= ranked[1].1 && ranked[1].1 <= ranked[2].1);
    }
}
