use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::gpx_types::TrackPoint;

/// Mean Earth radius used by the equirectangular approximation.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Latitude within [-90, 90] and longitude within [-180, 180].
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Distance in meters between two coordinates.
///
/// Equirectangular flat-Earth approximation: good enough to detect movement
/// between consecutive fixes, wrong for long distances and near the antimeridian.
pub fn great_circle_distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let x = dlon * ((lat1 + lat2) / 2.0).cos();
    let y = lat2 - lat1;
    (x * x + y * y).sqrt() * EARTH_RADIUS_M
}

/// Whether `curr` moved far enough, or late enough, after `prev` to be worth logging.
///
/// When either timestamp is missing only the distance criterion applies.
pub fn is_significant(
    prev: &TrackPoint,
    curr: &TrackPoint,
    time_threshold_secs: f64,
    dist_threshold_m: f64,
) -> bool {
    let elapsed = match (prev.timestamp, curr.timestamp) {
        (Some(t0), Some(t1)) => (t1 - t0).num_milliseconds() as f64 / 1000.0,
        _ => 0.0,
    };
    elapsed > time_threshold_secs
        || great_circle_distance(prev.location, curr.location) > dist_threshold_m
}

/// Classifies a stream of fixes into major and minor points.
///
/// Each fix is compared against the fix before it, major or minor. That point
/// survives tracking start/stop, so thresholds keep their meaning across pauses.
#[derive(Debug, Clone)]
pub struct SignificanceFilter {
    time_threshold_secs: f64,
    dist_threshold_m: f64,
    last_point: Option<TrackPoint>,
}

impl Default for SignificanceFilter {
    fn default() -> Self {
        Self::from_config(&TrackerConfig::default())
    }
}

impl SignificanceFilter {
    pub fn new(time_threshold_secs: f64, dist_threshold_m: f64) -> Self {
        Self {
            time_threshold_secs,
            dist_threshold_m,
            last_point: None,
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(config.time_threshold_secs, config.dist_threshold_meters)
    }

    /// Returns `true` when `point` is major. The first fix is always major.
    pub fn classify(&mut self, point: &TrackPoint) -> bool {
        let major = match &self.last_point {
            None => true,
            Some(prev) => is_significant(
                prev,
                point,
                self.time_threshold_secs,
                self.dist_threshold_m,
            ),
        };
        self.last_point = Some(point.clone());
        major
    }

    /// Most recent fix, major or minor.
    pub fn current_location(&self) -> Option<&TrackPoint> {
        self.last_point.as_ref()
    }
}
