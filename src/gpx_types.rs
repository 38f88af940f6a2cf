use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackLogError};
use crate::geo::Coordinate;

/// Document-unique identifier of a track, segment or waypoint.
pub type Id = u64;

/// A single logged position (used for trkpt and wpt).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub location: Coordinate,
    pub timestamp: Option<DateTime<Utc>>,
    /// Meters above sea level.
    pub elevation: Option<f64>,
    /// Meters per second.
    pub speed: Option<f64>,
    /// Degrees clockwise from true north.
    pub bearing: Option<f64>,
    pub name: Option<String>,
}

impl TrackPoint {
    pub fn new(location: Coordinate, timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            location,
            timestamp,
            elevation: None,
            speed: None,
            bearing: None,
            name: None,
        }
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_bearing(mut self, bearing: f64) -> Self {
        self.bearing = Some(bearing);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// One continuous recording interval (<trkseg>).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSegment {
    pub(crate) id: Id,
    pub(crate) points: Vec<TrackPoint>,
}

impl TrackSegment {
    pub(crate) fn new(id: Id) -> Self {
        Self {
            id,
            points: Vec::new(),
        }
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }
}

/// A GPX track (<trk>).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub(crate) id: Id,
    pub(crate) name: Option<String>,
    pub(crate) segments: Vec<TrackSegment>,
}

impl Track {
    pub(crate) fn new(id: Id) -> Self {
        Self {
            id,
            name: None,
            segments: Vec::new(),
        }
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn segments(&self) -> &[TrackSegment] {
        &self.segments
    }

    pub fn point_count(&self) -> usize {
        self.segments.iter().map(|s| s.points.len()).sum()
    }
}

/// A point of interest (<wpt>), independent of tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub(crate) id: Id,
    pub(crate) point: TrackPoint,
}

impl Waypoint {
    pub fn id(&self) -> Id {
        self.id
    }

    pub fn point(&self) -> &TrackPoint {
        &self.point
    }

    pub fn name(&self) -> Option<&str> {
        self.point.name.as_deref()
    }
}

/// The track/waypoint log: owns every track, segment and waypoint and hands out their ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpxDocument {
    tracks: Vec<Track>,
    waypoints: Vec<Waypoint>,
    next_id: Id,
}

impl Default for GpxDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl GpxDocument {
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            waypoints: Vec::new(),
            next_id: 1,
        }
    }

    /// A fresh id, greater than every id handed out or adopted before.
    pub fn new_id(&mut self) -> Id {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty() && self.waypoints.is_empty()
    }

    pub fn point_count(&self) -> usize {
        self.tracks.iter().map(Track::point_count).sum()
    }

    /// Opens a new segment on the last track, creating the track if there is none.
    ///
    /// Returns the ids of the track and the new segment.
    pub fn start_new_segment(&mut self) -> (Id, Id) {
        if self.tracks.is_empty() {
            let track = Track::new(self.new_id());
            self.tracks.push(track);
        }
        let segment_id = self.new_id();
        let last = self.tracks.len() - 1;
        let track = &mut self.tracks[last];
        track.segments.push(TrackSegment::new(segment_id));
        (track.id, segment_id)
    }

    /// Appends to the last segment of the last track.
    pub fn append_track_point(&mut self, point: TrackPoint) -> Result<()> {
        let segment = self
            .tracks
            .last_mut()
            .and_then(|t| t.segments.last_mut())
            .ok_or(TrackLogError::InvalidState(
                "append_track_point without an open segment",
            ))?;
        segment.points.push(point);
        Ok(())
    }

    /// Ids of the last track and its last segment, if any.
    pub fn current_segment(&self) -> Option<(Id, Id)> {
        let track = self.tracks.last()?;
        let segment = track.segments.last()?;
        Some((track.id, segment.id))
    }

    /// Drops the last segment if it holds no points, and its track if that leaves it empty.
    pub(crate) fn prune_empty_last_segment(&mut self) -> bool {
        let Some(track) = self.tracks.last_mut() else {
            return false;
        };
        if !track.segments.last().is_some_and(|s| s.points.is_empty()) {
            return false;
        }
        track.segments.pop();
        if track.segments.is_empty() {
            self.tracks.pop();
        }
        true
    }

    pub fn add_waypoint(&mut self, point: TrackPoint) -> Waypoint {
        let waypoint = Waypoint {
            id: self.new_id(),
            point,
        };
        self.waypoints.push(waypoint.clone());
        waypoint
    }

    /// Swaps in new collections in one step.
    ///
    /// The id counter is advanced past every adopted id so later ids never collide.
    pub fn replace_all(&mut self, tracks: Vec<Track>, waypoints: Vec<Waypoint>) {
        let max_adopted = tracks
            .iter()
            .flat_map(|t| std::iter::once(t.id).chain(t.segments.iter().map(|s| s.id)))
            .chain(waypoints.iter().map(|w| w.id))
            .max();
        if let Some(max) = max_adopted {
            self.next_id = self.next_id.max(max + 1);
        }
        self.tracks = tracks;
        self.waypoints = waypoints;
    }

    pub fn into_parts(self) -> (Vec<Track>, Vec<Waypoint>) {
        (self.tracks, self.waypoints)
    }

    pub(crate) fn push_track(&mut self, track: Track) {
        self.tracks.push(track);
    }

    pub(crate) fn push_waypoint(&mut self, waypoint: Waypoint) {
        self.waypoints.push(waypoint);
    }
}
