//! Live recording on top of [`GpxDocument`].
//!
//! [`TrackLog`] is the single mutator of the document while the process runs:
//! the fix producer feeds it classified fixes, the UI subscribes to it, and the
//! persistence layer snapshots it.

use crate::error::{Result, TrackLogError};
use crate::gpx_types::*;
use crate::observer::{ObserverList, SubscriptionId};
use crate::writer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording { track_id: Id, segment_id: Id },
}

/// What a subscriber wants delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Filter {
    /// Replay existing history at subscribe time and after a reload.
    pub full_history: bool,
    /// Also deliver minor fixes seen while recording. They are never stored.
    pub include_minor: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackEvent {
    /// The whole log was replaced; forget everything received so far.
    Reset,
    SegmentStarted {
        track_id: Id,
        segment_id: Id,
    },
    Point {
        track_id: Id,
        segment_id: Id,
        point: TrackPoint,
        major: bool,
    },
    SegmentEnded {
        track_id: Id,
        segment_id: Id,
        last_point: Option<TrackPoint>,
        /// The segment received no points and was removed from the log.
        discarded: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum WaypointEvent {
    Reset,
    Added(Waypoint),
}

pub type TrackObserver = Box<dyn FnMut(&TrackEvent) + Send>;
pub type WaypointObserver = Box<dyn FnMut(&WaypointEvent) + Send>;
pub type ChangeListener = Box<dyn FnMut(u64) + Send>;

enum Observer {
    Track(Filter, TrackObserver),
    Waypoint(Filter, WaypointObserver),
}

pub struct TrackLog {
    document: GpxDocument,
    state: SessionState,
    revision: u64,
    generation: u64,
    observers: ObserverList<Observer>,
    change_listener: Option<ChangeListener>,
}

impl Default for TrackLog {
    fn default() -> Self {
        Self::new(GpxDocument::new())
    }
}

impl TrackLog {
    pub fn new(document: GpxDocument) -> Self {
        Self {
            document,
            state: SessionState::Idle,
            revision: 0,
            generation: 0,
            observers: ObserverList::default(),
            change_listener: None,
        }
    }

    pub fn document(&self) -> &GpxDocument {
        &self.document
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, SessionState::Recording { .. })
    }

    /// Advances on every change to the document.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Advances on every [`clear`](Self::clear); names the persisted file.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    /// Called with the new revision after each change. Replaces any previous listener.
    pub fn set_change_listener(&mut self, listener: ChangeListener) {
        self.change_listener = Some(listener);
    }

    /// Opens a new segment and starts recording.
    ///
    /// A segment still open is ended first.
    pub fn start_new_segment(&mut self) -> (Id, Id) {
        if self.is_recording() {
            self.end_segment(None);
        }
        let (track_id, segment_id) = self.document.start_new_segment();
        self.state = SessionState::Recording {
            track_id,
            segment_id,
        };
        tracing::info!(track_id, segment_id, "recording started");
        self.bump_revision();
        self.notify_track(&TrackEvent::SegmentStarted {
            track_id,
            segment_id,
        });
        (track_id, segment_id)
    }

    /// Feeds one classified fix. Returns `true` if it was stored.
    ///
    /// Ignored while idle. Minor fixes are only forwarded to subscribers that
    /// asked for them. A major fix without a timestamp or with an out-of-range
    /// location is dropped, since it could not be written back losslessly.
    pub fn handle_fix(&mut self, point: TrackPoint, is_major: bool) -> bool {
        let SessionState::Recording {
            track_id,
            segment_id,
        } = self.state
        else {
            return false;
        };

        if is_major {
            if let Err(e) = check_storable(&point, "trkpt") {
                tracing::warn!("dropping fix: {e}");
                return false;
            }
            if let Err(e) = self.document.append_track_point(point.clone()) {
                debug_assert!(false, "recording without an open segment: {e}");
                tracing::error!("dropping fix: {e}");
                return false;
            }
            self.bump_revision();
        }

        self.notify_track(&TrackEvent::Point {
            track_id,
            segment_id,
            point,
            major: is_major,
        });
        is_major
    }

    /// Stops recording. A segment that received no points is removed.
    pub fn end_segment(&mut self, last_known_point: Option<TrackPoint>) {
        let SessionState::Recording {
            track_id,
            segment_id,
        } = self.state
        else {
            return;
        };

        self.state = SessionState::Idle;
        let discarded = self.document.prune_empty_last_segment();
        if discarded {
            self.bump_revision();
        }
        tracing::info!(track_id, segment_id, discarded, "recording stopped");
        self.notify_track(&TrackEvent::SegmentEnded {
            track_id,
            segment_id,
            last_point: last_known_point,
            discarded,
        });
    }

    /// Adds a waypoint, recording or not.
    ///
    /// Fails without touching the log if `point` has no timestamp or an
    /// out-of-range location.
    pub fn store_waypoint(&mut self, point: TrackPoint) -> Result<Waypoint> {
        check_storable(&point, "wpt")?;
        let waypoint = self.document.add_waypoint(point);
        tracing::debug!(id = waypoint.id(), "waypoint stored");
        self.bump_revision();
        let event = WaypointEvent::Added(waypoint.clone());
        for observer in self.observers.iter_mut() {
            if let Observer::Waypoint(_, callback) = observer {
                callback(&event);
            }
        }
        Ok(waypoint)
    }

    /// Registers a track observer. With `full_history` every existing segment
    /// and point is delivered before this returns.
    pub fn subscribe_track(&mut self, filter: Filter, mut observer: TrackObserver) -> SubscriptionId {
        if filter.full_history {
            replay_tracks(&self.document, &mut observer);
        }
        self.observers.add(Observer::Track(filter, observer))
    }

    /// Registers a waypoint observer. With `full_history` every existing
    /// waypoint is delivered before this returns.
    pub fn subscribe_waypoints(
        &mut self,
        filter: Filter,
        mut observer: WaypointObserver,
    ) -> SubscriptionId {
        if filter.full_history {
            replay_waypoints(&self.document, &mut observer);
        }
        self.observers.add(Observer::Waypoint(filter, observer))
    }

    /// No callback fires for `id` once this returns.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.remove(id)
    }

    /// Replaces the whole log with `other` in one step and stops recording.
    pub fn load(&mut self, other: GpxDocument) {
        let (tracks, waypoints) = other.into_parts();
        self.state = SessionState::Idle;
        self.document.replace_all(tracks, waypoints);
        tracing::info!(
            tracks = self.document.tracks().len(),
            waypoints = self.document.waypoints().len(),
            "track log loaded"
        );
        self.bump_revision();
        self.refresh_observers();
    }

    /// Starts an empty log under a new generation. Recording, if active,
    /// continues in a fresh segment.
    pub fn clear(&mut self) {
        let was_recording = self.is_recording();
        self.document = GpxDocument::new();
        self.state = SessionState::Idle;
        self.generation += 1;
        tracing::info!(generation = self.generation, "track log cleared");
        self.bump_revision();
        self.refresh_observers();
        if was_recording {
            self.start_new_segment();
        }
    }

    /// Point-in-time GPX serialization of the log.
    pub fn to_xml(&self) -> Result<String> {
        writer::to_xml(&self.document)
    }

    fn bump_revision(&mut self) {
        self.revision += 1;
        if let Some(listener) = self.change_listener.as_mut() {
            listener(self.revision);
        }
    }

    fn notify_track(&mut self, event: &TrackEvent) {
        let minor = matches!(event, TrackEvent::Point { major: false, .. });
        for observer in self.observers.iter_mut() {
            if let Observer::Track(filter, callback) = observer {
                if !minor || filter.include_minor {
                    callback(event);
                }
            }
        }
    }

    fn refresh_observers(&mut self) {
        let document = &self.document;
        for observer in self.observers.iter_mut() {
            match observer {
                Observer::Track(filter, callback) => {
                    callback(&TrackEvent::Reset);
                    if filter.full_history {
                        replay_tracks(document, callback);
                    }
                }
                Observer::Waypoint(filter, callback) => {
                    callback(&WaypointEvent::Reset);
                    if filter.full_history {
                        replay_waypoints(document, callback);
                    }
                }
            }
        }
    }
}

fn check_storable(point: &TrackPoint, element: &'static str) -> Result<()> {
    if point.timestamp.is_none() {
        return Err(TrackLogError::MissingTimestamp { element });
    }
    if !point.location.is_valid() {
        return Err(TrackLogError::InvalidCoordinate {
            latitude: point.location.latitude,
            longitude: point.location.longitude,
        });
    }
    Ok(())
}

fn replay_tracks(document: &GpxDocument, observer: &mut TrackObserver) {
    for track in document.tracks() {
        for segment in track.segments() {
            observer(&TrackEvent::SegmentStarted {
                track_id: track.id(),
                segment_id: segment.id(),
            });
            for point in segment.points() {
                observer(&TrackEvent::Point {
                    track_id: track.id(),
                    segment_id: segment.id(),
                    point: point.clone(),
                    major: true,
                });
            }
        }
    }
}

fn replay_waypoints(document: &GpxDocument, observer: &mut WaypointObserver) {
    for waypoint in document.waypoints() {
        observer(&WaypointEvent::Added(waypoint.clone()));
    }
}
