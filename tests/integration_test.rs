#![cfg(not(target_arch = "wasm32"))]

use std::sync::Arc;

use geojson::Value;
use gpx_tracklog::converter::to_feature_collection;
use gpx_tracklog::options::{ExportOptions, MissingTimePolicy, ParseOptions};
use gpx_tracklog::parser::{parse_file, parse_gpx, parse_gpx_with};
use gpx_tracklog::persist::{AutoSaver, FileStore, GpxStore, SharedTrackLog, load_latest, lock_log};
use gpx_tracklog::writer::to_xml;
use gpx_tracklog::{GpxDocument, SignificanceFilter, TrackLog, TrackLogError, TrackPoint, TrackerConfig};

fn load_fixture(path: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{path}")).unwrap()
}

fn short_track() -> GpxDocument {
    parse_gpx(load_fixture("short_track_wpt.gpx").as_bytes()).unwrap()
}

fn all_points(doc: &GpxDocument) -> Vec<TrackPoint> {
    doc.tracks()
        .iter()
        .flat_map(|t| t.segments())
        .flat_map(|s| s.points().iter().cloned())
        .collect()
}

#[test]
fn test_load_short_track() {
    let doc = short_track();

    assert_eq!(doc.waypoints().len(), 3);
    assert_eq!(doc.waypoints()[0].name(), Some("Scot's run waterfall"));
    assert_eq!(doc.waypoints()[2].name(), Some("Parking & trailhead"));
    assert_eq!(doc.tracks().len(), 1);
    assert_eq!(doc.tracks()[0].name(), Some("Morning loop"));
    assert_eq!(doc.tracks()[0].segments()[0].points().len(), 11);
    assert_eq!(doc.tracks()[0].segments()[0].points()[0].speed, Some(1.2));
    assert!(all_points(&doc).iter().all(|p| p.timestamp.is_some()));
}

#[test]
fn test_parse_file_matches_parse_gpx() {
    let from_file = parse_file(
        "tests/fixtures/short_track_wpt.gpx".as_ref(),
        &ParseOptions::default(),
    )
    .unwrap();
    assert_eq!(from_file, short_track());
}

#[test]
fn test_round_trip_preserves_content() {
    let doc = short_track();
    let xml = to_xml(&doc).unwrap();
    let again = parse_gpx(xml.as_bytes()).unwrap();

    assert_eq!(all_points(&again), all_points(&doc));
    assert_eq!(again.tracks().len(), doc.tracks().len());
    for (a, b) in again.tracks().iter().zip(doc.tracks()) {
        assert_eq!(a.name(), b.name());
    }
    let names = |d: &GpxDocument| -> Vec<Option<String>> {
        d.waypoints().iter().map(|w| w.name().map(str::to_string)).collect()
    };
    assert_eq!(names(&again), names(&doc));
    assert_eq!(to_xml(&again).unwrap(), xml);
}

#[test]
fn test_missing_time_rejects_file() {
    let gpx = load_fixture("short_track_wpt.gpx").replacen("<time>2017-07-01T09:45:00Z</time>", "", 1);
    let err = parse_gpx(gpx.as_bytes()).unwrap_err();
    assert!(matches!(err, TrackLogError::MissingTimestamp { element: "trkpt" }));
    assert!(err.is_parse_error());

    let skip = ParseOptions {
        missing_time: MissingTimePolicy::SkipPoint,
    };
    let doc = parse_gpx_with(gpx.as_bytes(), &skip).unwrap();
    assert_eq!(doc.tracks()[0].segments()[0].points().len(), 10);
}

#[test]
fn test_geojson_export() {
    let fc = to_feature_collection(&short_track(), &ExportOptions::default());
    assert_eq!(fc.features.len(), 4);

    let lines: Vec<usize> = fc
        .features
        .iter()
        .filter_map(|f| match &f.geometry.as_ref()?.value {
            Value::LineString(coords) => Some(coords.len()),
            _ => None,
        })
        .collect();
    assert_eq!(lines, vec![11]);
}

fn replay(doc: &GpxDocument, config: &TrackerConfig) -> Vec<usize> {
    let mut log = TrackLog::default();
    for track in doc.tracks() {
        for segment in track.segments() {
            let mut filter = SignificanceFilter::from_config(config);
            log.start_new_segment();
            for point in segment.points() {
                let major = filter.classify(point);
                log.handle_fix(point.clone(), major);
            }
            log.end_segment(None);
        }
    }
    log.document().tracks()[0]
        .segments()
        .iter()
        .map(|s| s.points().len())
        .collect()
}

#[test]
fn test_replay_through_significance_filter() {
    // Fixture fixes are a minute and roughly 69 m apart.
    let doc = short_track();
    let with = |dist: f64| TrackerConfig {
        time_threshold_secs: 120.0,
        dist_threshold_meters: dist,
        ..Default::default()
    };

    assert_eq!(replay(&doc, &with(50.0)), vec![11]);
    // Steps under the threshold never add up across minor fixes.
    assert_eq!(replay(&doc, &with(100.0)), vec![1]);

    let by_time = TrackerConfig {
        time_threshold_secs: 30.0,
        ..with(1000.0)
    };
    assert_eq!(replay(&doc, &by_time), vec![11]);
}

#[tokio::test]
async fn test_record_save_and_restore() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrackerConfig::default();
    let store = Arc::new(FileStore::from_config(dir.path(), &config));

    let shared = SharedTrackLog::default();
    let saver = AutoSaver::spawn(Arc::clone(&shared), store.clone(), &config);
    {
        let mut log = lock_log(&shared);
        log.start_new_segment();
        for point in all_points(&short_track()) {
            log.handle_fix(point, true);
        }
        log.end_segment(None);
        log.store_waypoint(short_track().waypoints()[0].point().clone())
            .unwrap();
    }
    saver.save_now().await.unwrap();
    saver.shutdown().await.unwrap();
    assert!(store.load(0).unwrap().is_some());

    let restored = SharedTrackLog::default();
    assert!(load_latest(&restored, &*store).unwrap());
    let log = lock_log(&restored);
    assert!(!log.is_recording());
    assert_eq!(log.document().point_count(), 11);
    assert_eq!(
        log.document().waypoints()[0].name(),
        Some("Scot's run waterfall")
    );
}
