use chrono::SecondsFormat;
use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde_json::{Map, Value as JsonValue};

use crate::gpx_types::*;
use crate::options::{ExportOptions, GpxElementType};

/// Convert a document to a GeoJSON FeatureCollection for map overlays.
pub fn to_feature_collection(doc: &GpxDocument, opts: &ExportOptions) -> FeatureCollection {
    let mut features = Vec::new();

    if opts.should_include(GpxElementType::Waypoint) {
        for wpt in doc.waypoints() {
            features.push(waypoint_to_feature(wpt, opts));
        }
    }

    if opts.should_include(GpxElementType::Track) {
        for trk in doc.tracks() {
            features.extend(track_to_features(trk, opts));
        }
    }

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn waypoint_to_feature(wpt: &Waypoint, opts: &ExportOptions) -> Feature {
    let mut feature = point_feature(wpt.point(), "waypoint", opts);
    if let Some(props) = feature.properties.as_mut() {
        props.insert("id".to_string(), JsonValue::Number(wpt.id().into()));
    }
    feature
}

fn track_to_features(trk: &Track, opts: &ExportOptions) -> Vec<Feature> {
    let non_empty_segments: Vec<&TrackSegment> = trk
        .segments()
        .iter()
        .filter(|s| !s.points().is_empty())
        .collect();

    if non_empty_segments.is_empty() {
        return Vec::new();
    }

    // Single point across all segments → Point Feature
    if trk.point_count() == 1 {
        let pt = &non_empty_segments[0].points()[0];
        let mut feature = point_feature(pt, "track", opts);
        if let Some(props) = feature.properties.as_mut() {
            props.extend(track_props(trk, opts));
        }
        return vec![feature];
    }

    let (lines, singles): (Vec<&TrackSegment>, Vec<&TrackSegment>) = non_empty_segments
        .into_iter()
        .partition(|s| s.points().len() >= 2);

    let mut features = if opts.join_track_segments && lines.len() > 1 {
        let line_strings: Vec<Vec<Vec<f64>>> = lines
            .iter()
            .map(|seg| segment_coords(seg, opts.include_elevation))
            .collect();
        let mut props = track_props(trk, opts);

        if opts.include_time {
            let all_times: Vec<JsonValue> = lines
                .iter()
                .map(|seg| JsonValue::Array(point_times(seg.points())))
                .collect();
            insert_coordinate_times(&mut props, JsonValue::Array(all_times));
        }

        vec![feature(Value::MultiLineString(line_strings), props)]
    } else {
        // Each segment as a separate Feature
        lines
            .into_iter()
            .map(|seg| {
                let mut props = segment_props(trk, seg, opts);
                if opts.include_time {
                    insert_coordinate_times(&mut props, JsonValue::Array(point_times(seg.points())));
                }
                feature(
                    Value::LineString(segment_coords(seg, opts.include_elevation)),
                    props,
                )
            })
            .collect()
    };

    // A one-point segment cannot be a line; keep it as a Point.
    features.extend(singles.into_iter().map(|seg| {
        let mut feature = point_feature(&seg.points()[0], "track", opts);
        if let Some(props) = feature.properties.as_mut() {
            props.extend(segment_props(trk, seg, opts));
        }
        feature
    }));

    features
}

fn point_feature(pt: &TrackPoint, gpx_type: &str, opts: &ExportOptions) -> Feature {
    let mut props = Map::new();
    props.insert(
        "gpxType".to_string(),
        JsonValue::String(gpx_type.to_string()),
    );

    if opts.include_metadata {
        insert_point_metadata(&mut props, pt);
    }

    feature(Value::Point(point_coords(pt, opts.include_elevation)), props)
}

fn feature(value: Value, props: Map<String, JsonValue>) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: None,
        properties: Some(props),
        foreign_members: None,
    }
}

fn track_props(trk: &Track, opts: &ExportOptions) -> Map<String, JsonValue> {
    let mut props = Map::new();
    props.insert(
        "gpxType".to_string(),
        JsonValue::String("track".to_string()),
    );
    props.insert("trackId".to_string(), JsonValue::Number(trk.id().into()));

    if opts.include_metadata {
        if let Some(name) = trk.name() {
            props.insert("name".to_string(), JsonValue::String(name.to_string()));
        }
    }

    props
}

fn segment_props(trk: &Track, seg: &TrackSegment, opts: &ExportOptions) -> Map<String, JsonValue> {
    let mut props = track_props(trk, opts);
    props.insert("segmentId".to_string(), JsonValue::Number(seg.id().into()));
    props
}

/// Build [lon, lat] or [lon, lat, ele] coordinate array.
fn point_coords(pt: &TrackPoint, include_elevation: bool) -> Vec<f64> {
    let (lat, lon) = (pt.location.latitude, pt.location.longitude);
    match (include_elevation, pt.elevation) {
        (true, Some(ele)) => vec![lon, lat, ele],
        _ => vec![lon, lat],
    }
}

fn segment_coords(seg: &TrackSegment, include_elevation: bool) -> Vec<Vec<f64>> {
    seg.points()
        .iter()
        .map(|pt| point_coords(pt, include_elevation))
        .collect()
}

fn insert_point_metadata(props: &mut Map<String, JsonValue>, pt: &TrackPoint) {
    if let Some(ref name) = pt.name {
        props.insert("name".to_string(), JsonValue::String(name.clone()));
    }
    if let Some(time) = time_value(pt) {
        props.insert("time".to_string(), time);
    }
    insert_number(props, "ele", pt.elevation);
    insert_number(props, "speed", pt.speed);
    insert_number(props, "course", pt.bearing);
}

fn insert_number(props: &mut Map<String, JsonValue>, key: &str, value: Option<f64>) {
    if let Some(n) = value.and_then(serde_json::Number::from_f64) {
        props.insert(key.to_string(), JsonValue::Number(n));
    }
}

fn time_value(pt: &TrackPoint) -> Option<JsonValue> {
    pt.timestamp
        .map(|ts| JsonValue::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
}

fn point_times(points: &[TrackPoint]) -> Vec<JsonValue> {
    points
        .iter()
        .map(|pt| time_value(pt).unwrap_or(JsonValue::Null))
        .collect()
}

/// Only inserted if at least one time is present.
fn insert_coordinate_times(props: &mut Map<String, JsonValue>, times: JsonValue) {
    fn has_time(v: &JsonValue) -> bool {
        match v {
            JsonValue::Array(items) => items.iter().any(has_time),
            JsonValue::Null => false,
            _ => true,
        }
    }

    if has_time(&times) {
        let mut coord_props = Map::new();
        coord_props.insert("times".to_string(), times);
        props.insert(
            "coordinateProperties".to_string(),
            JsonValue::Object(coord_props),
        );
    }
}
