use std::io::Write;
use std::path::Path;

use chrono::SecondsFormat;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::Result;
use crate::gpx_types::*;

pub const GPX_NAMESPACE: &str = "http://www.topografix.com/GPX/1/0";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SCHEMA_LOCATION: &str =
    "http://www.topografix.com/GPX/1/0 http://www.topografix.com/GPX/1/0/gpx.xsd";
const CREATOR: &str = "gpx-tracklog";

/// Serialize a document to a GPX 1.0 string.
pub fn to_xml(doc: &GpxDocument) -> Result<String> {
    let bytes = write_gpx(Vec::new(), doc)?;
    // Only &str content is ever written.
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write a document to a file, replacing it.
pub fn write_file(path: &Path, doc: &GpxDocument) -> Result<()> {
    let file = std::io::BufWriter::new(std::fs::File::create(path)?);
    let mut file = write_gpx(file, doc)?;
    file.flush()?;
    Ok(())
}

/// Stream a document as GPX into `out`, returning it once the root is closed.
pub fn write_gpx<W: Write>(out: W, doc: &GpxDocument) -> Result<W> {
    let mut writer = Writer::new_with_indent(out, b' ', 1);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("gpx").with_attributes([
        ("xmlns", GPX_NAMESPACE),
        ("xmlns:xsi", XSI_NAMESPACE),
        ("xsi:schemaLocation", SCHEMA_LOCATION),
        ("version", "1.0"),
        ("creator", CREATOR),
    ])))?;

    for waypoint in doc.waypoints() {
        write_point(&mut writer, "wpt", waypoint.point())?;
    }

    for track in doc.tracks() {
        writer.write_event(Event::Start(BytesStart::new("trk")))?;
        if let Some(name) = track.name() {
            write_text_element(&mut writer, "name", name)?;
        }
        for segment in track.segments() {
            writer.write_event(Event::Start(BytesStart::new("trkseg")))?;
            for point in segment.points() {
                write_point(&mut writer, "trkpt", point)?;
            }
            writer.write_event(Event::End(BytesEnd::new("trkseg")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("trk")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("gpx")))?;

    tracing::debug!(
        tracks = doc.tracks().len(),
        waypoints = doc.waypoints().len(),
        "serialized GPX document"
    );
    Ok(writer.into_inner())
}

/// Children follow the GPX 1.0 schema order: ele, time, course, speed, name.
fn write_point<W: Write>(writer: &mut Writer<W>, tag: &str, pt: &TrackPoint) -> Result<()> {
    let lat = pt.location.latitude.to_string();
    let lon = pt.location.longitude.to_string();
    writer.write_event(Event::Start(
        BytesStart::new(tag).with_attributes([("lat", lat.as_str()), ("lon", lon.as_str())]),
    ))?;

    if let Some(ele) = pt.elevation {
        write_text_element(writer, "ele", &ele.to_string())?;
    }
    if let Some(ts) = pt.timestamp {
        let time = ts.to_rfc3339_opts(SecondsFormat::AutoSi, true);
        write_text_element(writer, "time", &time)?;
    }
    if let Some(course) = pt.bearing {
        write_text_element(writer, "course", &course.to_string())?;
    }
    if let Some(speed) = pt.speed {
        write_text_element(writer, "speed", &speed.to_string())?;
    }
    if let Some(name) = &pt.name {
        write_text_element(writer, "name", name)?;
    }

    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn write_text_element<W: Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use crate::parser::parse_gpx;
    use chrono::{TimeZone, Utc};

    fn sample_document() -> GpxDocument {
        let t0 = Utc.with_ymd_and_hms(2017, 7, 12, 8, 0, 0).unwrap();
        let mut doc = GpxDocument::new();
        doc.start_new_segment();
        doc.append_track_point(
            TrackPoint::new(Coordinate::new(59.329323, 18.068581), Some(t0))
                .with_elevation(28.5)
                .with_speed(1.4)
                .with_bearing(87.25),
        )
        .unwrap();
        doc.append_track_point(TrackPoint::new(
            Coordinate::new(59.3294, 18.0687),
            Some(t0 + chrono::Duration::seconds(12)),
        ))
        .unwrap();
        doc.add_waypoint(
            TrackPoint::new(Coordinate::new(-33.8688, 151.2093), Some(t0)).with_name("Harbour"),
        );
        doc
    }

    #[test]
    fn test_header_and_root() {
        let xml = to_xml(&GpxDocument::new()).unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(r#"xmlns="http://www.topografix.com/GPX/1/0""#));
        assert!(xml.contains(r#"version="1.0""#));
        assert!(xml.trim_end().ends_with("</gpx>"));
    }

    #[test]
    fn test_point_elements() {
        let xml = to_xml(&sample_document()).unwrap();
        assert!(xml.contains(r#"<trkpt lat="59.329323" lon="18.068581">"#));
        assert!(xml.contains("<ele>28.5</ele>"));
        assert!(xml.contains("<time>2017-07-12T08:00:00Z</time>"));
        assert!(xml.contains("<speed>1.4</speed>"));
        assert!(xml.contains("<course>87.25</course>"));
        assert!(xml.contains(r#"<wpt lat="-33.8688" lon="151.2093">"#));
        assert!(xml.contains("<name>Harbour</name>"));
        assert_eq!(xml.matches("<trkpt").count(), 2);
        assert_eq!(xml.matches("<ele>").count(), 1);
    }

    #[test]
    fn test_text_is_escaped() {
        let mut doc = GpxDocument::new();
        doc.add_waypoint(
            TrackPoint::new(Coordinate::new(1.0, 2.0), Some(Utc::now())).with_name("Fish & <Chips>"),
        );
        let xml = to_xml(&doc).unwrap();
        assert!(xml.contains("Fish &amp; &lt;Chips&gt;"));
        let back = parse_gpx(xml.as_bytes()).unwrap();
        assert_eq!(back.waypoints()[0].name(), Some("Fish & <Chips>"));
    }

    #[test]
    fn test_roundtrip() {
        let doc = sample_document();
        let xml = to_xml(&doc).unwrap();
        let back = parse_gpx(xml.as_bytes()).unwrap();

        assert_eq!(back.tracks().len(), 1);
        assert_eq!(
            back.tracks()[0].segments()[0].points(),
            doc.tracks()[0].segments()[0].points()
        );
        assert_eq!(back.waypoints()[0].point(), doc.waypoints()[0].point());
    }

    #[test]
    fn test_subsecond_timestamp_roundtrip() {
        let ts = Utc.with_ymd_and_hms(2020, 2, 29, 23, 59, 59).unwrap()
            + chrono::Duration::milliseconds(125);
        let mut doc = GpxDocument::new();
        doc.add_waypoint(TrackPoint::new(Coordinate::new(0.1, 0.2), Some(ts)));
        let xml = to_xml(&doc).unwrap();
        assert!(xml.contains("<time>2020-02-29T23:59:59.125Z</time>"));
        let back = parse_gpx(xml.as_bytes()).unwrap();
        assert_eq!(back.waypoints()[0].point().timestamp, Some(ts));
    }

    #[test]
    fn test_write_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.gpx");
        write_file(&path, &sample_document()).unwrap();
        let back = parse_gpx(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(back.point_count(), 2);
    }
}
