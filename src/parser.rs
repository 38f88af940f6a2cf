use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Result, TrackLogError};
use crate::geo::Coordinate;
use crate::gpx_types::*;
use crate::options::{MissingTimePolicy, ParseOptions};

/// Parse GPX bytes into a fresh document, rejecting points without a timestamp.
pub fn parse_gpx(xml: &[u8]) -> Result<GpxDocument> {
    parse_gpx_with(xml, &ParseOptions::default())
}

/// Parse GPX bytes into a fresh document.
///
/// Ids are assigned in document order as elements are read; a partially read
/// document is never returned.
pub fn parse_gpx_with(xml: &[u8], opts: &ParseOptions) -> Result<GpxDocument> {
    let mut reader = Reader::from_reader(xml);
    let mut doc = GpxDocument::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"gpx" => {
                parse_root(&e, &mut reader, &mut doc, opts)?;
                break;
            }
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"gpx" => break,
            Ok(Event::Start(_)) | Ok(Event::Empty(_)) | Ok(Event::Eof) => {
                return Err(TrackLogError::NotGpx);
            }
            Err(e) => return Err(TrackLogError::Xml(e)),
            _ => {}
        }
    }

    tracing::debug!(
        tracks = doc.tracks().len(),
        points = doc.point_count(),
        waypoints = doc.waypoints().len(),
        "parsed GPX document"
    );
    Ok(doc)
}

/// Read and parse a GPX file.
pub fn parse_file(path: &Path, opts: &ParseOptions) -> Result<GpxDocument> {
    let bytes = std::fs::read(path)?;
    parse_gpx_with(&bytes, opts)
}

/// Children of <gpx>. Called after receiving Event::Start for the root.
fn parse_root<'a>(
    start: &BytesStart<'a>,
    reader: &mut Reader<&'a [u8]>,
    doc: &mut GpxDocument,
    opts: &ParseOptions,
) -> Result<()> {
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"wpt" => {
                    let pending = parse_point(&e, reader)?;
                    push_waypoint(doc, pending, opts)?;
                }
                b"trk" => parse_track(reader, doc, opts)?,
                _ => {
                    // metadata, rte, extensions
                    reader.read_to_end(e.name())?;
                }
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"wpt" => push_waypoint(doc, PendingPoint::from_start(&e)?, opts)?,
                b"trk" => {
                    let track = Track::new(doc.new_id());
                    doc.push_track(track);
                }
                _ => {}
            },
            Ok(Event::End(e)) if e.name() == start.name() => break,
            Ok(Event::Eof) => return Err(unexpected_eof(start)),
            Err(e) => return Err(TrackLogError::Xml(e)),
            _ => {}
        }
    }

    Ok(())
}

fn push_waypoint(doc: &mut GpxDocument, pending: PendingPoint, opts: &ParseOptions) -> Result<()> {
    if let Some(point) = pending.into_track_point("wpt", opts)? {
        let waypoint = Waypoint {
            id: doc.new_id(),
            point,
        };
        doc.push_waypoint(waypoint);
    }
    Ok(())
}

/// Parse a <trk> element.
fn parse_track<'a>(
    reader: &mut Reader<&'a [u8]>,
    doc: &mut GpxDocument,
    opts: &ParseOptions,
) -> Result<()> {
    let mut track = Track::new(doc.new_id());

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"name" => track.name = Some(read_text_owned(reader, &e)?),
                b"trkseg" => {
                    let mut segment = TrackSegment::new(doc.new_id());
                    parse_segment(&e, reader, &mut segment, opts)?;
                    track.segments.push(segment);
                }
                _ => {
                    reader.read_to_end(e.name())?;
                }
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"trkseg" {
                    track.segments.push(TrackSegment::new(doc.new_id()));
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"trk" => break,
            Ok(Event::Eof) => {
                return Err(TrackLogError::UnexpectedEof {
                    element: "trk".to_string(),
                });
            }
            Err(e) => return Err(TrackLogError::Xml(e)),
            _ => {}
        }
    }

    doc.push_track(track);
    Ok(())
}

/// Parse a <trkseg> element.
fn parse_segment<'a>(
    start: &BytesStart<'a>,
    reader: &mut Reader<&'a [u8]>,
    segment: &mut TrackSegment,
    opts: &ParseOptions,
) -> Result<()> {
    loop {
        let pending = match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"trkpt" => parse_point(&e, reader)?,
                _ => {
                    reader.read_to_end(e.name())?;
                    continue;
                }
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"trkpt" => {
                PendingPoint::from_start(&e)?
            }
            Ok(Event::End(e)) if e.name() == start.name() => break,
            Ok(Event::Eof) => return Err(unexpected_eof(start)),
            Err(e) => return Err(TrackLogError::Xml(e)),
            _ => continue,
        };
        if let Some(point) = pending.into_track_point("trkpt", opts)? {
            segment.points.push(point);
        }
    }

    Ok(())
}

/// Fields collected between a point's start and end tags.
#[derive(Debug, Default)]
struct PendingPoint {
    lat: f64,
    lon: f64,
    time: Option<String>,
    name: Option<String>,
    ele: Option<f64>,
    speed: Option<f64>,
    course: Option<f64>,
}

impl PendingPoint {
    /// Missing, unparsable or out-of-range lat/lon default to 0.0 instead of
    /// failing the parse.
    fn from_start(e: &BytesStart<'_>) -> Result<Self> {
        let mut pending = Self::default();

        for attr_result in e.attributes() {
            let attr = attr_result?;
            let val = std::str::from_utf8(&attr.value)?.trim();
            match attr.key.local_name().as_ref() {
                b"lat" => pending.lat = parse_coordinate(val, "lat", 90.0),
                b"lon" => pending.lon = parse_coordinate(val, "lon", 180.0),
                _ => {}
            }
        }

        Ok(pending)
    }

    fn into_track_point(
        self,
        element: &'static str,
        opts: &ParseOptions,
    ) -> Result<Option<TrackPoint>> {
        let timestamp = match self.time.as_deref().map(str::trim) {
            Some(text) => match parse_timestamp(text) {
                Some(ts) => ts,
                None => {
                    return reject_or_skip(
                        TrackLogError::InvalidTimestamp {
                            element,
                            value: text.to_string(),
                        },
                        opts,
                    );
                }
            },
            None => return reject_or_skip(TrackLogError::MissingTimestamp { element }, opts),
        };

        Ok(Some(TrackPoint {
            location: Coordinate::new(self.lat, self.lon),
            timestamp: Some(timestamp),
            elevation: self.ele,
            speed: self.speed,
            bearing: self.course,
            name: self.name,
        }))
    }
}

fn reject_or_skip(err: TrackLogError, opts: &ParseOptions) -> Result<Option<TrackPoint>> {
    match opts.missing_time {
        MissingTimePolicy::RejectFile => Err(err),
        MissingTimePolicy::SkipPoint => {
            tracing::warn!("skipping point: {err}");
            Ok(None)
        }
    }
}

fn parse_coordinate(val: &str, attribute: &str, limit: f64) -> f64 {
    match val.parse::<f64>() {
        Ok(v) if (-limit..=limit).contains(&v) => v,
        _ => {
            tracing::debug!(attribute, value = val, "invalid coordinate, using 0.0");
            0.0
        }
    }
}

/// RFC 3339, or an ISO-8601 date-time without offset which is taken as UTC.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Parse a point element (wpt, trkpt) and its children.
/// Called after receiving Event::Start for the point element.
fn parse_point<'a>(start: &BytesStart<'a>, reader: &mut Reader<&'a [u8]>) -> Result<PendingPoint> {
    let mut pending = PendingPoint::from_start(start)?;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"time" => pending.time = Some(read_text_owned(reader, &e)?),
                b"name" => pending.name = Some(read_text_owned(reader, &e)?),
                b"ele" => pending.ele = read_number(reader, &e)?,
                b"speed" => pending.speed = read_number(reader, &e)?,
                b"course" => pending.course = read_number(reader, &e)?,
                _ => {
                    // Skip unknown/extensions elements
                    reader.read_to_end(e.name())?;
                }
            },
            Ok(Event::End(e)) if e.name() == start.name() => break,
            Ok(Event::Eof) => return Err(unexpected_eof(start)),
            Err(e) => return Err(TrackLogError::Xml(e)),
            _ => {}
        }
    }

    Ok(pending)
}

/// Unparsable numbers count as absent.
fn read_number<'a>(reader: &mut Reader<&'a [u8]>, start: &BytesStart<'_>) -> Result<Option<f64>> {
    let text = read_text_owned(reader, start)?;
    Ok(text.trim().parse::<f64>().ok())
}

/// Read text content of an element as an owned String.
/// Handles regular text, CDATA sections, and entity references (Event::GeneralRef).
fn read_text_owned<'a>(reader: &mut Reader<&'a [u8]>, start: &BytesStart<'_>) -> Result<String> {
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Text(e)) => text.push_str(std::str::from_utf8(e.as_ref())?),
            Ok(Event::CData(e)) => text.push_str(std::str::from_utf8(e.as_ref())?),
            Ok(Event::GeneralRef(e)) => {
                // Handle character references (&#60; &#x3C;) and predefined entities
                if let Ok(Some(ch)) = e.resolve_char_ref() {
                    text.push(ch);
                } else {
                    let name = std::str::from_utf8(e.as_ref())?;
                    match name {
                        "amp" => text.push('&'),
                        "lt" => text.push('<'),
                        "gt" => text.push('>'),
                        "quot" => text.push('"'),
                        "apos" => text.push('\''),
                        _ => {} // Unknown entity, skip
                    }
                }
            }
            Ok(Event::Start(e)) => {
                reader.read_to_end(e.name())?;
            }
            Ok(Event::End(e)) if e.name() == start.name() => break,
            Ok(Event::Eof) => return Err(unexpected_eof(start)),
            Err(e) => return Err(TrackLogError::Xml(e)),
            _ => {}
        }
    }

    Ok(text)
}

fn unexpected_eof(start: &BytesStart<'_>) -> TrackLogError {
    TrackLogError::UnexpectedEof {
        element: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
    }
}
