pub mod config;
pub mod converter;
pub mod error;
pub mod geo;
pub mod gpx_types;
pub mod observer;
pub mod options;
pub mod parser;
#[cfg(not(target_arch = "wasm32"))]
pub mod persist;
pub mod session;
pub mod settings;
pub mod units;
pub mod writer;

use wasm_bindgen::prelude::*;

pub use crate::config::TrackerConfig;
pub use crate::error::{Result, TrackLogError};
pub use crate::geo::{Coordinate, SignificanceFilter};
pub use crate::gpx_types::{GpxDocument, Id, Track, TrackPoint, TrackSegment, Waypoint};
pub use crate::observer::SubscriptionId;
pub use crate::options::{ExportOptions, MissingTimePolicy, ParseOptions};
pub use crate::session::{Filter, SessionState, TrackEvent, TrackLog, WaypointEvent};

/// Parse a GPX string into a document, returned as a JS object.
#[wasm_bindgen(js_name = parseGpx)]
pub fn parse_gpx(gpx_string: &str, options: JsValue) -> std::result::Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let opts: ParseOptions = parse_options(options)?;
    let doc = parser::parse_gpx_with(gpx_string.as_bytes(), &opts)?;
    serde_wasm_bindgen::to_value(&doc).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Serialize a document object (as returned by `parseGpx`) back to GPX.
#[wasm_bindgen(js_name = documentToGpx)]
pub fn document_to_gpx(document: JsValue) -> std::result::Result<String, JsValue> {
    console_error_panic_hook::set_once();

    let doc: GpxDocument =
        serde_wasm_bindgen::from_value(document).map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(writer::to_xml(&doc)?)
}

/// Convert GPX string to GeoJSON, returned as a JS object.
#[wasm_bindgen(js_name = gpxToGeoJson)]
pub fn gpx_to_geojson(gpx_string: &str, options: JsValue) -> std::result::Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let opts: ExportOptions = parse_options(options)?;
    let doc = parser::parse_gpx(gpx_string.as_bytes())?;
    let fc = converter::to_feature_collection(&doc, &opts);
    serde_wasm_bindgen::to_value(&fc).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Convert GPX string to GeoJSON, returned as a JSON string.
#[wasm_bindgen(js_name = gpxToGeoJsonString)]
pub fn gpx_to_geojson_string(gpx_string: &str, options: JsValue) -> std::result::Result<String, JsValue> {
    console_error_panic_hook::set_once();

    let opts: ExportOptions = parse_options(options)?;
    let doc = parser::parse_gpx(gpx_string.as_bytes())?;
    let fc = converter::to_feature_collection(&doc, &opts);
    serde_json::to_string(&fc).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn parse_options<T>(options: JsValue) -> std::result::Result<T, JsValue>
where
    T: Default + serde::de::DeserializeOwned,
{
    if options.is_undefined() || options.is_null() {
        Ok(T::default())
    } else {
        serde_wasm_bindgen::from_value(options).map_err(|e| JsValue::from_str(&e.to_string()))
    }
}
