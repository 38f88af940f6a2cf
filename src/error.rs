use wasm_bindgen::JsValue;

#[derive(Debug, thiserror::Error)]
pub enum TrackLogError {
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Document has no <gpx> root element")]
    NotGpx,

    #[error("Unexpected end of document inside <{element}>")]
    UnexpectedEof { element: String },

    #[error("Missing <time> on <{element}>")]
    MissingTimestamp { element: &'static str },

    #[error("Invalid timestamp '{value}' on <{element}>")]
    InvalidTimestamp {
        element: &'static str,
        value: String,
    },

    #[error("Coordinate out of range: {latitude}, {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl TrackLogError {
    /// True for failures caused by the content of a GPX document.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::Xml(_)
                | Self::NotGpx
                | Self::UnexpectedEof { .. }
                | Self::MissingTimestamp { .. }
                | Self::InvalidTimestamp { .. }
        )
    }
}

impl From<quick_xml::events::attributes::AttrError> for TrackLogError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(e.into())
    }
}

impl From<std::str::Utf8Error> for TrackLogError {
    fn from(e: std::str::Utf8Error) -> Self {
        Self::Xml(quick_xml::Error::Encoding(
            quick_xml::encoding::EncodingError::Utf8(e),
        ))
    }
}

impl From<TrackLogError> for JsValue {
    fn from(e: TrackLogError) -> Self {
        JsValue::from_str(&e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TrackLogError>;
