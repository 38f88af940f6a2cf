//! Display units for live values, selected through settings.
//!
//! Every unit parses from its settings string (unknown strings fall back to the
//! default), formats a value, and cycles to the next unit for tap-to-toggle labels.

use crate::settings::{SettingsStore, keys};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpeedUnit {
    #[default]
    MetersPerSecond,
    KilometersPerHour,
    MilesPerHour,
}

impl SpeedUnit {
    pub fn parse(s: &str) -> Self {
        match s {
            "km_per_h" => Self::KilometersPerHour,
            "miles_per_h" => Self::MilesPerHour,
            _ => Self::MetersPerSecond,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MetersPerSecond => "m_per_s",
            Self::KilometersPerHour => "km_per_h",
            Self::MilesPerHour => "miles_per_h",
        }
    }

    /// `meters_per_second` in this unit.
    pub fn format(&self, meters_per_second: f64) -> String {
        match self {
            Self::MetersPerSecond => format!("{meters_per_second:.1} m/s"),
            Self::KilometersPerHour => format!("{:.1} km/h", meters_per_second * 3600.0 / 1000.0),
            Self::MilesPerHour => format!("{:.1} mph", meters_per_second * 3600.0 / 1609.34),
        }
    }

    pub fn next(&self) -> Self {
        match self {
            Self::MetersPerSecond => Self::KilometersPerHour,
            Self::KilometersPerHour => Self::MilesPerHour,
            Self::MilesPerHour => Self::MetersPerSecond,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AltitudeUnit {
    #[default]
    Meter,
    Feet,
}

impl AltitudeUnit {
    pub fn parse(s: &str) -> Self {
        match s {
            "ft" => Self::Feet,
            _ => Self::Meter,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meter => "m",
            Self::Feet => "ft",
        }
    }

    pub fn format(&self, meters: f64) -> String {
        match self {
            Self::Meter => format!("{meters:.0} m"),
            Self::Feet => format!("{:.0} ft", meters * 3.28084),
        }
    }

    pub fn next(&self) -> Self {
        match self {
            Self::Meter => Self::Feet,
            Self::Feet => Self::Meter,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LocationUnit {
    #[default]
    Decimal,
    Dms,
}

impl LocationUnit {
    pub fn parse(s: &str) -> Self {
        match s {
            "dms" => Self::Dms,
            _ => Self::Decimal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decimal => "dec",
            Self::Dms => "dms",
        }
    }

    pub fn format(&self, latitude: f64, longitude: f64, separator: &str) -> String {
        match self {
            Self::Decimal => format!("{latitude:.6}{separator}{longitude:.6}"),
            Self::Dms => format!(
                "{}{separator}{}",
                format_dms(latitude, ('S', 'N')),
                format_dms(longitude, ('W', 'E'))
            ),
        }
    }

    pub fn next(&self) -> Self {
        match self {
            Self::Decimal => Self::Dms,
            Self::Dms => Self::Decimal,
        }
    }
}

/// `N 59° 19' 45.56"` style; `labels` is (negative, positive) hemisphere.
fn format_dms(degrees: f64, labels: (char, char)) -> String {
    let hemisphere = if degrees < 0.0 { labels.0 } else { labels.1 };
    let d = degrees.abs();
    let whole = d.trunc();
    let minutes = ((d - whole) * 60.0).trunc();
    let seconds = (d - whole - minutes / 60.0) * 3600.0;
    format!("{hemisphere} {whole:.0}° {minutes:.0}' {seconds:.2}\"")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BearingUnit {
    #[default]
    Degrees,
    Symbol,
}

const COMPASS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

impl BearingUnit {
    pub fn parse(s: &str) -> Self {
        match s {
            "sym" => Self::Symbol,
            _ => Self::Degrees,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Degrees => "deg",
            Self::Symbol => "sym",
        }
    }

    pub fn format(&self, degrees: f64) -> String {
        match self {
            Self::Degrees => format!("{degrees:.0}°"),
            Self::Symbol => {
                let sector = 360.0 / COMPASS.len() as f64;
                let ix = ((degrees.rem_euclid(360.0) + sector / 2.0) / sector) as usize;
                COMPASS[ix % COMPASS.len()].to_string()
            }
        }
    }

    pub fn next(&self) -> Self {
        match self {
            Self::Degrees => Self::Symbol,
            Self::Symbol => Self::Degrees,
        }
    }
}

/// The four display units currently selected in settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitPreferences {
    pub speed: SpeedUnit,
    pub altitude: AltitudeUnit,
    pub location: LocationUnit,
    pub bearing: BearingUnit,
}

impl UnitPreferences {
    pub fn from_settings(settings: &dyn SettingsStore) -> Self {
        let read = |key: &str| settings.get(key).unwrap_or_default();
        Self {
            speed: SpeedUnit::parse(&read(keys::SPEED_UNIT)),
            altitude: AltitudeUnit::parse(&read(keys::ALTITUDE_UNIT)),
            location: LocationUnit::parse(&read(keys::LOCATION_UNIT)),
            bearing: BearingUnit::parse(&read(keys::BEARING_UNIT)),
        }
    }
}
