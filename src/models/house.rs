//! Domain vocabulary of the net-zero house dataset.
//!
//! Notes
//! - Zones and measurements are closed sets; parsing an unknown label yields `None`.
//! - Declaration order of the enum variants is the presentation order (`Ord`).
//! - CSV header names map to (zone, measurement) pairs only through [`column_mapping`].

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// =====================
// Zones
// =====================

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Zone {
    #[serde(rename = "Z1")]
    Z1,
    #[serde(rename = "Z2")]
    Z2,
    #[serde(rename = "Z3")]
    Z3,
    #[serde(rename = "Z4")]
    Z4,
    #[serde(rename = "Z5")]
    Z5,
    #[serde(rename = "Z6")]
    Z6,
    #[serde(rename = "Z7")]
    Z7,
    #[serde(rename = "Z8")]
    Z8,
    #[serde(rename = "Z9")]
    Z9,
    #[serde(rename = "Z10")]
    Z10,
    #[serde(rename = "Z11")]
    Z11,
    #[serde(rename = "Z12+13")]
    Z12And13,
    #[serde(rename = "Outdoor")]
    Outdoor,
}

impl Zone {
    pub const ALL: [Zone; 13] = [
        Zone::Z1,
        Zone::Z2,
        Zone::Z3,
        Zone::Z4,
        Zone::Z5,
        Zone::Z6,
        Zone::Z7,
        Zone::Z8,
        Zone::Z9,
        Zone::Z10,
        Zone::Z11,
        Zone::Z12And13,
        Zone::Outdoor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Zone::Z1 => "Z1",
            Zone::Z2 => "Z2",
            Zone::Z3 => "Z3",
            Zone::Z4 => "Z4",
            Zone::Z5 => "Z5",
            Zone::Z6 => "Z6",
            Zone::Z7 => "Z7",
            Zone::Z8 => "Z8",
            Zone::Z9 => "Z9",
            Zone::Z10 => "Z10",
            Zone::Z11 => "Z11",
            Zone::Z12And13 => "Z12+13",
            Zone::Outdoor => "Outdoor",
        }
    }

    /// Exact match against the canonical label.
    pub fn from_label(label: &str) -> Option<Zone> {
        Zone::ALL.into_iter().find(|z| z.as_str() == label)
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =====================
// Measurements
// =====================

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Measurement {
    #[serde(rename = "temperature")]
    Temperature,
    #[serde(rename = "humidity")]
    Humidity,
    #[serde(rename = "CO2")]
    Co2,
    #[serde(rename = "wind_speed")]
    WindSpeed,
    #[serde(rename = "wind_direction")]
    WindDirection,
    #[serde(rename = "barometric_pressure")]
    BarometricPressure,
    #[serde(rename = "precipitation")]
    Precipitation,
    #[serde(rename = "solar_radiation")]
    SolarRadiation,
}

impl Measurement {
    pub const ALL: [Measurement; 8] = [
        Measurement::Temperature,
        Measurement::Humidity,
        Measurement::Co2,
        Measurement::WindSpeed,
        Measurement::WindDirection,
        Measurement::BarometricPressure,
        Measurement::Precipitation,
        Measurement::SolarRadiation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Measurement::Temperature => "temperature",
            Measurement::Humidity => "humidity",
            Measurement::Co2 => "CO2",
            Measurement::WindSpeed => "wind_speed",
            Measurement::WindDirection => "wind_direction",
            Measurement::BarometricPressure => "barometric_pressure",
            Measurement::Precipitation => "precipitation",
            Measurement::SolarRadiation => "solar_radiation",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Measurement::Temperature => "°C",
            Measurement::Humidity => "%",
            Measurement::Co2 => "ppm",
            Measurement::WindSpeed => "m/s",
            Measurement::WindDirection => "°",
            Measurement::BarometricPressure => "hPa",
            Measurement::Precipitation => "mm",
            Measurement::SolarRadiation => "W/m²",
        }
    }

    /// Canonical label, plus the `temp` alias used by the original CSV headers.
    pub fn from_label(label: &str) -> Option<Measurement> {
        if label == "temp" {
            return Some(Measurement::Temperature);
        }
        Measurement::ALL.into_iter().find(|m| m.as_str() == label)
    }
}

impl std::fmt::Display for Measurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =====================
// Readings
// =====================

/// One normalized sensor reading. `value` is `None` when the cell was blank or not numeric.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: NaiveDateTime,
    pub zone: Zone,
    pub measurement: Measurement,
    pub value: Option<f64>,
}

impl Reading {
    pub fn key(&self) -> (NaiveDateTime, Zone, Measurement) {
        (self.timestamp, self.zone, self.measurement)
    }
}

// =====================
// Wide CSV column table
// =====================

/// Outdoor weather station columns.
pub const OUTDOOR_COLUMNS: [(&str, Measurement); 8] = [
    ("Air_temperature", Measurement::Temperature),
    ("Relative_humidity", Measurement::Humidity),
    ("Outdoor_CO2", Measurement::Co2),
    ("Wind_speed", Measurement::WindSpeed),
    ("Wind_direction", Measurement::WindDirection),
    ("Barometric_pressure", Measurement::BarometricPressure),
    ("Precipitation", Measurement::Precipitation),
    ("Solar_radiation", Measurement::SolarRadiation),
];

/// Suffixes accepted after `<zone>_` in indoor columns.
const ZONE_COLUMN_SUFFIXES: [(&str, Measurement); 5] = [
    ("temp", Measurement::Temperature),
    ("temperature", Measurement::Temperature),
    ("humidity", Measurement::Humidity),
    ("RH", Measurement::Humidity),
    ("CO2", Measurement::Co2),
];

/// Map a wide-layout CSV header to its (zone, measurement) pair.
///
/// Indoor columns are `<zone label>_<suffix>`; zone labels never contain `_`,
/// so the split happens at the first underscore. Anything else is `None`.
pub fn column_mapping(header: &str) -> Option<(Zone, Measurement)> {
    let header = header.trim();
    if let Some((_, m)) = OUTDOOR_COLUMNS.iter().find(|(name, _)| *name == header) {
        return Some((Zone::Outdoor, *m));
    }

    let (zone_label, suffix) = header.split_once('_')?;
    let zone = Zone::from_label(zone_label)?;
    if zone == Zone::Outdoor {
        return None;
    }
    ZONE_COLUMN_SUFFIXES
        .iter()
        .find(|(s, _)| *s == suffix)
        .map(|(_, m)| (zone, *m))
}
