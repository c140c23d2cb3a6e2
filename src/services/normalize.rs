//! Maps raw CSV rows onto the fixed `readings` schema.
//!
//! Two header layouts are understood: the wide export (one column per zone
//! and measurement) and a long `timestamp,zone,measurement,value` layout.

use crate::models::house::{column_mapping, Measurement, Reading, Zone};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use csv::StringRecord;
use log::{debug, warn};
use thiserror::Error;

const TIMESTAMP_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Why a single CSV row did not make it into the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("bad timestamp: {0:?}")]
    BadTimestamp(String),
    #[error("unknown zone: {0:?}")]
    UnknownZone(String),
    #[error("unknown measurement: {0:?}")]
    UnknownMeasurement(String),
    #[error("duplicate reading at {0}")]
    Duplicate(NaiveDateTime),
    #[error("field {0} is not valid UTF-8")]
    Undecodable(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("CSV header has no timestamp column")]
    MissingTimestamp,
    #[error("CSV header has no recognised reading columns")]
    NoReadingColumns,
}

#[derive(Debug, Clone, PartialEq)]
enum Layout {
    Wide {
        timestamp: usize,
        columns: Vec<(usize, Zone, Measurement)>,
    },
    Long {
        timestamp: usize,
        zone: usize,
        measurement: usize,
        value: usize,
    },
}

/// Header-derived plan for turning records into readings.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMap {
    layout: Layout,
}

impl ColumnMap {
    pub fn from_headers(headers: &StringRecord) -> Result<Self, HeaderError> {
        let find = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));

        let timestamp = find("timestamp").ok_or(HeaderError::MissingTimestamp)?;

        if let (Some(zone), Some(measurement), Some(value)) = (find("zone"), find("measurement"), find("value")) {
            return Ok(ColumnMap {
                layout: Layout::Long {
                    timestamp,
                    zone,
                    measurement,
                    value,
                },
            });
        }

        let mut columns: Vec<(usize, Zone, Measurement)> = Vec::new();
        for (idx, header) in headers.iter().enumerate() {
            if idx == timestamp {
                continue;
            }
            match column_mapping(header) {
                Some((zone, measurement)) => {
                    if let Some((first, _, _)) = columns.iter().find(|(_, z, m)| (*z, *m) == (zone, measurement)) {
                        warn!(
                            "Normalize: column {:?} repeats {} {} from {:?}; ignoring it",
                            header,
                            zone,
                            measurement,
                            headers.get(*first).unwrap_or_default()
                        );
                        continue;
                    }
                    columns.push((idx, zone, measurement));
                }
                None => debug!("Normalize: ignoring unmapped column {:?}", header),
            }
        }
        if columns.is_empty() {
            return Err(HeaderError::NoReadingColumns);
        }
        Ok(ColumnMap {
            layout: Layout::Wide { timestamp, columns },
        })
    }

    pub fn is_long(&self) -> bool {
        matches!(self.layout, Layout::Long { .. })
    }

    /// Number of (zone, measurement) columns in a wide header; 0 for the long layout.
    pub fn mapped_columns(&self) -> usize {
        match &self.layout {
            Layout::Wide { columns, .. } => columns.len(),
            Layout::Long { .. } => 0,
        }
    }

    /// Turn one CSV record into readings. Missing cells count as blank.
    pub fn normalize(&self, record: &StringRecord) -> Result<Vec<Reading>, RejectReason> {
        let cell = |idx: usize| record.get(idx).unwrap_or("");

        match &self.layout {
            Layout::Wide { timestamp, columns } => {
                let ts = parse_timestamp(cell(*timestamp))?;
                Ok(columns
                    .iter()
                    .map(|(idx, zone, measurement)| Reading {
                        timestamp: ts,
                        zone: *zone,
                        measurement: *measurement,
                        value: parse_value(cell(*idx)),
                    })
                    .collect())
            }
            Layout::Long {
                timestamp,
                zone,
                measurement,
                value,
            } => {
                let ts = parse_timestamp(cell(*timestamp))?;
                let zone_label = cell(*zone).trim();
                let zone = Zone::from_label(zone_label).ok_or_else(|| RejectReason::UnknownZone(zone_label.to_string()))?;
                let measurement_label = cell(*measurement).trim();
                let measurement = Measurement::from_label(measurement_label)
                    .ok_or_else(|| RejectReason::UnknownMeasurement(measurement_label.to_string()))?;
                Ok(vec![Reading {
                    timestamp: ts,
                    zone,
                    measurement,
                    value: parse_value(cell(*value)),
                }])
            }
        }
    }
}

/// Parse a timestamp cell into a naive instant. Offsets are folded into UTC.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, RejectReason> {
    let s = raw.trim();
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ts);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }
    Err(RejectReason::BadTimestamp(s.to_string()))
}

/// Blank, non-numeric and non-finite cells are all `None`.
pub fn parse_value(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}
