//! Read side of the store: filtered time series with per-series aggregates.
//!
//! Every function here is a pure function of the store contents and its
//! arguments. Labels that are not part of the vocabulary select nothing
//! instead of failing, so stale UI selections degrade to empty results.

use crate::db::models::ReadingRow;
use crate::models::house::{Measurement, Zone};
use crate::schema;
use crate::services::store::StoreHandle;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use log::{debug, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("store query failed: {0}")]
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub zones: BTreeSet<Zone>,
    pub measurements: BTreeSet<Measurement>,
}

impl Selection {
    pub fn new(zones: impl IntoIterator<Item = Zone>, measurements: impl IntoIterator<Item = Measurement>) -> Self {
        Selection {
            zones: zones.into_iter().collect(),
            measurements: measurements.into_iter().collect(),
        }
    }

    /// Build a selection from UI labels, dropping the ones outside the vocabulary.
    pub fn from_labels<'a>(
        zones: impl IntoIterator<Item = &'a str>,
        measurements: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let zones = zones
            .into_iter()
            .filter_map(|label| {
                let zone = Zone::from_label(label.trim());
                if zone.is_none() {
                    debug!("Query: unknown zone {:?} selects nothing", label);
                }
                zone
            })
            .collect();
        let measurements = measurements
            .into_iter()
            .filter_map(|label| {
                let measurement = Measurement::from_label(label.trim());
                if measurement.is_none() {
                    debug!("Query: unknown measurement {:?} selects nothing", label);
                }
                measurement
            })
            .collect();
        Selection { zones, measurements }
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty() || self.measurements.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub timestamp: NaiveDateTime,
    pub value: Option<f64>,
}

/// Aggregates over the non-null values of a series. `mean`/`max` are `None`
/// when there is no value at all, which is different from a value of zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesStats {
    pub mean: Option<f64>,
    pub max: Option<f64>,
    pub count_missing: usize,
}

impl SeriesStats {
    pub fn from_points(points: &[Point]) -> Self {
        let mut sum = 0.0;
        let mut present = 0usize;
        let mut max: Option<f64> = None;
        for v in points.iter().filter_map(|p| p.value) {
            sum += v;
            present += 1;
            max = Some(max.map_or(v, |m| m.max(v)));
        }
        SeriesStats {
            mean: (present > 0).then(|| sum / present as f64),
            max,
            count_missing: points.len() - present,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub zone: Zone,
    pub measurement: Measurement,
    /// Strictly increasing by timestamp.
    pub points: Vec<Point>,
    pub stats: SeriesStats,
}

impl Series {
    pub fn new(zone: Zone, measurement: Measurement, points: Vec<Point>) -> Self {
        let stats = SeriesStats::from_points(&points);
        Series {
            zone,
            measurement,
            points,
            stats,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeSeriesResult {
    /// Ordered by zone, then measurement. Pairs with no stored rows are absent.
    pub series: Vec<Series>,
}

impl TimeSeriesResult {
    pub fn get(&self, zone: Zone, measurement: Measurement) -> Option<&Series> {
        self.series.iter().find(|s| s.zone == zone && s.measurement == measurement)
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

pub fn query(handle: &StoreHandle, selection: &Selection) -> Result<TimeSeriesResult, QueryError> {
    if selection.is_empty() {
        return Ok(TimeSeriesResult::default());
    }

    use schema::readings::dsl as R;

    let zones: Vec<&str> = selection.zones.iter().map(|z| z.as_str()).collect();
    let measurements: Vec<&str> = selection.measurements.iter().map(|m| m.as_str()).collect();

    let rows: Vec<ReadingRow> = handle.with_conn(|conn| {
        R::readings
            .filter(R::zone.eq_any(zones).and(R::measurement.eq_any(measurements)))
            .order((R::zone.asc(), R::measurement.asc(), R::timestamp.asc()))
            .select(ReadingRow::as_select())
            .load(conn)
    })?;

    // rows arrive sorted by timestamp within each (zone, measurement)
    let mut grouped: BTreeMap<(Zone, Measurement), Vec<Point>> = BTreeMap::new();
    for row in rows {
        let (Some(zone), Some(measurement)) = (Zone::from_label(&row.zone), Measurement::from_label(&row.measurement))
        else {
            warn!(
                "Query: skipping stored row with unknown labels ({}, {})",
                row.zone, row.measurement
            );
            continue;
        };
        grouped.entry((zone, measurement)).or_default().push(Point {
            timestamp: row.timestamp,
            value: row.value,
        });
    }

    let series = grouped
        .into_iter()
        .map(|((zone, measurement), points)| Series::new(zone, measurement, points))
        .collect::<Vec<_>>();
    debug!("Query: {} series for {:?}", series.len(), selection);
    Ok(TimeSeriesResult { series })
}

/// Zones that have at least one stored reading, in vocabulary order.
pub fn list_zones(handle: &StoreHandle) -> Result<Vec<Zone>, QueryError> {
    use schema::readings::dsl as R;

    let labels: Vec<String> = handle.with_conn(|conn| R::readings.select(R::zone).distinct().load(conn))?;
    Ok(parse_sorted(&labels, Zone::from_label))
}

/// Measurements that have at least one stored reading, in vocabulary order.
pub fn list_measurements(handle: &StoreHandle) -> Result<Vec<Measurement>, QueryError> {
    use schema::readings::dsl as R;

    let labels: Vec<String> = handle.with_conn(|conn| R::readings.select(R::measurement).distinct().load(conn))?;
    Ok(parse_sorted(&labels, Measurement::from_label))
}

fn parse_sorted<T: Ord>(labels: &[String], parse: fn(&str) -> Option<T>) -> Vec<T> {
    let mut out: Vec<T> = labels
        .iter()
        .filter_map(|label| {
            let parsed = parse(label);
            if parsed.is_none() {
                warn!("Query: store contains unknown label {:?}", label);
            }
            parsed
        })
        .collect();
    out.sort();
    out.dedup();
    out
}
