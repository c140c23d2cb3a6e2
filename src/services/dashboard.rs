//! The analyses shown on the dashboard, built on top of the query layer.

use crate::models::house::{Measurement, Zone};
use crate::services::query::{self, Point, QueryError, Selection, TimeSeriesResult};
use crate::services::store::StoreHandle;
use chrono::NaiveDate;
use log::info;
use serde::Serialize;
use std::collections::BTreeMap;

/// All-time headline numbers for the selected zone. `None` means no data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Kpis {
    pub zone: Zone,
    pub avg_outdoor_temperature: Option<f64>,
    pub avg_zone_temperature: Option<f64>,
    pub max_zone_co2: Option<f64>,
}

/// One calendar day of the zone-vs-outdoor temperature trend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyTemperature {
    pub date: NaiveDate,
    pub zone_mean: Option<f64>,
    pub outdoor_mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub zones: Vec<Zone>,
    pub measurements: Vec<Measurement>,
    pub selected_zone: Option<Zone>,
    pub selected_measurement: Option<Measurement>,
    pub kpis: Option<Kpis>,
    pub temperature_trend: Vec<DailyTemperature>,
    /// Hourly series for the selected (zone, measurement); empty when nothing is selected.
    pub selected: TimeSeriesResult,
}

pub fn kpis(handle: &StoreHandle, zone: Zone) -> Result<Kpis, QueryError> {
    let selection = Selection::new([zone, Zone::Outdoor], [Measurement::Temperature, Measurement::Co2]);
    let result = query::query(handle, &selection)?;
    let mean = |z, m| result.get(z, m).and_then(|s| s.stats.mean);

    Ok(Kpis {
        zone,
        avg_outdoor_temperature: mean(Zone::Outdoor, Measurement::Temperature),
        avg_zone_temperature: mean(zone, Measurement::Temperature),
        max_zone_co2: result.get(zone, Measurement::Co2).and_then(|s| s.stats.max),
    })
}

/// Mean per calendar day over the span of the series. Days inside the span
/// without any value (or without any row) map to `None`.
pub fn daily_means(points: &[Point]) -> BTreeMap<NaiveDate, Option<f64>> {
    let mut sums: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for point in points {
        let entry = sums.entry(point.timestamp.date()).or_insert((0.0, 0));
        if let Some(v) = point.value {
            entry.0 += v;
            entry.1 += 1;
        }
    }

    let (Some(first), Some(last)) = (sums.keys().next().copied(), sums.keys().next_back().copied()) else {
        return BTreeMap::new();
    };
    first
        .iter_days()
        .take_while(|day| *day <= last)
        .map(|day| {
            let mean = sums
                .get(&day)
                .filter(|(_, n)| *n > 0)
                .map(|(sum, n)| sum / *n as f64);
            (day, mean)
        })
        .collect()
}

/// Daily mean temperature of `zone` next to the outdoor one, on the days both cover.
pub fn temperature_comparison(handle: &StoreHandle, zone: Zone) -> Result<Vec<DailyTemperature>, QueryError> {
    let result = query::query(
        handle,
        &Selection::new([zone, Zone::Outdoor], [Measurement::Temperature]),
    )?;
    let (Some(zone_series), Some(outdoor_series)) = (
        result.get(zone, Measurement::Temperature),
        result.get(Zone::Outdoor, Measurement::Temperature),
    ) else {
        return Ok(Vec::new());
    };

    let outdoor = daily_means(&outdoor_series.points);
    Ok(daily_means(&zone_series.points)
        .into_iter()
        .filter_map(|(date, zone_mean)| {
            outdoor.get(&date).map(|outdoor_mean| DailyTemperature {
                date,
                zone_mean,
                outdoor_mean: *outdoor_mean,
            })
        })
        .collect())
}

/// Assemble everything the dashboard renders. A requested label that is not
/// in the store falls back to `Z1`/`temperature` when present, else the first
/// available value.
pub fn build_dashboard(handle: &StoreHandle, zone_label: &str, measurement_label: &str) -> Result<Dashboard, QueryError> {
    let zones = query::list_zones(handle)?;
    let measurements = query::list_measurements(handle)?;

    let selected_zone = pick(&zones, Zone::from_label(zone_label), Zone::Z1);
    let selected_measurement = pick(
        &measurements,
        Measurement::from_label(measurement_label),
        Measurement::Temperature,
    );
    if selected_zone.map(|z| z.as_str()) != Some(zone_label) {
        info!(
            "Dashboard: zone {:?} not in store; showing {}",
            zone_label,
            selected_zone.map(|z| z.as_str()).unwrap_or("-")
        );
    }

    let (kpis, temperature_trend) = match selected_zone {
        Some(zone) => (Some(kpis(handle, zone)?), temperature_comparison(handle, zone)?),
        None => (None, Vec::new()),
    };
    let selected = match (selected_zone, selected_measurement) {
        (Some(zone), Some(measurement)) => query::query(handle, &Selection::new([zone], [measurement]))?,
        _ => TimeSeriesResult::default(),
    };

    Ok(Dashboard {
        zones,
        measurements,
        selected_zone,
        selected_measurement,
        kpis,
        temperature_trend,
        selected,
    })
}

fn pick<T: Copy + PartialEq>(available: &[T], requested: Option<T>, preferred: T) -> Option<T> {
    requested
        .filter(|r| available.contains(r))
        .or_else(|| available.contains(&preferred).then_some(preferred))
        .or_else(|| available.first().copied())
}
