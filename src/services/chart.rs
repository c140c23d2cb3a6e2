//! Reshapes query results into what the charting and widget layer consumes.
//! Series and point order are preserved as given.

use crate::models::house::{Measurement, Zone};
use crate::services::dashboard::{Dashboard, DailyTemperature, Kpis};
use crate::services::query::{Series, SeriesStats, TimeSeriesResult};
use serde::Serialize;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";
const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartableSeries {
    pub name: String,
    pub zone: Zone,
    pub measurement: Measurement,
    pub unit: &'static str,
    pub x: Vec<String>,
    pub y: Vec<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SeriesStats>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KpiTile {
    pub title: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub zones: Vec<Zone>,
    pub measurements: Vec<Measurement>,
    pub selected_zone: Option<Zone>,
    pub selected_measurement: Option<Measurement>,
    pub kpis: Vec<KpiTile>,
    pub temperature_trend: Vec<ChartableSeries>,
    pub selected_series: Vec<ChartableSeries>,
    pub notices: Vec<String>,
}

pub fn to_chartable(result: &TimeSeriesResult) -> Vec<ChartableSeries> {
    result.series.iter().map(series_to_chartable).collect()
}

fn series_to_chartable(series: &Series) -> ChartableSeries {
    ChartableSeries {
        name: format!("{} {} ({})", series.zone, series.measurement, series.measurement.unit()),
        zone: series.zone,
        measurement: series.measurement,
        unit: series.measurement.unit(),
        x: series
            .points
            .iter()
            .map(|p| p.timestamp.format(TIMESTAMP_FORMAT).to_string())
            .collect(),
        y: series.points.iter().map(|p| p.value).collect(),
        summary: Some(series.stats),
    }
}

/// Two lines, the zone first, sharing the same date axis.
pub fn comparison_chart(zone: Zone, trend: &[DailyTemperature]) -> Vec<ChartableSeries> {
    let unit = Measurement::Temperature.unit();
    let x: Vec<String> = trend.iter().map(|d| d.date.format(DATE_FORMAT).to_string()).collect();
    let line = |z: Zone, y: Vec<Option<f64>>| ChartableSeries {
        name: format!("{} Temp ({})", z, unit),
        zone: z,
        measurement: Measurement::Temperature,
        unit,
        x: x.clone(),
        y,
        summary: None,
    };
    vec![
        line(zone, trend.iter().map(|d| d.zone_mean).collect()),
        line(Zone::Outdoor, trend.iter().map(|d| d.outdoor_mean).collect()),
    ]
}

pub fn kpi_tiles(kpis: &Kpis) -> Vec<KpiTile> {
    let temp = Measurement::Temperature.unit();
    vec![
        tile("Avg. Outdoor Temp (All Time)".to_string(), kpis.avg_outdoor_temperature, temp),
        tile(
            format!("Avg. {} Temp (All Time)", kpis.zone),
            kpis.avg_zone_temperature,
            temp,
        ),
        tile(
            format!("Max {} CO2 (All Time)", kpis.zone),
            kpis.max_zone_co2,
            Measurement::Co2.unit(),
        ),
    ]
}

fn tile(title: String, value: Option<f64>, unit: &str) -> KpiTile {
    let value = match value {
        Some(v) => format!("{v:.2} {unit}"),
        None => NOT_AVAILABLE.to_string(),
    };
    KpiTile { title, value }
}

pub fn dashboard_view(dashboard: &Dashboard) -> DashboardView {
    let mut notices = Vec::new();
    let zone_label = dashboard.selected_zone.map(|z| z.as_str()).unwrap_or(NOT_AVAILABLE);
    let measurement_label = dashboard
        .selected_measurement
        .map(|m| m.as_str())
        .unwrap_or(NOT_AVAILABLE);

    if dashboard.zones.is_empty() {
        notices.push("The store contains no readings.".to_string());
    }
    let temperature_trend = match dashboard.selected_zone {
        Some(zone) if !dashboard.temperature_trend.is_empty() => comparison_chart(zone, &dashboard.temperature_trend),
        _ => {
            notices.push(format!(
                "No temperature data available for {} or Outdoor for plotting.",
                zone_label
            ));
            Vec::new()
        }
    };
    if dashboard.selected.is_empty() {
        notices.push(format!(
            "No data available for '{}' in '{}'.",
            measurement_label, zone_label
        ));
    }

    DashboardView {
        zones: dashboard.zones.clone(),
        measurements: dashboard.measurements.clone(),
        selected_zone: dashboard.selected_zone,
        selected_measurement: dashboard.selected_measurement,
        kpis: dashboard.kpis.as_ref().map(kpi_tiles).unwrap_or_default(),
        temperature_trend,
        selected_series: to_chartable(&dashboard.selected),
        notices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::query::Point;
    use chrono::NaiveDate;

    fn sample_result() -> TimeSeriesResult {
        let day = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let points = vec![
            Point {
                timestamp: day.and_hms_opt(0, 0, 0).unwrap(),
                value: Some(21.5),
            },
            Point {
                timestamp: day.and_hms_opt(1, 0, 0).unwrap(),
                value: None,
            },
        ];
        TimeSeriesResult {
            series: vec![
                Series::new(Zone::Z1, Measurement::Temperature, points.clone()),
                Series::new(Zone::Outdoor, Measurement::Co2, points),
            ],
        }
    }

    #[test]
    fn keeps_series_and_point_order() {
        let charts = to_chartable(&sample_result());
        assert_eq!(charts.len(), 2);
        assert_eq!(charts[0].name, "Z1 temperature (°C)");
        assert_eq!(charts[1].zone, Zone::Outdoor);
        assert_eq!(charts[0].x, vec!["2023-01-01 00:00:00", "2023-01-01 01:00:00"]);
        assert_eq!(charts[0].y, vec![Some(21.5), None]);
        assert_eq!(charts[0].summary.and_then(|s| s.mean), Some(21.5));
    }

    #[test]
    fn serialized_shape() {
        let json = serde_json::to_value(to_chartable(&sample_result())).unwrap();
        let first = &json[0];
        assert_eq!(first["zone"], "Z1");
        assert_eq!(first["measurement"], "temperature");
        assert_eq!(first["unit"], "°C");
        assert_eq!(first["y"][1], serde_json::Value::Null);
        assert_eq!(first["summary"]["countMissing"], 1);
        assert!(first["summary"].get("count_missing").is_none());
    }

    #[test]
    fn kpi_tiles_show_na_for_absent_values() {
        let tiles = kpi_tiles(&Kpis {
            zone: Zone::Z2,
            avg_outdoor_temperature: Some(4.0),
            avg_zone_temperature: None,
            max_zone_co2: Some(812.5),
        });
        assert_eq!(
            tiles,
            vec![
                KpiTile {
                    title: "Avg. Outdoor Temp (All Time)".to_string(),
                    value: "4.00 °C".to_string()
                },
                KpiTile {
                    title: "Avg. Z2 Temp (All Time)".to_string(),
                    value: "N/A".to_string()
                },
                KpiTile {
                    title: "Max Z2 CO2 (All Time)".to_string(),
                    value: "812.50 ppm".to_string()
                },
            ]
        );
    }

    #[test]
    fn comparison_lines_share_axis() {
        let trend = [DailyTemperature {
            date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            zone_mean: Some(21.0),
            outdoor_mean: None,
        }];
        let lines = comparison_chart(Zone::Z12And13, &trend);
        assert_eq!(lines[0].name, "Z12+13 Temp (°C)");
        assert_eq!(lines[1].name, "Outdoor Temp (°C)");
        assert_eq!(lines[0].x, lines[1].x);
        assert_eq!(lines[1].y, vec![None]);
    }

    #[test]
    fn empty_dashboard_explains_itself() {
        let view = dashboard_view(&Dashboard {
            zones: Vec::new(),
            measurements: Vec::new(),
            selected_zone: None,
            selected_measurement: None,
            kpis: None,
            temperature_trend: Vec::new(),
            selected: TimeSeriesResult::default(),
        });
        assert!(view.kpis.is_empty());
        assert_eq!(view.notices.len(), 3);
        assert_eq!(view.notices[2], "No data available for 'N/A' in 'N/A'.");
    }
}
