//! Deterministic synthetic readings in the wide CSV layout, for demos and
//! for exercising the ingest path without the real export.

use crate::models::house::{Measurement, Zone, OUTDOOR_COLUMNS};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::io::Write;

pub const DEFAULT_SEED: u64 = 0x0420_1337_DEAD_BEEF;
const SAMPLE_ZONES: [Zone; 4] = [Zone::Z1, Zone::Z2, Zone::Z3, Zone::Z12And13];
const ZONE_SUFFIXES: [(&str, Measurement); 3] = [
    ("temp", Measurement::Temperature),
    ("humidity", Measurement::Humidity),
    ("CO2", Measurement::Co2),
];
/// Share of cells left blank to mimic sensor dropouts.
const BLANK_PROBABILITY: f64 = 0.01;

/// Write `days` of hourly rows starting at midnight of `start`. Returns the row count.
pub fn write_sample_csv<W: Write>(writer: W, start: NaiveDate, days: u32, seed: u64) -> Result<usize, csv::Error> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(header())?;

    let mut rng = SmallRng::seed_from_u64(seed);
    let first = start.and_time(NaiveTime::MIN);
    let hours = i64::from(days) * 24;

    for hour in 0..hours {
        let ts = first + Duration::hours(hour);
        out.write_record(row(ts, &mut rng))?;
        if ts.hour() == 0 && ts.day() == 1 {
            info!("Sample data: generating {:04}-{:02}", ts.year(), ts.month());
        }
    }
    out.flush()?;
    Ok(hours as usize)
}

fn header() -> Vec<String> {
    let mut header = vec!["Timestamp".to_string()];
    for zone in SAMPLE_ZONES {
        for (suffix, _) in ZONE_SUFFIXES {
            header.push(format!("{}_{}", zone, suffix));
        }
    }
    header.extend(OUTDOOR_COLUMNS.iter().map(|(name, _)| name.to_string()));
    header
}

fn row(ts: NaiveDateTime, rng: &mut SmallRng) -> Vec<String> {
    let day_fraction = ts.time().num_seconds_from_midnight() as f64 / 86_400.0;
    let annual_fraction = ts.ordinal0() as f64 / 365.0;
    let weekday = ts.weekday();

    let outside_temp = compute_outside_temp(day_fraction, annual_fraction, rng);
    let solar = compute_solar_radiation(day_fraction, annual_fraction, rng);

    let mut cells = vec![ts.format("%Y-%m-%d %H:%M:%S").to_string()];
    for (index, _) in SAMPLE_ZONES.iter().enumerate() {
        let zone_index = index as f64;
        let occupancy = routine_profile(day_fraction, weekday);
        let inside_temp = compute_inside_temp(outside_temp, day_fraction, zone_index, occupancy, rng);
        let humidity = compute_humidity(outside_temp, annual_fraction, zone_index, rng);
        let co2 = compute_co2(occupancy, zone_index, rng);
        for (_, measurement) in ZONE_SUFFIXES {
            let value = match measurement {
                Measurement::Temperature => inside_temp,
                Measurement::Humidity => humidity,
                _ => co2,
            };
            cells.push(cell(value, rng));
        }
    }

    for (_, measurement) in OUTDOOR_COLUMNS {
        let value = match measurement {
            Measurement::Temperature => outside_temp,
            Measurement::Humidity => (85.0 - outside_temp * 1.2 + rng.random_range(-5.0..=5.0)).clamp(20.0, 100.0),
            Measurement::Co2 => 415.0 + rng.random_range(0.0..=12.0),
            Measurement::WindSpeed => rng.random_range(0.0..=9.0),
            Measurement::WindDirection => rng.random_range(0.0..360.0),
            Measurement::BarometricPressure => 1013.0 + (annual_fraction * 2.0 * PI).sin() * 6.0 + rng.random_range(-4.0..=4.0),
            Measurement::Precipitation => {
                if rng.random_bool(0.08) {
                    rng.random_range(0.2..=4.0)
                } else {
                    0.0
                }
            }
            Measurement::SolarRadiation => solar,
        };
        cells.push(cell(value, rng));
    }
    cells
}

fn cell(value: f64, rng: &mut SmallRng) -> String {
    if rng.random_bool(BLANK_PROBABILITY) {
        String::new()
    } else {
        format!("{:.2}", value)
    }
}

fn compute_outside_temp(day_fraction: f64, annual_fraction: f64, rng: &mut SmallRng) -> f64 {
    // coldest around mid-January
    let seasonal = -((annual_fraction - 0.04) * 2.0 * PI).cos() * 13.0;
    let diurnal = ((day_fraction - 0.3) * 2.0 * PI).sin() * 5.0;
    let random_variation = rng.random_range(-1.8..=1.8);
    let cold_front = if rng.random_bool(0.02) {
        -rng.random_range(2.0..=5.0)
    } else {
        0.0
    };
    (7.0 + seasonal + diurnal + random_variation + cold_front).clamp(-25.0, 35.0)
}

fn compute_solar_radiation(day_fraction: f64, annual_fraction: f64, rng: &mut SmallRng) -> f64 {
    let daylight = ((day_fraction - 0.5) * PI * 2.0).cos().max(0.0);
    let seasonal = ((annual_fraction - 0.47) * 2.0 * PI).cos().mul_add(0.35, 0.65);
    let cloud_cover = rng.random_range(0.35..=1.0);
    (daylight * seasonal * 950.0 * cloud_cover).clamp(0.0, 1000.0)
}

fn compute_inside_temp(
    outside_temp: f64,
    day_fraction: f64,
    zone_index: f64,
    occupancy: f64,
    rng: &mut SmallRng,
) -> f64 {
    let setpoint = 21.0 + zone_index * 0.3;
    let losses = (setpoint - outside_temp).max(0.0) * rng.random_range(0.02..=0.06);
    let diurnal = ((day_fraction - 0.1) * 2.0 * PI).sin() * 0.6;
    let random = rng.random_range(-0.4..=0.4);
    (setpoint - losses + diurnal + occupancy * 0.4 + random).clamp(15.0, 28.0)
}

fn compute_humidity(outside_temp: f64, annual_fraction: f64, zone_index: f64, rng: &mut SmallRng) -> f64 {
    let seasonal = ((annual_fraction + 0.1) * 2.0 * PI).cos() * 8.0;
    let temperature_component = (18.0 - outside_temp).clamp(-12.0, 12.0) * -0.6;
    let zone_bias = (zone_index * 1.7).sin() * 3.0;
    let random = rng.random_range(-4.0..=4.0);
    (42.0 + seasonal + temperature_component + zone_bias + random).clamp(20.0, 70.0)
}

fn compute_co2(occupancy: f64, zone_index: f64, rng: &mut SmallRng) -> f64 {
    let zone_bias = (zone_index + 1.0).sin() * 40.0;
    let random = rng.random_range(-25.0..=25.0);
    (450.0 + occupancy * 220.0 + zone_bias + random).clamp(400.0, 2000.0)
}

fn routine_profile(day_fraction: f64, weekday: Weekday) -> f64 {
    let morning_peak = gaussian(day_fraction, 0.27, 0.045) * 1.8;
    let evening_peak = gaussian(day_fraction, 0.77, 0.05) * 2.0;
    let night = gaussian(day_fraction, 0.05, 0.08) * 1.2;
    let daytime = if is_weekend(weekday) {
        gaussian(day_fraction, 0.5, 0.12) * 1.0
    } else {
        0.0
    };
    morning_peak + evening_peak + night + daytime
}

fn gaussian(x: f64, center: f64, width: f64) -> f64 {
    let exponent = -((x - center) * (x - center)) / (2.0 * width * width);
    exponent.exp()
}

fn is_weekend(weekday: Weekday) -> bool {
    matches!(weekday, Weekday::Sat | Weekday::Sun)
}
