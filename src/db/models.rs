//! Diesel row structs for the `readings` table.
//!
//! Zone and measurement are stored as their canonical labels so the SQLite
//! file stays readable with any client.

use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::models::house::Reading;
use crate::schema;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = schema::readings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReadingRow {
    pub timestamp: NaiveDateTime,
    pub zone: String,
    pub measurement: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = schema::readings)]
#[diesel(treat_none_as_default_value = false)]
pub struct NewReading<'a> {
    pub timestamp: NaiveDateTime,
    pub zone: &'a str,
    pub measurement: &'a str,
    pub value: Option<f64>,
}

impl From<&Reading> for NewReading<'static> {
    fn from(reading: &Reading) -> Self {
        NewReading {
            timestamp: reading.timestamp,
            zone: reading.zone.as_str(),
            measurement: reading.measurement.as_str(),
            value: reading.value,
        }
    }
}
