use crate::db::models::NewReading;
use crate::schema;
use diesel::prelude::*;
use diesel::SqliteConnection;

/// SQLite's default cap on bound parameters per statement.
const SQLITE_MAX_VARIABLES: usize = 32_766;
const BINDS_PER_READING: usize = 4;
/// Largest batch `insert_readings` can send in a single statement.
pub const MAX_BATCH_SIZE: usize = SQLITE_MAX_VARIABLES / BINDS_PER_READING;

/// Insert one batch of readings. Keys are deduplicated by the caller, so a
/// conflict here is a genuine error and aborts the surrounding transaction.
pub fn insert_readings(conn: &mut SqliteConnection, rows: &[NewReading<'_>]) -> QueryResult<usize> {
    if rows.is_empty() {
        return Ok(0);
    }

    use schema::readings::dsl as R;

    diesel::insert_into(R::readings).values(rows).execute(conn)
}
