//! First-run materialization of the readings CSV into a SQLite store.
//!
//! The store is a derived cache: if the file exists it is opened as-is and the
//! CSV is never touched; otherwise it is built in a temporary file next to the
//! destination and moved into place only once fully populated.

use crate::config::{DEFAULT_BATCH_SIZE, DEFAULT_PROGRESS_EVERY};
use crate::db::models::NewReading;
use crate::services::ingest::{insert_readings, MAX_BATCH_SIZE};
use crate::services::normalize::{ColumnMap, HeaderError, RejectReason};
use crate::MIGRATIONS;
use csv::{ByteRecord, StringRecord};
use diesel::connection::SimpleConnection;
use diesel::migration::MigrationSource;
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use diesel::SqliteConnection;
use diesel_migrations::MigrationHarness;
use log::{debug, info, warn};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fatal failure of `ensure_store`. No store file is left behind when one is returned.
#[derive(Debug, Error)]
pub enum StoreInitError {
    #[error("cannot open CSV {origin}: {error}")]
    CsvOpen {
        origin: String,
        #[source]
        error: io::Error,
    },
    #[error("CSV read failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV header rejected: {0}")]
    Header(#[from] HeaderError),
    #[error("store path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),
    #[error("cannot create temporary store in {}: {error}", .dir.display())]
    TempFile {
        dir: PathBuf,
        #[source]
        error: io::Error,
    },
    #[error("cannot open store: {0}")]
    Connection(#[from] diesel::result::ConnectionError),
    #[error("store database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("store migration failed: {0}")]
    Migration(String),
    #[error("cannot move store into place at {}: {error}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        error: io::Error,
    },
    #[error("store at {} has an outdated schema; delete it to rebuild from CSV", .0.display())]
    OutdatedStore(PathBuf),
}

/// Where the raw CSV bytes come from. `open` may be called more than once per ingest.
pub trait CsvSource {
    /// Human-readable origin for logs and errors.
    fn describe(&self) -> String;
    fn open(&self) -> io::Result<Box<dyn Read + '_>>;
}

#[derive(Debug, Clone)]
pub struct CsvFile {
    path: PathBuf,
}

impl CsvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvFile { path: path.into() }
    }
}

impl CsvSource for CsvFile {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(File::open(&self.path)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestProgress {
    pub rows_processed: usize,
    pub rows_total: usize,
}

impl IngestProgress {
    pub fn percent(&self) -> f64 {
        if self.rows_total == 0 {
            100.0
        } else {
            self.rows_processed as f64 * 100.0 / self.rows_total as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Report progress every this many CSV rows (and once at the end).
    pub progress_every: usize,
    /// Readings per INSERT statement.
    pub batch_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        IngestOptions {
            progress_every: DEFAULT_PROGRESS_EVERY,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    /// 1-based line of the record in the CSV (header is line 1).
    pub line: u64,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub rows_total: usize,
    pub rows_processed: usize,
    pub readings_written: usize,
    pub rejected: Vec<RejectedRow>,
}

/// Open, read-only connection to a fully built store.
pub struct StoreHandle {
    path: PathBuf,
    conn: RefCell<SqliteConnection>,
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle").field("path", &self.path).finish_non_exhaustive()
    }
}

impl StoreHandle {
    /// Open an existing store. A store missing any migration is refused, never patched.
    pub fn open(path: &Path) -> Result<Self, StoreInitError> {
        let mut conn = SqliteConnection::establish(path_str(path)?)?;
        // read-only before the schema check, so a refused file is left as found
        conn.batch_execute("PRAGMA query_only = ON;")?;
        if !schema_is_current(&mut conn)? {
            return Err(StoreInitError::OutdatedStore(path.to_path_buf()));
        }
        Ok(StoreHandle {
            path: path.to_path_buf(),
            conn: RefCell::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&mut SqliteConnection) -> T) -> T {
        f(&mut self.conn.borrow_mut())
    }
}

const MIGRATIONS_TABLE: &str = "__diesel_schema_migrations";

#[derive(QueryableByName)]
struct AppliedVersion {
    #[diesel(sql_type = Text)]
    version: String,
}

/// True when every embedded migration is recorded as applied. Only reads:
/// the migration harness would create its bookkeeping table on a foreign file.
fn schema_is_current(conn: &mut SqliteConnection) -> Result<bool, StoreInitError> {
    let tracked: Vec<AppliedVersion> =
        diesel::sql_query("SELECT name AS version FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind::<Text, _>(MIGRATIONS_TABLE)
            .load(conn)?;
    if tracked.is_empty() {
        return Ok(false);
    }

    let applied: HashSet<String> = diesel::sql_query(format!("SELECT version FROM {MIGRATIONS_TABLE}"))
        .load::<AppliedVersion>(conn)?
        .into_iter()
        .map(|v| v.version)
        .collect();
    let embedded = MigrationSource::<Sqlite>::migrations(&MIGRATIONS)
        .map_err(|e| StoreInitError::Migration(e.to_string()))?;
    Ok(embedded
        .iter()
        .all(|m| applied.contains(&m.name().version().to_string())))
}

/// Writes one batch of readings inside the ingest transaction.
type InsertBatch<'f> = dyn FnMut(&mut SqliteConnection, &[NewReading<'static>]) -> QueryResult<usize> + 'f;

#[derive(Debug)]
pub struct EnsuredStore {
    pub handle: StoreHandle,
    /// `None` when an existing store was reused.
    pub ingest: Option<IngestReport>,
}

pub fn ensure_store(
    csv_path: &Path,
    store_path: &Path,
    options: &IngestOptions,
    progress: &mut dyn FnMut(IngestProgress),
) -> Result<EnsuredStore, StoreInitError> {
    ensure_store_from(&CsvFile::new(csv_path), store_path, options, progress)
}

pub fn ensure_store_from<S: CsvSource + ?Sized>(
    source: &S,
    store_path: &Path,
    options: &IngestOptions,
    progress: &mut dyn FnMut(IngestProgress),
) -> Result<EnsuredStore, StoreInitError> {
    if store_path.exists() {
        info!("Store: {} present; reusing it without reading the CSV", store_path.display());
        let handle = StoreHandle::open(store_path)?;
        return Ok(EnsuredStore { handle, ingest: None });
    }

    info!(
        "Store: {} not found; building it from {}",
        store_path.display(),
        source.describe()
    );
    let report = build_store(source, store_path, options, progress, &mut |conn, rows| {
        insert_readings(conn, rows)
    })?;
    info!(
        "Store: created {} (rows={}, readings={}, rejected={})",
        store_path.display(),
        report.rows_processed,
        report.readings_written,
        report.rejected.len()
    );

    let handle = StoreHandle::open(store_path)?;
    Ok(EnsuredStore {
        handle,
        ingest: Some(report),
    })
}

fn build_store<S: CsvSource + ?Sized>(
    source: &S,
    store_path: &Path,
    options: &IngestOptions,
    progress: &mut dyn FnMut(IngestProgress),
    insert: &mut InsertBatch<'_>,
) -> Result<IngestReport, StoreInitError> {
    let dir = store_dir(store_path);
    fs::create_dir_all(dir).map_err(|error| StoreInitError::TempFile {
        dir: dir.to_path_buf(),
        error,
    })?;
    // Removed on drop unless persisted, so every early return cleans up.
    let tmp = tempfile::Builder::new()
        .prefix(".netzero-")
        .suffix(".db.tmp")
        .tempfile_in(dir)
        .map_err(|error| StoreInitError::TempFile {
            dir: dir.to_path_buf(),
            error,
        })?;
    debug!("Store: staging into {}", tmp.path().display());

    let mut conn = SqliteConnection::establish(path_str(tmp.path())?)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| StoreInitError::Migration(e.to_string()))?;
    let report = conn.transaction(|conn| load_csv(conn, source, options, progress, insert))?;
    drop(conn);

    tmp.persist_noclobber(store_path)
        .map_err(|e| StoreInitError::Persist {
            path: store_path.to_path_buf(),
            error: e.error,
        })?;
    Ok(report)
}

fn load_csv<S: CsvSource + ?Sized>(
    conn: &mut SqliteConnection,
    source: &S,
    options: &IngestOptions,
    progress: &mut dyn FnMut(IngestProgress),
    insert: &mut InsertBatch<'_>,
) -> Result<IngestReport, StoreInitError> {
    let rows_total = count_records(source)?;
    let mut reader = csv_reader(open_source(source)?);
    let columns = ColumnMap::from_headers(reader.headers()?)?;
    if columns.is_long() {
        debug!("Ingest: long layout (timestamp, zone, measurement, value)");
    } else {
        debug!("Ingest: wide layout with {} mapped column(s)", columns.mapped_columns());
    }

    let every = options.progress_every.max(1);
    let batch_size = options.batch_size.clamp(1, MAX_BATCH_SIZE);
    let mut report = IngestReport {
        rows_total,
        ..IngestReport::default()
    };
    let mut seen = HashSet::new();
    let mut batch: Vec<NewReading<'static>> = Vec::with_capacity(batch_size);
    let mut raw = ByteRecord::new();

    // I/O and CSV structure errors abort; anything wrong inside one row only rejects that row
    while reader.read_byte_record(&mut raw)? {
        report.rows_processed += 1;
        let line = raw.position().map(|p| p.line()).unwrap_or_default();
        let outcome = StringRecord::from_byte_record(raw.clone())
            .map_err(|e| RejectReason::Undecodable(e.utf8_error().field()))
            .and_then(|record| columns.normalize(&record));

        match outcome {
            Ok(readings) => {
                let before = batch.len();
                let mut repeated_at = None;
                for reading in &readings {
                    if seen.insert(reading.key()) {
                        batch.push(NewReading::from(reading));
                    } else {
                        repeated_at = Some(reading.timestamp);
                    }
                }
                let kept = batch.len() - before;
                if let Some(ts) = repeated_at {
                    if kept == 0 {
                        debug!("Ingest: line {} repeats readings at {}", line, ts);
                        report.rejected.push(RejectedRow {
                            line,
                            reason: RejectReason::Duplicate(ts),
                        });
                    } else {
                        warn!(
                            "Ingest: line {} kept {} reading(s), dropped {} already seen at {}",
                            line,
                            kept,
                            readings.len() - kept,
                            ts
                        );
                    }
                }
            }
            Err(reason) => {
                debug!("Ingest: line {} rejected: {}", line, reason);
                report.rejected.push(RejectedRow { line, reason });
            }
        }

        if batch.len() >= batch_size {
            report.readings_written += flush(conn, &mut batch, batch_size, insert)?;
        }
        if report.rows_processed % every == 0 {
            progress(IngestProgress {
                rows_processed: report.rows_processed,
                rows_total: report.rows_total.max(report.rows_processed),
            });
        }
    }
    report.readings_written += flush(conn, &mut batch, batch_size, insert)?;

    // the file may have grown between the counting pass and this one
    report.rows_total = report.rows_total.max(report.rows_processed);
    progress(IngestProgress {
        rows_processed: report.rows_processed,
        rows_total: report.rows_total,
    });
    Ok(report)
}

/// One wide row can overshoot `batch_size`, so statements are cut to size here.
fn flush(
    conn: &mut SqliteConnection,
    batch: &mut Vec<NewReading<'static>>,
    batch_size: usize,
    insert: &mut InsertBatch<'_>,
) -> QueryResult<usize> {
    let mut written = 0;
    for chunk in batch.chunks(batch_size) {
        written += insert(conn, chunk)?;
    }
    batch.clear();
    Ok(written)
}

fn count_records<S: CsvSource + ?Sized>(source: &S) -> Result<usize, StoreInitError> {
    let mut reader = csv_reader(open_source(source)?);
    let mut record = ByteRecord::new();
    let mut total = 0usize;
    while reader.read_byte_record(&mut record)? {
        total += 1;
    }
    Ok(total)
}

fn csv_reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(input)
}

fn open_source<S: CsvSource + ?Sized>(source: &S) -> Result<Box<dyn Read + '_>, StoreInitError> {
    source.open().map_err(|error| StoreInitError::CsvOpen {
        origin: source.describe(),
        error,
    })
}

fn store_dir(store_path: &Path) -> &Path {
    match store_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn path_str(path: &Path) -> Result<&str, StoreInitError> {
    path.to_str().ok_or_else(|| StoreInitError::NonUtf8Path(path.to_path_buf()))
}


#[cfg(test)]
mod tests {
    use super::testing::{store_from_csv, MemorySource};
    use super::*;
    use crate::models::house::{Measurement, Zone};
    use crate::services::query::{query, Selection};
    use std::cell::Cell;
    use std::io::Cursor;

    const FIXTURE: &str = "tests/data/net_zero_house_sample.csv";

    /// Serves the full CSV on the first open (the counting pass) and a stream
    /// that breaks after `fail_after` bytes on every later open.
    struct FlakySource {
        data: Vec<u8>,
        fail_after: usize,
        opens: Cell<usize>,
    }

    struct FailAfter<'a> {
        inner: Cursor<&'a [u8]>,
        remaining: usize,
    }

    impl Read for FailAfter<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::other("device went away"));
            }
            let limit = buf.len().min(self.remaining);
            let n = self.inner.read(&mut buf[..limit])?;
            self.remaining -= n;
            Ok(n)
        }
    }

    impl CsvSource for FlakySource {
        fn describe(&self) -> String {
            "<flaky>".to_string()
        }

        fn open(&self) -> io::Result<Box<dyn Read + '_>> {
            self.opens.set(self.opens.get() + 1);
            if self.opens.get() == 1 {
                Ok(Box::new(Cursor::new(self.data.as_slice())))
            } else {
                Ok(Box::new(FailAfter {
                    inner: Cursor::new(self.data.as_slice()),
                    remaining: self.fail_after,
                }))
            }
        }
    }

    fn fixture() -> String {
        fs::read_to_string(FIXTURE).expect("fixture present")
    }

    fn everything() -> Selection {
        Selection::new(Zone::ALL, Measurement::ALL)
    }

    fn dir_entries(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn first_run_ingests_fixture_and_reports_rejects() {
        let dir = tempfile::tempdir().unwrap();
        let store = ensure_store(
            Path::new(FIXTURE),
            &dir.path().join("house.db"),
            &IngestOptions::default(),
            &mut |_| {},
        )
        .unwrap();

        let report = store.ingest.expect("first run ingests");
        assert_eq!(report.rows_total, 8);
        assert_eq!(report.rows_processed, 8);
        assert_eq!(report.readings_written, 7 * 9);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].line, 6);
        assert!(matches!(report.rejected[0].reason, RejectReason::BadTimestamp(_)));
    }

    #[test]
    fn second_run_reuses_store_without_reading_csv() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("house.db");
        let source = MemorySource::new(&fixture());

        let first = ensure_store_from(&source, &store_path, &IngestOptions::default(), &mut |_| {}).unwrap();
        assert!(first.ingest.is_some());
        let opens_after_first = source.opens.get();
        assert!(opens_after_first > 0);
        let first_result = query(&first.handle, &everything()).unwrap();
        drop(first);

        let second = ensure_store_from(&source, &store_path, &IngestOptions::default(), &mut |_| {}).unwrap();
        assert!(second.ingest.is_none());
        assert_eq!(source.opens.get(), opens_after_first);
        assert_eq!(query(&second.handle, &everything()).unwrap(), first_result);
    }

    #[test]
    fn reuse_does_not_need_the_csv_at_all() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("house.db");
        drop(store_from_csv(dir.path(), &fixture()));
        fs::rename(dir.path().join("readings.db"), &store_path).unwrap();

        let missing = dir.path().join("gone.csv");
        let store = ensure_store(&missing, &store_path, &IngestOptions::default(), &mut |_| {}).unwrap();
        assert!(store.ingest.is_none());
    }

    #[test]
    fn interrupted_ingest_leaves_no_store_and_next_run_starts_over() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("house.db");
        let data = fixture();
        // header plus roughly three rows get through before the stream breaks
        let fail_after = data.lines().take(4).map(|l| l.len() + 1).sum();
        let flaky = FlakySource {
            data: data.as_bytes().to_vec(),
            fail_after,
            opens: Cell::new(0),
        };

        let options = IngestOptions {
            progress_every: 1,
            batch_size: 2,
        };
        let err = ensure_store_from(&flaky, &store_path, &options, &mut |_| {}).unwrap_err();
        assert!(matches!(err, StoreInitError::Csv(_)), "unexpected error: {err}");
        assert!(!store_path.exists());
        assert_eq!(dir_entries(dir.path()), 0, "temporary store left behind");

        let source = MemorySource::new(&data);
        let retry = ensure_store_from(&source, &store_path, &IngestOptions::default(), &mut |_| {}).unwrap();
        assert!(retry.ingest.is_some());
        assert!(source.opens.get() > 0);
    }

    #[test]
    fn missing_csv_fails_without_creating_store() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("house.db");
        let err = ensure_store(
            &dir.path().join("nope.csv"),
            &store_path,
            &IngestOptions::default(),
            &mut |_| {},
        )
        .unwrap_err();

        assert!(matches!(err, StoreInitError::CsvOpen { .. }));
        assert!(!store_path.exists());
        assert_eq!(dir_entries(dir.path()), 0);
    }

    #[test]
    fn unusable_header_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("house.db");
        let source = MemorySource::new("when,what\n2023-01-01,1\n");
        let err = ensure_store_from(&source, &store_path, &IngestOptions::default(), &mut |_| {}).unwrap_err();
        assert!(matches!(err, StoreInitError::Header(HeaderError::MissingTimestamp)));
        assert!(!store_path.exists());
    }

    #[test]
    fn progress_reports_cadence_and_completion() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemorySource::new(&fixture());
        let options = IngestOptions {
            progress_every: 3,
            batch_size: 4,
        };
        let mut seen = Vec::new();
        ensure_store_from(&source, &dir.path().join("house.db"), &options, &mut |p| seen.push(p)).unwrap();

        let processed: Vec<usize> = seen.iter().map(|p| p.rows_processed).collect();
        assert_eq!(processed, vec![3, 6, 8]);
        assert!(seen.iter().all(|p| p.rows_total == 8));
        assert_eq!(seen.last().map(|p| p.percent()), Some(100.0));
    }

    #[test]
    fn duplicate_keys_keep_first_and_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let csv = "timestamp,zone,measurement,value\n\
                   2023-01-01T00:00,Z1,temperature,21.5\n\
                   2023-01-01T00:00,Z1,temperature,30.0\n";
        let store = store_from_csv(dir.path(), csv);

        let report = store.ingest.as_ref().unwrap();
        assert_eq!(report.readings_written, 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].line, 3);
        assert!(matches!(report.rejected[0].reason, RejectReason::Duplicate(_)));

        let result = query(&store.handle, &Selection::new([Zone::Z1], [Measurement::Temperature])).unwrap();
        assert_eq!(result.series[0].points[0].value, Some(21.5));
    }

    #[test]
    fn reused_store_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_from_csv(dir.path(), &fixture());
        let attempt = store.handle.with_conn(|conn| conn.batch_execute("DELETE FROM readings;"));
        assert!(attempt.is_err());
    }

    #[derive(QueryableByName)]
    struct TableName {
        #[diesel(sql_type = Text)]
        name: String,
    }

    fn table_names(path: &Path) -> Vec<String> {
        let mut conn = SqliteConnection::establish(path.to_str().unwrap()).unwrap();
        diesel::sql_query("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .load::<TableName>(&mut conn)
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect()
    }

    #[test]
    fn store_without_our_schema_is_refused_and_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("house.db");
        let mut conn = SqliteConnection::establish(store_path.to_str().unwrap()).unwrap();
        conn.batch_execute("CREATE TABLE something_else (id INTEGER);").unwrap();
        drop(conn);

        let source = MemorySource::new(&fixture());
        let err = ensure_store_from(&source, &store_path, &IngestOptions::default(), &mut |_| {}).unwrap_err();
        assert!(matches!(err, StoreInitError::OutdatedStore(_)));
        assert_eq!(source.opens.get(), 0);
        assert_eq!(table_names(&store_path), vec!["something_else"]);
    }

    #[test]
    fn store_missing_a_recorded_migration_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        drop(store_from_csv(dir.path(), &fixture()));
        let store_path = dir.path().join("readings.db");
        let mut conn = SqliteConnection::establish(store_path.to_str().unwrap()).unwrap();
        conn.batch_execute("DELETE FROM __diesel_schema_migrations;").unwrap();
        drop(conn);

        let err = StoreHandle::open(&store_path).unwrap_err();
        assert!(matches!(err, StoreInitError::OutdatedStore(_)));
    }

    #[test]
    fn undecodable_row_is_rejected_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("house.db");
        let mut csv = b"timestamp,zone,measurement,value\n2023-01-01T00:00,Z1,temperature,21.5\n".to_vec();
        csv.extend_from_slice(b"2023-01-01T01:00,Z1,temperature,2\xff\n");
        csv.extend_from_slice(b"2023-01-01T02:00,Z1,temperature,22.0\n");
        let source = MemorySource::from_bytes(csv);

        let store = ensure_store_from(&source, &store_path, &IngestOptions::default(), &mut |_| {}).unwrap();
        let report = store.ingest.as_ref().unwrap();
        assert_eq!(report.rows_processed, 3);
        assert_eq!(report.readings_written, 2);
        assert_eq!(
            report.rejected,
            vec![RejectedRow {
                line: 3,
                reason: RejectReason::Undecodable(3),
            }]
        );
    }

    #[test]
    fn alias_columns_do_not_turn_every_row_into_a_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let csv = "Timestamp,Z1_temp,Z1_temperature\n\
                   2023-01-01 00:00:00,21.5,99\n\
                   2023-01-01 01:00:00,21.7,99\n";
        let store = store_from_csv(dir.path(), csv);

        let report = store.ingest.as_ref().unwrap();
        assert_eq!(report.readings_written, 2);
        assert!(report.rejected.is_empty());
        let result = query(&store.handle, &Selection::new([Zone::Z1], [Measurement::Temperature])).unwrap();
        let values: Vec<_> = result.series[0].points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![Some(21.5), Some(21.7)]);
    }

    #[test]
    fn failed_write_mid_ingest_leaves_no_store() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("house.db");
        let source = MemorySource::new(&fixture());
        let options = IngestOptions {
            progress_every: 1,
            batch_size: 9,
        };
        let mut calls = 0;
        // the second batch is written twice, which trips the primary key
        let mut insert = |conn: &mut SqliteConnection, rows: &[NewReading<'static>]| {
            calls += 1;
            if calls == 2 {
                insert_readings(conn, rows)?;
            }
            insert_readings(conn, rows)
        };

        let err = build_store(&source, &store_path, &options, &mut |_| {}, &mut insert).unwrap_err();
        assert!(matches!(err, StoreInitError::Database(_)), "unexpected error: {err}");
        assert_eq!(calls, 2);
        assert!(!store_path.exists());
        assert_eq!(dir_entries(dir.path()), 0, "temporary store left behind");
    }

    #[test]
    fn oversized_batch_setting_is_capped() {
        let start = chrono::NaiveDate::from_ymd_opt(2023, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let mut csv = String::from("timestamp,zone,measurement,value\n");
        let rows = MAX_BATCH_SIZE + 10;
        for hour in 0..rows as i64 {
            let ts = start + chrono::Duration::hours(hour);
            csv.push_str(&format!("{},Z1,temperature,20.0\n", ts.format("%Y-%m-%d %H:%M:%S")));
        }
        let dir = tempfile::tempdir().unwrap();
        let options = IngestOptions {
            progress_every: 1000,
            batch_size: usize::MAX,
        };
        let store = ensure_store_from(
            &MemorySource::new(&csv),
            &dir.path().join("house.db"),
            &options,
            &mut |_| {},
        )
        .unwrap();
        assert_eq!(store.ingest.unwrap().readings_written, rows);
    }
}
