//! Runtime configuration from the process environment, plus the `.env` loader
//! that seeds it. Variables already present in the environment always win.

use crate::services::ingest::MAX_BATCH_SIZE;
use crate::services::store::IngestOptions;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

pub const DEFAULT_CSV_PATH: &str = "Net_zero_house_data.csv";
pub const DEFAULT_STORE_PATH: &str = "Net_zero_house_data.db";
pub const DEFAULT_PROGRESS_EVERY: usize = 1000;
pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_ZONE: &str = "Z1";
pub const DEFAULT_MEASUREMENT: &str = "temperature";
pub const DEFAULT_SAMPLE_START_DATE: &str = "2023-01-01";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Source export, only read when the store does not exist yet.
    pub csv_path: PathBuf,
    pub store_path: PathBuf,
    /// Report ingest progress every N CSV rows.
    pub progress_every: usize,
    /// Rows per INSERT statement.
    pub batch_size: usize,
    /// Initial dashboard selection; falls back to what the store has.
    pub zone: String,
    pub measurement: String,
    /// First day written by `--generate-sample`.
    pub sample_start_date: NaiveDate,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let sample_start_date = get("SAMPLE_START_DATE").unwrap_or_else(|| DEFAULT_SAMPLE_START_DATE.to_string());
        let sample_start_date = NaiveDate::parse_from_str(&sample_start_date, "%Y-%m-%d")
            .map_err(|_| "SAMPLE_START_DATE must be in YYYY-MM-DD format".to_string())?;

        Ok(Config {
            csv_path: get("CSV_PATH").unwrap_or_else(|| DEFAULT_CSV_PATH.to_string()).into(),
            store_path: get("STORE_PATH").unwrap_or_else(|| DEFAULT_STORE_PATH.to_string()).into(),
            progress_every: positive("INGEST_PROGRESS_EVERY", get("INGEST_PROGRESS_EVERY"), DEFAULT_PROGRESS_EVERY)?,
            batch_size: batch_size(get("INGEST_BATCH_SIZE"))?,
            zone: get("DASHBOARD_ZONE").unwrap_or_else(|| DEFAULT_ZONE.to_string()),
            measurement: get("DASHBOARD_MEASUREMENT").unwrap_or_else(|| DEFAULT_MEASUREMENT.to_string()),
            sample_start_date,
        })
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            progress_every: self.progress_every,
            batch_size: self.batch_size,
        }
    }
}

fn positive(key: &str, value: Option<String>, default: usize) -> Result<usize, String> {
    match value {
        None => Ok(default),
        Some(v) => match v.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(format!("{} must be a positive integer, got {:?}", key, v)),
        },
    }
}

fn batch_size(value: Option<String>) -> Result<usize, String> {
    let n = positive("INGEST_BATCH_SIZE", value, DEFAULT_BATCH_SIZE)?;
    if n > MAX_BATCH_SIZE {
        return Err(format!("INGEST_BATCH_SIZE must be at most {}, got {}", MAX_BATCH_SIZE, n));
    }
    Ok(n)
}

/// Load `KEY=value` lines from `path` into the process environment, skipping
/// keys that are already set. Returns how many variables were applied.
pub fn load_env_file(path: &Path) -> Result<usize, String> {
    let assignments = unset_only(read_env_file(path)?, |key| std::env::var_os(key).is_some());
    let applied = assignments.len();
    for (key, value) in assignments {
        // Mutating the environment is unsafe once other threads exist; we are still single-threaded here.
        unsafe {
            std::env::set_var(key, value);
        }
    }
    Ok(applied)
}

/// Every assignment in `path`, in file order. A later line for the same key wins.
fn read_env_file(path: &Path) -> Result<Vec<(String, String)>, String> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;

    let mut assignments: Vec<(String, String)> = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let parsed = parse_env_line(line).map_err(|e| format!("{}:{}: {}", path.display(), index + 1, e))?;
        if let Some((key, value)) = parsed {
            assignments.retain(|(k, _)| *k != key);
            assignments.push((key, value));
        }
    }
    Ok(assignments)
}

fn unset_only(assignments: Vec<(String, String)>, is_set: impl Fn(&str) -> bool) -> Vec<(String, String)> {
    assignments.into_iter().filter(|(key, _)| !is_set(key)).collect()
}

/// Parse one `.env` line. Blank lines and `#` comments yield `None`.
/// Supports an optional `export ` prefix and single or double quoted values.
fn parse_env_line(line: &str) -> Result<Option<(String, String)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

    let (key, raw) = line.split_once('=').ok_or("missing '=' in assignment")?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(format!("invalid variable name {:?}", key));
    }

    let raw = raw.trim();
    let value = match raw.chars().next() {
        Some(quote @ ('"' | '\'')) => {
            let inner = &raw[1..];
            let end = inner
                .find(quote)
                .ok_or_else(|| format!("unterminated {} quoted value", if quote == '"' { "double" } else { "single" }))?;
            let rest = inner[end + 1..].trim();
            if !rest.is_empty() && !rest.starts_with('#') {
                return Err("unexpected characters after closing quote".to_string());
            }
            let value = &inner[..end];
            if quote == '"' {
                value.replace("\\n", "\n").replace("\\t", "\t")
            } else {
                value.to_string()
            }
        }
        _ => raw.split(" #").next().unwrap_or_default().trim_end().to_string(),
    };
    Ok(Some((key.to_string(), value)))
}
