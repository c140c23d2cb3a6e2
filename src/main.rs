pub mod models {
    pub mod house;
}

pub mod config;
pub mod db {
    pub mod models;
}
pub mod schema;
pub mod services {
    pub mod chart;
    pub mod dashboard;
    pub mod ingest;
    pub mod normalize;
    pub mod query;
    pub mod sample_data;
    pub mod store;
}

use crate::config::Config;
use crate::services::store::{ensure_store, IngestProgress, IngestReport};
use crate::services::{chart, dashboard, sample_data};
use diesel_migrations::{embed_migrations, EmbeddedMigrations};
use log::{error, info, warn};
use std::fs::File;
use std::io::BufWriter;
use std::num::NonZeroU32;
use std::path::PathBuf;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Rejected rows listed individually before the summary is cut short.
const REJECTS_LOGGED: usize = 10;

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    env_file: Option<PathBuf>,
    generate_sample_days: Option<NonZeroU32>,
}

fn parse_args(args: impl IntoIterator<Item = std::ffi::OsString>) -> Result<CliArgs, String> {
    let mut args = args.into_iter();
    let mut cli = CliArgs::default();

    while let Some(arg) = args.next() {
        let arg = arg.into_string().map_err(|_| "argument contains invalid UTF-8".to_string())?;
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(value.to_string())),
            _ => (arg, None),
        };
        let mut value = || -> Result<String, String> {
            let v = match inline.clone() {
                Some(v) => v,
                None => args
                    .next()
                    .and_then(|v| v.into_string().ok())
                    .ok_or_else(|| format!("`{}` requires a value", flag))?,
            };
            if v.is_empty() {
                return Err(format!("`{}` requires a value", flag));
            }
            Ok(v)
        };

        match flag.as_str() {
            "--env-file" => {
                let path = value()?;
                if cli.env_file.replace(PathBuf::from(path)).is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
            }
            "--generate-sample" => {
                let days = value()?;
                let days = days
                    .parse::<NonZeroU32>()
                    .map_err(|_| format!("`--generate-sample` expects a positive number of days, got {:?}", days))?;
                if cli.generate_sample_days.replace(days).is_some() {
                    return Err("`--generate-sample` provided more than once".to_string());
                }
            }
            "--" => break,
            other => return Err(format!("unrecognised argument: {}", other)),
        }
    }
    Ok(cli)
}

fn generate_sample(cfg: &Config, days: NonZeroU32) -> Result<(), String> {
    // create_new refuses to clobber a real export
    let file = File::create_new(&cfg.csv_path)
        .map_err(|e| format!("cannot create sample CSV {}: {}", cfg.csv_path.display(), e))?;
    let rows = sample_data::write_sample_csv(
        BufWriter::new(file),
        cfg.sample_start_date,
        days.get(),
        sample_data::DEFAULT_SEED,
    )
    .map_err(|e| format!("writing sample CSV failed: {}", e))?;
    info!(
        "Sample data: wrote {} hourly row(s) from {} to {}",
        rows,
        cfg.sample_start_date,
        cfg.csv_path.display()
    );
    if cfg.store_path.exists() {
        warn!(
            "Sample data: store {} already exists and will be reused; delete it to ingest the sample",
            cfg.store_path.display()
        );
    }
    Ok(())
}

fn log_rejects(report: &IngestReport) {
    if report.rejected.is_empty() {
        return;
    }
    warn!(
        "Ingest: {} of {} row(s) had problems",
        report.rejected.len(),
        report.rows_processed
    );
    for row in report.rejected.iter().take(REJECTS_LOGGED) {
        warn!("Ingest: line {}: {}", row.line, row.reason);
    }
    if report.rejected.len() > REJECTS_LOGGED {
        warn!("Ingest: ... and {} more", report.rejected.len() - REJECTS_LOGGED);
    }
}

pub fn run(cfg: &Config) -> Result<(), String> {
    if !cfg.store_path.exists() && !cfg.csv_path.exists() {
        return Err(format!(
            "neither store {} nor CSV {} exists; provide the CSV (or run with --generate-sample <days>)",
            cfg.store_path.display(),
            cfg.csv_path.display()
        ));
    }

    let mut report_progress = |p: IngestProgress| {
        info!("Ingest: {}/{} rows ({:.0}%)", p.rows_processed, p.rows_total, p.percent());
    };
    let store = ensure_store(&cfg.csv_path, &cfg.store_path, &cfg.ingest_options(), &mut report_progress)
        .map_err(|e| format!("store initialisation failed: {}", e))?;
    if let Some(report) = &store.ingest {
        log_rejects(report);
    }

    let dash = dashboard::build_dashboard(&store.handle, &cfg.zone, &cfg.measurement)
        .map_err(|e| format!("building dashboard failed: {}", e))?;
    let view = chart::dashboard_view(&dash);
    for notice in &view.notices {
        info!("Dashboard: {}", notice);
    }

    let json = serde_json::to_string_pretty(&view).map_err(|e| format!("serializing dashboard failed: {}", e))?;
    println!("{}", json);
    Ok(())
}

fn main() {
    let cli = match parse_args(std::env::args_os().skip(1)) {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("fatal: {}", err);
            eprintln!("usage: net-zero-house [--env-file <path>] [--generate-sample <days>]");
            std::process::exit(1);
        }
    };

    let env_path = match &cli.env_file {
        Some(path) if !path.is_file() => {
            eprintln!("fatal: env file not found: {}", path.display());
            std::process::exit(1);
        }
        Some(path) => Some((path.clone(), true)),
        None => Some((PathBuf::from(".env"), false)).filter(|(p, _)| p.is_file()),
    };
    let loaded = match env_path.map(|(path, explicit)| config::load_env_file(&path).map(|n| (path, explicit, n))) {
        Some(Err(err)) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
        Some(Ok(loaded)) => Some(loaded),
        None => None,
    };

    // after the env file, so RUST_LOG from it is honoured
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some((path, explicit, applied)) = &loaded {
        let origin = if *explicit { "CLI-specified" } else { "default" };
        info!(
            "Environment loaded from {} .env file {} ({} variable(s) applied)",
            origin,
            path.display(),
            applied
        );
    }
    info!(
        "net-zero-house {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );

    let result = Config::from_env().and_then(|cfg| {
        info!(
            "Config loaded (csv={}, store={}, batch_size={}, progress_every={}, zone={}, measurement={})",
            cfg.csv_path.display(),
            cfg.store_path.display(),
            cfg.batch_size,
            cfg.progress_every,
            cfg.zone,
            cfg.measurement
        );
        if let Some(days) = cli.generate_sample_days {
            generate_sample(&cfg, days)?;
        }
        run(&cfg)
    });
    if let Err(e) = result {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
