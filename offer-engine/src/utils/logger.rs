//! Logging Infrastructure
//!
//! Console output plus, when a log directory is given, three daily rolling
//! files under it:
//! - `app/`: everything except the audit and alert targets, pruned after 14 days
//! - `audit/`: one entry per activity-log row (target `audit`), never pruned
//! - `alert/`: operator channel for invariant breaks and failed rollbacks
//!   (target `alert`), never pruned

use chrono::{Local, NaiveDate};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, filter_fn};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

pub const AUDIT_TARGET: &str = "audit";
pub const ALERT_TARGET: &str = "alert";

/// Days an `app/` log file is kept
const APP_LOG_RETENTION_DAYS: i64 = 14;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn is_app_target(target: &str) -> bool {
    target != AUDIT_TARGET && target != ALERT_TARGET
}

fn daily_appender(dir: &Path, prefix: &str) -> anyhow::Result<RollingFileAppender> {
    fs::create_dir_all(dir)?;
    Ok(RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(dir)?)
}

fn console_layer(level: &str, json_format: bool) -> BoxedLayer {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .with_filter(filter)
            .boxed()
    }
}

fn file_layer(
    appender: RollingFileAppender,
    json_format: bool,
    max_level: LevelFilter,
    keep: fn(&str) -> bool,
) -> BoxedLayer {
    let filter = filter_fn(move |meta: &tracing::Metadata<'_>| {
        *meta.level() <= max_level && keep(meta.target())
    });
    let writer = std::sync::Mutex::new(appender);
    if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    }
}

/// Initialize the logging system
///
/// # Arguments
/// * `level` - Log level or filter directive (e.g. "info", "debug,sqlx=warn")
/// * `json_format` - JSON lines (production) instead of pretty output (development)
/// * `log_dir` - Optional directory for the rolling log files
///
/// # Examples
/// ```no_run
/// // Development setup (console only)
/// offer_engine::utils::logger::init_logger_with_file("debug", false, None)?;
///
/// // Production setup (console + files)
/// offer_engine::utils::logger::init_logger_with_file(
///     "info",
///     true,
///     Some(std::path::Path::new("./work_dir/logs")),
/// )?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&Path>,
) -> anyhow::Result<()> {
    let mut layers = vec![console_layer(level, json_format)];

    if let Some(dir) = log_dir {
        // Directive strings such as "info,sqlx=warn" fall back to INFO for files
        let max_level = level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);

        layers.push(file_layer(
            daily_appender(&dir.join("app"), "app")?,
            json_format,
            max_level,
            is_app_target,
        ));
        layers.push(file_layer(
            daily_appender(&dir.join("audit"), AUDIT_TARGET)?,
            json_format,
            max_level,
            |target| target == AUDIT_TARGET,
        ));
        layers.push(file_layer(
            daily_appender(&dir.join("alert"), ALERT_TARGET)?,
            json_format,
            LevelFilter::TRACE,
            |target| target == ALERT_TARGET,
        ));

        tokio::spawn(periodic_cleanup(dir.to_path_buf()));
    }

    tracing_subscriber::registry().with(layers).try_init()?;
    Ok(())
}

/// Initialize the logging system (console only)
pub fn init_logger(level: &str, json_format: bool) -> anyhow::Result<()> {
    init_logger_with_file(level, json_format, None)
}

/// Delete `app/` log files older than the retention window.
/// Audit and alert logs are never touched. Returns the number of files removed.
pub fn cleanup_old_logs(log_dir: &Path) -> anyhow::Result<usize> {
    let app_log_dir = log_dir.join("app");
    if !app_log_dir.exists() {
        return Ok(0);
    }

    let cutoff = (Local::now() - chrono::Duration::days(APP_LOG_RETENTION_DAYS)).date_naive();
    let mut removed = 0;
    for entry in fs::read_dir(app_log_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        // app.YYYY-MM-DD.log
        let Some(date) = name
            .strip_prefix("app.")
            .and_then(|rest| rest.strip_suffix(".log"))
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        else {
            continue;
        };
        if date < cutoff {
            fs::remove_file(&path)?;
            removed += 1;
            tracing::info!(file = %name, "Deleted old log file");
        }
    }
    Ok(removed)
}

/// Hourly cleanup of old application logs
async fn periodic_cleanup(log_dir: PathBuf) {
    use tokio::time::{Duration, sleep};

    loop {
        sleep(Duration::from_secs(3600)).await;

        if let Err(e) = cleanup_old_logs(&log_dir) {
            tracing::error!(error = %e, "Failed to cleanup old logs");
        }
    }
}
