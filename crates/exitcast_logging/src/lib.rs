//! Shared logging setup for the exitcast binary.
//!
//! Every stage invocation logs to stderr and to a daily file under
//! `$EXITCAST_HOME/logs` (default `~/.exitcast/logs`), so a scheduler that
//! discards stderr still leaves a trail of drop counts and integrity warnings.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "exitcast=info,exitcast_db=info,exitcast_security=info";
const VERBOSE_LOG_FILTER: &str = "exitcast=debug,exitcast_db=debug,exitcast_security=debug";

/// Daily files kept per application.
const MAX_LOG_FILES: usize = 14;

/// Logging configuration for one process.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Mirror debug output to stderr
    pub verbose: bool,
    /// Override the log directory (defaults to [`logs_dir`])
    pub log_dir: Option<&'a Path>,
}

/// Keeps the background file writer alive. Buffered lines are flushed when
/// this is dropped, so hold it until the process exits.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: WorkerGuard,
}

/// Initialize tracing with a daily rolling file and stderr output.
pub fn init_logging(config: LogConfig<'_>) -> Result<LogGuard> {
    let log_dir = match config.log_dir {
        Some(dir) => dir.to_path_buf(),
        None => ensure_logs_dir().context("Failed to ensure log directory")?,
    };
    let appender = file_appender(&log_dir, config.app_name)?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console_filter = if config.verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(LogGuard { _file: guard })
}

fn file_appender(dir: &Path, app_name: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(sanitize_name(app_name))
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(dir)
        .with_context(|| format!("Failed to open log files in {}", dir.display()))
}

/// Get the exitcast home directory: `$EXITCAST_HOME` or `~/.exitcast`.
pub fn exitcast_home() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var("EXITCAST_HOME") {
        return Ok(PathBuf::from(override_path));
    }
    dirs::home_dir()
        .map(|home| home.join(".exitcast"))
        .context("Could not determine home directory; set EXITCAST_HOME")
}

/// Get the logs directory: `<home>/logs`
pub fn logs_dir() -> Result<PathBuf> {
    Ok(exitcast_home()?.join("logs"))
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir()?;
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// File-name safe form of an application name.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_appender_writes_prefixed_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut appender = file_appender(tmp.path(), "exitcast run").unwrap();
        appender.write_all(b"extract finished\n").unwrap();
        appender.flush().unwrap();

        let names: Vec<String> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("exitcast_run."));
        assert!(names[0].ends_with(".log"));
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("exitcast run/1"), "exitcast_run_1");
    }
}
