//! Logging setup for cellmap with file output and optional stdout.
//!
//! Logs always go to a file at `warn` level, or at the level requested through the
//! environment. Stdout logging is enabled when `CELLMAP_LOG` or `RUST_LOG` is set, or in debug
//! builds.
//!
//! ## Environment Variables
//!
//! 1. **`CELLMAP_LOG`** (highest priority): `CELLMAP_LOG=debug` raises every cellmap crate,
//!    anything containing `=`, `:` or `,` is used as a full filter
//! 2. **`RUST_LOG`**: standard tracing filter
//! 3. **Default**: `warn` globally, `info` for cellmap crates
//!
//! ## Log File Location
//!
//! Default: `<data_local_dir>/cellmap/logs/cellmap-<pid>.log`, e.g.
//! `~/.local/share/cellmap/logs/cellmap-12345.log` on Linux.
//!
//! Override with `--log-file <path>`. A path with an extension names the file, anything else
//! names the directory.

use std::{
    env,
    path::{Path, PathBuf},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const CRATES: [&str; 3] = ["cellmap", "cellmap_bin", "cellmap_log"];

/// Returned from [`init`]; must be held alive to ensure log file flushing.
pub struct LogGuard {
    _file_guard: WorkerGuard,
    pub log_file: PathBuf,
}

#[derive(Debug, Default)]
pub struct LogConfig {
    pub log_file_path: Option<PathBuf>,
}

/// Initialize logging.
///
/// The returned [`LogGuard`] must be held for the lifetime of the program; dropping it flushes
/// and stops the background file writer.
pub fn init(config: LogConfig) -> Result<LogGuard, BoxError> {
    let (log_dir, filename) = resolve_log_path(config.log_file_path);
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(&log_dir, &filename);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_filter(create_file_filter());

    let stdout_enabled = env_filter_requested() || cfg!(debug_assertions);
    let stdout_layer = stdout_enabled.then(|| fmt::layer().with_filter(create_filter()));

    Registry::default()
        .with(file_layer)
        .with(stdout_layer)
        .try_init()?;

    Ok(LogGuard {
        _file_guard: file_guard,
        log_file: log_dir.join(filename),
    })
}

/// Initialize stdout logging for tests.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn test() {
    let _ = fmt()
        .with_env_filter(create_filter())
        .with_test_writer()
        .try_init();
}

fn env_filter_requested() -> bool {
    env::var("CELLMAP_LOG").is_ok() || env::var("RUST_LOG").is_ok()
}

fn resolve_log_path(override_path: Option<PathBuf>) -> (PathBuf, String) {
    let filename = format!("cellmap-{}.log", std::process::id());

    match override_path {
        Some(path) if path.extension().is_some() => {
            let dir = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."))
                .to_path_buf();
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or(filename);
            (dir, name)
        },
        Some(dir) => (dir, filename),
        None => {
            let dir = dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("cellmap")
                .join("logs");
            (dir, filename)
        },
    }
}

/// File filter: the requested level if any, otherwise `warn`.
fn create_file_filter() -> EnvFilter {
    if env_filter_requested() {
        return create_filter();
    }
    EnvFilter::new("warn")
}

/// Filter from `CELLMAP_LOG`, then `RUST_LOG`, then the default.
fn create_filter() -> EnvFilter {
    if let Ok(cellmap_log) = env::var("CELLMAP_LOG") {
        return EnvFilter::new(expand_cellmap_log(&cellmap_log));
    }
    if let Ok(rust_log) = env::var("RUST_LOG") {
        return EnvFilter::new(rust_log);
    }
    EnvFilter::new(expand_cellmap_log("info"))
}

/// `debug` becomes `warn,cellmap=debug,cellmap_bin=debug,...`; full filters pass through.
fn expand_cellmap_log(cellmap_log: &str) -> String {
    if cellmap_log.contains(['=', ':', ',']) {
        return cellmap_log.to_string();
    }

    let mut filter = String::from("warn");
    for krate in CRATES {
        filter.push_str(&format!(",{krate}={cellmap_log}"));
    }
    filter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_expands_to_all_crates() {
        assert_eq!(
            expand_cellmap_log("debug"),
            "warn,cellmap=debug,cellmap_bin=debug,cellmap_log=debug"
        );
    }

    #[test]
    fn full_filter_is_kept() {
        assert_eq!(expand_cellmap_log("cellmap=trace"), "cellmap=trace");
        assert_eq!(expand_cellmap_log("info,regex=off"), "info,regex=off");
    }

    #[test]
    fn file_override_names_the_file() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let path = tmp_dir.path().join("run.log");

        let (dir, name) = resolve_log_path(Some(path));
        assert_eq!(dir, tmp_dir.path());
        assert_eq!(name, "run.log");
    }

    #[test]
    fn directory_override_keeps_default_name() {
        let tmp_dir = tempfile::tempdir().unwrap();

        let (dir, name) = resolve_log_path(Some(tmp_dir.path().to_path_buf()));
        assert_eq!(dir, tmp_dir.path());
        assert_eq!(name, format!("cellmap-{}.log", std::process::id()));
    }

    #[test]
    fn bare_file_name_goes_to_current_dir() {
        let (dir, name) = resolve_log_path(Some(PathBuf::from("trace.log")));
        assert_eq!(dir, Path::new("."));
        assert_eq!(name, "trace.log");
    }
}
