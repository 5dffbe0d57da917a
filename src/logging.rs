//! Logging setup
//!
//! Console output is JSON or a compact human format. An optional log file
//! receives JSON lines through a non-blocking daily rolling appender.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LogFormat;

/// Filter from `RUST_LOG`, falling back to the configured level
pub fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

/// Daily rolling writer for `path` (`app.log` becomes `app.log.YYYY-MM-DD`).
///
/// The guard flushes buffered lines when dropped and must be kept alive for
/// the life of the process.
pub fn file_writer(path: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("Log file path has no file name: {}", path.display()))?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let appender = tracing_appender::rolling::daily(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

/// Install the global subscriber
pub fn init_tracing(
    log_level: &str,
    format: LogFormat,
    log_file: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    let console_layer = match format {
        LogFormat::Json => fmt::layer().json().with_filter(env_filter(log_level)).boxed(),
        LogFormat::Pretty => fmt::layer()
            .compact()
            .with_target(false)
            .with_filter(env_filter(log_level))
            .boxed(),
    };

    let registry = tracing_subscriber::registry().with(console_layer);

    match log_file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            let file_layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(env_filter(log_level));
            registry
                .with(file_layer)
                .try_init()
                .context("Failed to install tracing subscriber")?;
            eprintln!("Logging to file: {} (daily rotation)", path.display());
            Ok(Some(guard))
        }
        None => {
            registry
                .try_init()
                .context("Failed to install tracing subscriber")?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_file_writer_creates_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("proxy.log");

        let (mut writer, guard) = file_writer(&path).unwrap();
        writer.write_all(b"{\"msg\":\"hello\"}\n").unwrap();
        drop(writer);
        drop(guard);

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].file_name().to_string_lossy().to_string();
        assert!(name.starts_with("proxy.log"));

        let content = std::fs::read_to_string(entries[0].path()).unwrap();
        assert!(content.contains("hello"));
    }

    #[test]
    fn test_file_writer_rejects_directory_path() {
        assert!(file_writer(Path::new("/")).is_err());
    }
}
