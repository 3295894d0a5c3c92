//! File logging for debug runs.
//!
//! Output goes to `<log_path>/repo-sight.YYYY-MM-DD`, rotated daily in local
//! time. Nothing is written to stdout, which carries JSON results only.

use anyhow::{Context, Result};
use logroller::{LogRollerBuilder, Rotation, RotationAge, TimeZone};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use time::macros::format_description;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, time::OffsetTime};
use tracing_subscriber::prelude::*;

use crate::config::Config;

const LOG_PREFIX: &str = "repo-sight";
const RETENTION_DAYS: u64 = 3;

pub fn init(config: &Config) -> Result<()> {
    fs::create_dir_all(&config.log_path).with_context(|| {
        format!("Failed to create log directory: {}", config.log_path.display())
    })?;
    cleanup_old_logs(&config.log_path)?;

    let (writer, guard) = tracing_appender::non_blocking(roller(&config.log_path)?);

    let offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = OffsetTime::new(
        offset,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    );

    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(timer);

    tracing_subscriber::registry()
        .with(filter())
        .with(layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set global subscriber: {e}"))?;

    // Writer must outlive every span; the process owns it until exit.
    std::mem::forget(guard);
    Ok(())
}

fn roller(log_path: &Path) -> Result<impl std::io::Write + Send + 'static> {
    LogRollerBuilder::new(log_path, Path::new(LOG_PREFIX))
        .rotation(Rotation::AgeBased(RotationAge::Daily))
        .time_zone(TimeZone::Local)
        .max_keep_files(RETENTION_DAYS as _)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create log roller: {e}"))
}

/// `RUST_LOG` wins; otherwise this crate at debug and dependencies at info.
fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{}=debug,info", env!("CARGO_CRATE_NAME"))))
}

fn is_log_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_PREFIX))
}

/// Remove `repo-sight.*` files older than the retention window.
/// A missing directory is not an error.
pub fn cleanup_old_logs(log_path: &Path) -> Result<()> {
    let Ok(entries) = fs::read_dir(log_path) else {
        return Ok(());
    };
    let cutoff = SystemTime::now() - Duration::from_secs(RETENTION_DAYS * 24 * 60 * 60);

    for entry in entries.flatten() {
        let path = entry.path();
        if !is_log_file(&path) {
            continue;
        }
        let stale = entry
            .metadata()
            .and_then(|m| m.modified())
            .is_ok_and(|modified| modified < cutoff);
        if stale {
            let _ = fs::remove_file(&path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn age(path: &Path, days: u64) {
        let secs = (SystemTime::now() - Duration::from_secs(days * 24 * 60 * 60))
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let stamp = libc::timespec {
            tv_sec: secs as libc::time_t,
            tv_nsec: 0,
        };
        let times = [stamp, stamp];
        let c_path = std::ffi::CString::new(path.to_str().unwrap()).unwrap();
        let ret = unsafe { libc::utimensat(libc::AT_FDCWD, c_path.as_ptr(), times.as_ptr(), 0) };
        assert_eq!(ret, 0, "utimensat failed: {}", std::io::Error::last_os_error());
    }

    #[test]
    fn test_cleanup_keeps_recent_and_foreign_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let log_path = dir.path();

        let stale = log_path.join("repo-sight.2026-01-01");
        let fresh = log_path.join("repo-sight.2026-10-15");
        let foreign = log_path.join("other-app.log");
        let subdir = log_path.join("repo-sight.archive");
        for file in [&stale, &fresh, &foreign] {
            fs::write(file, "log").unwrap();
        }
        fs::create_dir(&subdir).unwrap();
        age(&stale, 4);
        age(&foreign, 10);

        cleanup_old_logs(log_path).unwrap();

        assert!(!stale.exists());
        assert!(fresh.exists());
        assert!(foreign.exists());
        assert!(subdir.exists());
    }

    #[test]
    fn test_cleanup_missing_dir_is_ok() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(cleanup_old_logs(&dir.path().join("absent")).is_ok());
    }

    #[test]
    fn test_init_creates_log_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config {
            log_path: dir.path().join("logs"),
            ..Config::default()
        };
        // A second global subscriber may already be installed by another test.
        let _ = init(&config);
        assert!(config.log_path.is_dir());
    }
}
