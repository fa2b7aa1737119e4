// src/logging.rs
//
// Diagnostic output for the link: timestamped lines on stderr, mirrored into
// a per-run file when a log directory is configured.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Log file for the current run, if any.
#[doc(hidden)]
pub static LOG_FILE: Mutex<Option<File>> = Mutex::new(None);

/// Symlink kept pointing at the newest run's file.
const LATEST_LOG_NAME: &str = "wandi-link.log";

#[doc(hidden)]
pub fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}

/// Write one already-formatted line to stderr and the run's file.
#[doc(hidden)]
pub fn emit(line: &str) {
    eprintln!("{}", line);
    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(file) = guard.as_mut() {
            let _ = writeln!(file, "{}", line);
        }
    }
}

// Bypasses LOG_FILE; used while its lock is held or being swapped.
fn notice(msg: std::fmt::Arguments) {
    eprintln!("{} [logging] {}", timestamp(), msg);
}

fn run_file_name(now: chrono::DateTime<chrono::Local>) -> String {
    now.format("%Y%m%d-%H%M%S-wandi-link.log").to_string()
}

#[cfg(unix)]
fn point_latest(log_dir: &Path, file_name: &str) {
    let link = log_dir.join(LATEST_LOG_NAME);
    let _ = std::fs::remove_file(&link);
    if let Err(e) = std::os::unix::fs::symlink(file_name, &link) {
        notice(format_args!("could not update {}: {}", LATEST_LOG_NAME, e));
    }
}

#[cfg(not(unix))]
fn point_latest(_log_dir: &Path, _file_name: &str) {}

/// Start mirroring diagnostics into a new file under `log_dir`.
/// Returns the file's path. A file from an earlier call is closed.
pub fn init_file_logging(log_dir: &Path) -> Result<PathBuf, String> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| format!("Failed to create log dir {}: {}", log_dir.display(), e))?;

    let file_name = run_file_name(chrono::Local::now());
    let path = log_dir.join(&file_name);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("Failed to open log file {}: {}", path.display(), e))?;

    point_latest(log_dir, &file_name);

    let mut guard = LOG_FILE
        .lock()
        .map_err(|_| "log file lock poisoned".to_string())?;
    *guard = Some(file);
    drop(guard);

    notice(format_args!("writing to {}", path.display()));
    Ok(path)
}

/// Close the run's file. Safe to call when none is open.
pub fn stop_file_logging() {
    let closed = LOG_FILE
        .lock()
        .map(|mut guard| guard.take().is_some())
        .unwrap_or(false);
    if closed {
        notice(format_args!("log file closed"));
    }
}

pub fn file_logging_active() -> bool {
    LOG_FILE.lock().map(|g| g.is_some()).unwrap_or(false)
}

/// `eprintln!`-style logging with a `HH:MM:SS.mmm` prefix, mirrored to the
/// run's log file when one is open.
#[macro_export]
macro_rules! tlog {
    ($($arg:tt)*) => {
        $crate::logging::emit(&format!("{} {}", $crate::logging::timestamp(), format_args!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_file_name() {
        let at = chrono::Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(run_file_name(at), "20240309-070501-wandi-link.log");
    }

    #[test]
    fn test_file_logging_lifecycle() {
        let dir = std::env::temp_dir().join(format!("wandi-link-log-{}", std::process::id()));
        let path = init_file_logging(&dir).unwrap();
        assert!(file_logging_active());

        crate::tlog!("[test] link {} up", 1);

        stop_file_logging();
        assert!(!file_logging_active());
        stop_file_logging();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[test] link 1 up"));
        #[cfg(unix)]
        assert_eq!(
            std::fs::read_link(dir.join(LATEST_LOG_NAME)).unwrap(),
            PathBuf::from(path.file_name().unwrap())
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
