//! Session logger. Every line goes to one file that is truncated at each
//! launch, so it only ever holds the most recent session.
//!
//! Default location (override the directory with `LAYERFORGE_LOG_DIR`):
//!   Windows:  `%APPDATA%\LayerForge\layerforge.log`
//!   Linux:    `~/.local/share/LayerForge/layerforge.log`
//!   macOS:    `~/Library/Application Support/LayerForge/layerforge.log`
//!
//! Call sites use `log_info!` / `log_warn!` / `log_err!`. Until [`init`]
//! runs (library use, unit tests) lines are dropped unless echo is on.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

static SINK: OnceLock<Sink> = OnceLock::new();
static ECHO: AtomicBool = AtomicBool::new(false);

struct Sink {
    path: PathBuf,
    file: Mutex<File>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info,
    Warn,
    Error,
    Panic,
}

impl Level {
    pub fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Panic => "PANIC",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Path of the open session log, once [`init`] has succeeded.
pub fn log_path() -> Option<&'static Path> {
    SINK.get().map(|s| s.path.as_path())
}

/// Mirror every line to stderr (the CLI's `--verbose`).
pub fn set_echo(enabled: bool) {
    ECHO.store(enabled, Ordering::Relaxed);
}

/// `[HH:MM:SS] [LEVEL] message`
pub fn format_line(level: Level, msg: &str) -> String {
    format!("[{}] [{}] {}", timestamp(), level, msg)
}

fn emit(line: &str) {
    if ECHO.load(Ordering::Relaxed) {
        eprintln!("{}", line);
    }
    // I/O failures are swallowed: logging must never fail an edit.
    if let Some(sink) = SINK.get()
        && let Ok(mut file) = sink.file.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

pub fn write(level: Level, msg: &str) {
    emit(&format_line(level, msg));
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Warn, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Error, &format!($($arg)*))
    };
}

/// Open (truncating) the session log in the default location and install
/// a panic hook that mirrors panics into it. Only the first call in a
/// process takes effect.
pub fn init() {
    init_at(&log_file_path());
}

pub fn init_at(path: &Path) {
    if SINK.get().is_some() {
        return;
    }
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let file = match OpenOptions::new().create(true).write(true).truncate(true).open(path) {
        Ok(f) => f,
        Err(e) => {
            // Not fatal: the session just runs without a log file.
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            return;
        }
    };
    if SINK
        .set(Sink {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
        .is_err()
    {
        return;
    }

    emit(&format!("=== LayerForge session started (unix {}) ===", unix_secs()));
    emit(&format!("Log file: {}", path.display()));

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write(Level::Panic, &info.to_string());
        prev(info);
    }));
}

fn log_file_path() -> PathBuf {
    if let Ok(dir) = std::env::var("LAYERFORGE_LOG_DIR") {
        return PathBuf::from(dir).join("layerforge.log");
    }
    data_dir().join("LayerForge").join("layerforge.log")
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// HH:MM:SS within the current UTC day.
fn timestamp() -> String {
    let secs = unix_secs();
    format!("{:02}:{:02}:{:02}", (secs % 86400) / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_format_carries_time_and_level() {
        let line = format_line(Level::Warn, "dropping layer");
        // "[HH:MM:SS] [WARN] dropping layer"
        assert_eq!(line.len(), "[00:00:00] [WARN] dropping layer".len());
        assert!(line.starts_with('['));
        assert!(line.ends_with("] [WARN] dropping layer"));
    }

    #[test]
    fn levels_order_by_severity() {
        assert!(Level::Info < Level::Warn);
        assert!(Level::Error < Level::Panic);
        assert_eq!(Level::Error.to_string(), "ERROR");
    }

    #[test]
    fn logging_without_init_is_silent() {
        // Must not panic or create files.
        crate::log_info!("no sink {}", 1);
        crate::log_err!("still no sink");
    }
}
