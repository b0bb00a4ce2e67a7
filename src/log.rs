//! Structured logging for conductor.
//!
//! Call sites use the `tracing` macros. This module installs the subscriber
//! that writes them to `~/.conductor/conductor.log`, truncated on startup.
//!
//! Log levels:
//! - ERROR: a run could not start (bad plan, bad registry)
//! - WARN: failed attempts, retries, task failures
//! - INFO: run start and finish, batch summaries
//! - DEBUG: routing decisions, group dispatch, task transitions
//!
//! Debug mode can be enabled with `--debug` or `CONDUCTOR_DEBUG=1`.
//! `CONDUCTOR_LOG` takes a full filter directive (e.g. `conductor=trace`)
//! and overrides both.

use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Environment variable that switches on debug logging.
pub const DEBUG_ENV: &str = "CONDUCTOR_DEBUG";

/// Environment variable holding an explicit filter directive.
pub const FILTER_ENV: &str = "CONDUCTOR_LOG";

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

/// Path of the log file, if a home directory exists.
pub fn log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".conductor").join("conductor.log"))
}

/// Initialize logging at INFO level.
pub fn init() {
    init_with_debug(false);
}

/// Initialize logging with explicit debug mode setting.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_with_debug(debug: bool) {
    let debug_enabled = debug || env_flag(std::env::var(DEBUG_ENV).ok().as_deref());
    DEBUG_ENABLED.store(debug_enabled, Ordering::SeqCst);

    let directive = filter_directive(debug_enabled, std::env::var(FILTER_ENV).ok());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let writer = match open_log_file() {
        Some(file) => BoxMakeWriter::new(Mutex::new(file)),
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}

/// Check if debug mode is enabled.
pub fn is_debug() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// The filter directive to install.
pub fn filter_directive(debug: bool, explicit: Option<String>) -> String {
    match explicit {
        Some(directive) if !directive.trim().is_empty() => directive,
        _ if debug => "debug".to_string(),
        _ => "info".to_string(),
    }
}

fn env_flag(value: Option<&str>) -> bool {
    value
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn open_log_file() -> Option<File> {
    let path = log_path()?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).ok()?;
    }
    // Truncate on startup.
    File::create(&path).ok()
}
