//! Tracing setup shared by the binaries.
//!
//! Log lines go to the console and, with timestamps and without colour, to a
//! mirror file that survives the session.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Opens `path` for appending, creating its directory first.
pub fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Installs the global subscriber. `RUST_LOG` overrides the `info` default.
///
/// An empty `log_file` disables the mirror. A mirror that cannot be opened
/// is reported once and the console keeps working.
pub fn init_tracing(log_file: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_target(false);

    let (mirror, failure) = if log_file.as_os_str().is_empty() {
        (None, None)
    } else {
        match open_log_file(log_file) {
            Ok(file) => (
                Some(
                    fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                ),
                None,
            ),
            Err(err) => (None, Some(err)),
        }
    };
    let mirrored = mirror.is_some();

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(mirror)
        .init();

    match failure {
        Some(err) => warn!("Log file {} unavailable: {}", log_file.display(), err),
        None if mirrored => info!("Logging to {}", log_file.display()),
        None => {}
    }
}
