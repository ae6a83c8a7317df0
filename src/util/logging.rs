//! Run log handling.
//!
//! Each run writes a fresh log file. The previous run's log is kept as a
//! single `.1` generation; anything older is discarded.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Default log file name, created in the working directory.
pub const DEFAULT_LOG_FILE: &str = "mlenv-setup.log";

/// Path of the retained previous generation (`<log>.1`).
pub fn rotated_path(log: &Path) -> PathBuf {
    let mut name = OsString::from(log.as_os_str());
    name.push(".1");
    PathBuf::from(name)
}

/// Move the current log aside, replacing any older `.1` generation.
pub fn rotate_log(log: &Path) -> Result<()> {
    if !log.exists() {
        return Ok(());
    }

    let previous = rotated_path(log);
    // rename(2) replaces an existing destination atomically on Linux.
    fs::rename(log, &previous).with_context(|| {
        format!(
            "failed to rotate log {} to {}",
            log.display(),
            previous.display()
        )
    })
}

/// Rotate and open a new, empty log for this run in append mode.
pub fn open_run_log(log: &Path) -> Result<File> {
    if let Some(parent) = log.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory: {}", parent.display()))?;
        }
    }

    rotate_log(log)?;

    // Truncate explicitly in case rotation raced with another writer.
    File::create(log).with_context(|| format!("failed to create log file: {}", log.display()))?;

    OpenOptions::new()
        .append(true)
        .open(log)
        .with_context(|| format!("failed to open log file: {}", log.display()))
}
