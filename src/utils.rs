//! Small helpers for logging and file system checks.

use crate::error::{Error, Result};
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a character boundary) with
/// `"…(+N bytes)"` appended.
///
/// # Examples
///
/// ```
/// use mediekompas::utils::truncate_for_log;
///
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Create `path` if needed and check that a file can be written in it.
///
/// Used before a batch starts so an unwritable export destination fails
/// before any outlet is fetched.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<()> {
    let failure = |e: std::io::Error| Error::ExportFailure {
        path: path.display().to_string(),
        reason: e.to_string(),
    };

    fs::create_dir_all(path).await.map_err(failure)?;
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path).map_err(failure)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}
