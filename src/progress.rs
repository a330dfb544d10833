//! Task progress file writer.
//!
//! The scheduler polls a per-task progress file for an integer between 0 and
//! 100. Updates are atomic (temp file, fsync, rename) so a reader never
//! observes a torn value.

use crate::error::{Result, RlinkError};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Write a progress value to the given file, clamped to 0-100.
pub fn set_progress<P: AsRef<Path>>(path: P, value: u32) -> Result<()> {
    let path = path.as_ref();
    let value = value.min(100);

    let parent = path.parent().unwrap_or(Path::new("."));
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| RlinkError::Resource("invalid progress file path".to_string()))?;
    let temp_path = parent.join(format!(".{}.tmp", filename));

    let mut file = File::create(&temp_path).map_err(|e| {
        RlinkError::Resource(format!(
            "failed to create progress temp file '{}': {}",
            temp_path.display(),
            e
        ))
    })?;
    writeln!(file, "{}", value).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        RlinkError::Resource(format!("failed to write progress value: {}", e))
    })?;
    file.sync_all().map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        RlinkError::Resource(format!("failed to sync progress file: {}", e))
    })?;

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        RlinkError::Resource(format!(
            "failed to replace progress file '{}': {}",
            path.display(),
            e
        ))
    })?;

    Ok(())
}

/// Read the current progress value, if the file exists and is well-formed.
pub fn read_progress<P: AsRef<Path>>(path: P) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse().ok()
}
