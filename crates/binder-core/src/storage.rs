use crate::error::Result;
use atomic_write_file::AtomicWriteFile;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Read a JSON document, or `None` when the file is missing or unreadable.
///
/// Storage read failures never stop the application from starting, so every
/// failure here is logged and swallowed.
pub fn read_json(path: &Path) -> Option<Value> {
    if !path.exists() {
        return None;
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read file, using defaults");
            return None;
        }
    };

    // Handle empty files
    if content.trim().is_empty() {
        return None;
    }

    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt JSON, using defaults");
            None
        }
    }
}

/// Serialize `value` as pretty JSON and replace `path` atomically.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let serialized = serde_json::to_string_pretty(value)?;
    let mut file = AtomicWriteFile::open(path)?;
    file.write_all(serialized.as_bytes())?;
    file.commit()?;

    debug!(path = %path.display(), bytes = serialized.len(), "Wrote JSON");
    Ok(())
}
