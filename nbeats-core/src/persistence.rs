//! Atomic file writes for logs and forecast tables.

use std::io::{self, Write};
use std::path::Path;

/// Atomically write JSON data to a file.
///
/// Writes to a `.tmp` sibling, then renames over the target. Creates parent
/// directories if they don't exist.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    atomic_write(path, json.as_bytes())
}

/// Atomically write raw bytes to a file.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Append one JSON document as a line to `path`, creating it if needed.
pub fn append_json_line<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut line = serde_json::to_string(data).map_err(io::Error::other)?;
    line.push('\n');
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(line.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("dir").join("test.json");
        atomic_write_json(&path, &json!({"a": 1})).unwrap();
        let loaded: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded["a"], 1);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_append_json_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.jsonl");
        append_json_line(&path, &json!({"step": 1})).unwrap();
        append_json_line(&path, &json!({"step": 2})).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.ends_with("{\"step\":2}\n"));
    }
}
