use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

/// Sibling temp path for `path`, unique per process so two writers never
/// share a temp file.
#[must_use]
pub fn temp_path(path: &Path) -> PathBuf {
  let name = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  path.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
}

/// Serialize `value` as pretty JSON and replace `path` atomically.
///
/// The data is written and synced to a temp file in the same directory,
/// then renamed over the target. Readers see either the old or the new
/// file, never a partial one. A crash before the rename leaves the old file
/// in place and orphans the temp file.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
  let mut data = serde_json::to_string_pretty(value)
    .with_context(|| format!("failed to serialize {}", path.display()))?;
  data.push('\n');
  write_atomic(path, data.as_bytes())
}

pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
  if let Some(dir) = path.parent()
    && !dir.as_os_str().is_empty()
  {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
  }

  let tmp = temp_path(path);
  let written = File::create(&tmp)
    .and_then(|mut file| {
      file.write_all(data)?;
      file.sync_all()
    })
    .with_context(|| format!("failed to write {}", tmp.display()));
  if let Err(err) = written {
    let _ = fs::remove_file(&tmp);
    return Err(err);
  }

  if let Err(err) = fs::rename(&tmp, path) {
    let _ = fs::remove_file(&tmp);
    return Err(err).with_context(|| format!("failed to replace {}", path.display()));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use tempfile::TempDir;

  #[test]
  fn writes_json_and_leaves_no_temp_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("state.json");
    write_json_atomic(&path, &json!({ "a": 1 })).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["a"], 1);
    assert!(!temp_path(&path).exists());
  }

  #[test]
  fn interrupted_write_keeps_previous_file_readable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    write_json_atomic(&path, &json!({ "version": 1 })).unwrap();

    // A writer that died after writing its temp file but before the rename.
    fs::write(temp_path(&path), b"{\"version\": 2, \"trunc").unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["version"], 1);

    // The next successful write replaces the orphan.
    write_json_atomic(&path, &json!({ "version": 3 })).unwrap();
    let value: serde_json::Value =
      serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["version"], 3);
    assert!(!temp_path(&path).exists());
  }
}
