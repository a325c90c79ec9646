//! Flat JSON state files.
//!
//! Every piece of persisted state (rules, registry, admins, identity map) is a
//! single JSON document on disk. Reads create the file with a default when it
//! is missing; writes replace the file atomically via a sibling temp file.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Serialize};

use crate::{errors::Error, Result};

/// Load `path`, writing `default` to it first if it does not exist.
///
/// An existing file that cannot be parsed is an [`Error::State`]; callers treat
/// that as fatal at startup.
pub fn load_or_init<T>(path: &Path, default: impl FnOnce() -> T) -> Result<T>
where
    T: DeserializeOwned + Serialize,
{
    if !path.exists() {
        let value = default();
        write_atomic(path, &value)?;
        return Ok(value);
    }
    load_existing(path)
}

/// Load an existing state file; an empty file is treated as corrupt.
pub fn load_existing<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let txt = fs::read_to_string(path)?;
    if txt.trim().is_empty() {
        return Err(state_error(path, "file is empty"));
    }
    serde_json::from_str(&txt).map_err(|e| state_error(path, &e.to_string()))
}

/// Serialize `value` and atomically replace `path` with it.
pub fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let txt = serde_json::to_string_pretty(value)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    fs::write(&tmp, txt)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn state_error(path: &Path, reason: &str) -> Error {
    Error::State {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn missing_file_is_created_with_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let v: BTreeMap<String, i32> = load_or_init(&path, || BTreeMap::from([("a".into(), 1)])).unwrap();
        assert_eq!(v.get("a"), Some(&1));
        assert!(path.exists());

        let again: BTreeMap<String, i32> = load_or_init(&path, BTreeMap::new).unwrap();
        assert_eq!(again, v);
    }

    #[test]
    fn corrupt_file_is_a_state_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();

        let err = load_or_init::<BTreeMap<String, i32>>(&path, BTreeMap::new).unwrap_err();
        assert!(matches!(err, Error::State { .. }));
    }

    #[test]
    fn write_atomic_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state.json");
        write_atomic(&path, &vec![1, 2, 3]).unwrap();

        assert!(path.exists());
        assert!(!tmp_path(&path).exists());
        let back: Vec<i32> = load_existing(&path).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }
}
