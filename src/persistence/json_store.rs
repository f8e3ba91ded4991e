//! JSON files with load-or-default reads and atomic writes

use std::io;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Read `path`, falling back to `T::default()` when it is missing or corrupt
pub fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match std::fs::read_to_string(path) {
        Ok(json) => match serde_json::from_str(&json) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to parse {}, using defaults: {}", path.display(), e);
                T::default()
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} not found, using defaults", path.display());
            T::default()
        }
        Err(e) => {
            warn!("Failed to read {}, using defaults: {}", path.display(), e);
            T::default()
        }
    }
}

/// Write `value` as pretty JSON through a temporary file and a rename, so a
/// crash mid-write never leaves `path` half written
pub fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    std::fs::write(&temp_path, json)?;
    std::fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let value: BTreeMap<String, bool> = load_or_default(&dir.path().join("none.json"));
        assert!(value.is_empty());
    }

    #[test]
    fn test_corrupt_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let value: BTreeMap<String, bool> = load_or_default(&path);
        assert!(value.is_empty());
    }

    #[test]
    fn test_write_replaces_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        write_atomic(&path, &BTreeMap::from([("A".to_string(), true)])).unwrap();
        write_atomic(&path, &BTreeMap::from([("B".to_string(), false)])).unwrap();

        let value: BTreeMap<String, bool> = load_or_default(&path);
        assert_eq!(value, BTreeMap::from([("B".to_string(), false)]));
        assert!(!dir.path().join("nested").join("state.json.tmp").exists());
    }
}
