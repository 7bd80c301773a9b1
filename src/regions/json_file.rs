//! Whole-file JSON helpers shared by the region and layout stores.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::PersistenceError;

/// Reads a JSON object from `path`.
///
/// A missing file is an empty object. A file that is not a JSON object is
/// logged and also treated as empty, so a corrupt store never blocks callers.
pub fn read_object(path: &Path) -> Result<Map<String, Value>, PersistenceError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
        Err(e) => {
            return Err(PersistenceError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    match serde_json::from_str::<Value>(&contents) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => {
            log::warn!("[regions] {} is not a JSON object, ignoring it", path.display());
            Ok(Map::new())
        }
        Err(e) => {
            log::warn!("[regions] failed to parse {}: {}. Ignoring it", path.display(), e);
            Ok(Map::new())
        }
    }
}

/// Writes `map` to `path` as pretty-printed JSON, creating parent directories.
pub fn write_object(path: &Path, map: &Map<String, Value>) -> Result<(), PersistenceError> {
    let io_err = |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let json = serde_json::to_string_pretty(map)?;
    fs::write(path, json).map_err(io_err)
}
