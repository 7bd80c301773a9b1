//! Per-profile region persistence.
//!
//! The whole store is one JSON document keyed by profile id. Every operation
//! is a read-modify-write of that document under the store's own lock, so
//! concurrent writers (sampler refresh, calibration saves) never interleave.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde_json::{Map, Value};

use super::json_file::{read_object, write_object};
use super::model::{migrate_legacy, Region, RegionKey, RegionSet};
use crate::error::PersistenceError;
use crate::paths;

/// JSON-file backed store of `RegionSet`s.
pub struct RegionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RegionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store at the default location, `<data_dir>/rois.json`.
    pub fn open_default() -> Self {
        Self::new(paths::get_regions_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reads the region set for `profile_id`.
    ///
    /// Legacy two-field sets are migrated and written back once.
    pub fn get(&self, profile_id: &str) -> Result<Option<RegionSet>, PersistenceError> {
        let _guard = self.guard();
        let mut db = read_object(&self.path)?;

        let Some(Value::Object(entry)) = db.get_mut(profile_id) else {
            return Ok(None);
        };

        if migrate_legacy(entry) {
            let set = RegionSet::from_json_object(entry);
            log::info!("[regions] migrated legacy regions for profile {}", profile_id);
            db.insert(profile_id.to_string(), Value::Object(set.to_json_object()));
            write_object(&self.path, &db)?;
            return Ok(Some(set));
        }

        Ok(Some(RegionSet::from_json_object(entry)))
    }

    /// Replaces the region set for `profile_id`. Values are clamped before writing.
    pub fn set(&self, profile_id: &str, regions: &RegionSet) -> Result<(), PersistenceError> {
        let _guard = self.guard();
        let mut db = read_object(&self.path)?;
        db.insert(
            profile_id.to_string(),
            Value::Object(regions.clamped().to_json_object()),
        );
        write_object(&self.path, &db)
    }

    /// Deletes every region stored for `profile_id`.
    pub fn remove(&self, profile_id: &str) -> Result<(), PersistenceError> {
        let _guard = self.guard();
        let mut db = read_object(&self.path)?;
        if db.remove(profile_id).is_some() {
            write_object(&self.path, &db)?;
        }
        Ok(())
    }

    /// Returns every stored profile's (migrated) region set.
    pub fn list_all(&self) -> Result<BTreeMap<String, RegionSet>, PersistenceError> {
        let _guard = self.guard();
        let db = read_object(&self.path)?;
        Ok(db
            .into_iter()
            .filter_map(|(profile, value)| match value {
                Value::Object(mut entry) => {
                    migrate_legacy(&mut entry);
                    Some((profile, RegionSet::from_json_object(&entry)))
                }
                _ => None,
            })
            .collect())
    }

    /// Sets (or with `None`, removes) one key, keeping all sibling keys.
    pub fn patch(
        &self,
        profile_id: &str,
        key: RegionKey,
        region: Option<Region>,
    ) -> Result<RegionSet, PersistenceError> {
        self.modify(profile_id, |set| {
            match region {
                Some(r) => {
                    set.insert(key, r);
                }
                None => {
                    set.remove(key);
                }
            };
        })
    }

    /// Writes the result of a calibration session.
    ///
    /// Only `allowed` keys are touched: each is replaced by the incoming region
    /// or removed if the incoming set lacks it. Every other stored key is kept,
    /// so recalibrating `rmExp` alone never drops `exp`, `lvl` or `charname`.
    pub fn apply_calibration(
        &self,
        profile_id: &str,
        incoming: &RegionSet,
        allowed: &[RegionKey],
    ) -> Result<RegionSet, PersistenceError> {
        self.modify(profile_id, |set| {
            for &key in allowed {
                match incoming.get(key) {
                    Some(r) => {
                        set.insert(key, r);
                    }
                    None => {
                        set.remove(key);
                    }
                }
            }
        })
    }

    fn modify<F>(&self, profile_id: &str, f: F) -> Result<RegionSet, PersistenceError>
    where
        F: FnOnce(&mut RegionSet),
    {
        let _guard = self.guard();
        let mut db = read_object(&self.path)?;

        let mut set = match db.get_mut(profile_id) {
            Some(Value::Object(entry)) => {
                migrate_legacy(entry);
                RegionSet::from_json_object(entry)
            }
            _ => RegionSet::new(),
        };
        f(&mut set);

        db.insert(profile_id.to_string(), Value::Object(set.to_json_object()));
        write_object(&self.path, &db)?;
        Ok(set)
    }

    /// Raw stored document, for diagnostics.
    pub fn raw(&self) -> Result<Map<String, Value>, PersistenceError> {
        let _guard = self.guard();
        read_object(&self.path)
    }
}
