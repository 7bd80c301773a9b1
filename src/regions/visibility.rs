//! Which calibrated regions the HUD draws.
//!
//! Visibility has its own lifecycle: a region may be calibrated but hidden.
//! Anything never set counts as hidden.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use super::json_file::{read_object, write_object};
use super::model::RegionKey;
use crate::error::PersistenceError;
use crate::paths;

/// Per-field visibility flags for one profile.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionVisibility(BTreeMap<RegionKey, bool>);

impl RegionVisibility {
    pub fn new() -> Self {
        Self::default()
    }

    /// True only when the field was explicitly switched on.
    pub fn is_visible(&self, key: RegionKey) -> bool {
        self.0.get(&key).copied().unwrap_or(false)
    }

    pub fn set(&mut self, key: RegionKey, visible: bool) {
        self.0.insert(key, visible);
    }

    /// Overlays every explicit flag from `patch` onto `self`.
    pub fn merge(&mut self, patch: &RegionVisibility) {
        for (k, v) in &patch.0 {
            self.0.insert(*k, *v);
        }
    }

    pub fn visible_keys(&self) -> impl Iterator<Item = RegionKey> + '_ {
        self.0.iter().filter(|(_, v)| **v).map(|(k, _)| *k)
    }
}

/// JSON-file backed visibility store, keyed by profile id.
pub struct RegionVisibilityStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RegionVisibilityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store at the default location, `<data_dir>/roi-visibility.json`.
    pub fn open_default() -> Self {
        Self::new(paths::get_visibility_path())
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Visibility for `profile_id`; all hidden when nothing is stored.
    pub fn get(&self, profile_id: &str) -> Result<RegionVisibility, PersistenceError> {
        let _guard = self.guard();
        let db = read_object(&self.path)?;
        Ok(db
            .get(profile_id)
            .and_then(|v| serde_json::from_value::<RegionVisibility>(v.clone()).ok())
            .unwrap_or_default())
    }

    /// Merges `patch` into the stored flags and returns the result.
    pub fn set(
        &self,
        profile_id: &str,
        patch: &RegionVisibility,
    ) -> Result<RegionVisibility, PersistenceError> {
        let _guard = self.guard();
        let mut db = read_object(&self.path)?;

        let mut current = db
            .get(profile_id)
            .and_then(|v| serde_json::from_value::<RegionVisibility>(v.clone()).ok())
            .unwrap_or_default();
        current.merge(patch);

        db.insert(profile_id.to_string(), serde_json::to_value(&current)?);
        write_object(&self.path, &db)?;
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_to_hidden() {
        let dir = tempdir().unwrap();
        let store = RegionVisibilityStore::new(dir.path().join("vis.json"));
        let vis = store.get("p").unwrap();
        for key in RegionKey::ALL {
            assert!(!vis.is_visible(key));
        }
    }

    #[test]
    fn test_set_merges_patch() {
        let dir = tempdir().unwrap();
        let store = RegionVisibilityStore::new(dir.path().join("vis.json"));

        let mut first = RegionVisibility::new();
        first.set(RegionKey::Exp, true);
        first.set(RegionKey::Lvl, true);
        store.set("p", &first).unwrap();

        let mut patch = RegionVisibility::new();
        patch.set(RegionKey::Lvl, false);
        let merged = store.set("p", &patch).unwrap();

        assert!(merged.is_visible(RegionKey::Exp));
        assert!(!merged.is_visible(RegionKey::Lvl));
        assert_eq!(store.get("p").unwrap(), merged);
        assert_eq!(merged.visible_keys().collect::<Vec<_>>(), vec![RegionKey::Exp]);
    }
}
