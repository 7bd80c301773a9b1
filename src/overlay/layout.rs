//! Placement of each role's control panel inside its host.
//!
//! The panel keeps a fixed offset from the host's top-left corner and its
//! own size, both chosen by the user and persisted per role in
//! `<data_dir>/hud-layout.json`.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::capture::ScreenRect;
use crate::error::PersistenceError;
use crate::paths;
use crate::regions::json_file::{read_object, write_object};
use crate::role::OverlayRole;

pub const PANEL_MIN_WIDTH: i32 = 160;
pub const PANEL_MIN_HEIGHT: i32 = 60;

/// Offset and size of a control panel relative to its host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelBox {
    pub x: i32,
    pub y: i32,
    /// 0 means the minimum width
    pub width: i32,
    /// 0 means the minimum height
    pub height: i32,
}

impl Default for PanelBox {
    fn default() -> Self {
        Self {
            x: 14,
            y: 14,
            width: 0,
            height: 0,
        }
    }
}

impl PanelBox {
    /// Screen rectangle of the panel over `host`. Negative offsets are
    /// treated as 0 and the size never drops below the minimum.
    pub fn bounds_in(&self, host: ScreenRect) -> ScreenRect {
        ScreenRect::new(
            host.x + self.x.max(0),
            host.y + self.y.max(0),
            self.width.max(PANEL_MIN_WIDTH),
            self.height.max(PANEL_MIN_HEIGHT),
        )
    }
}

/// JSON-file backed panel boxes, keyed by role.
pub struct PanelLayoutStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl PanelLayoutStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store at the default location, `<data_dir>/hud-layout.json`.
    pub fn open_default() -> Self {
        Self::new(paths::get_panel_layout_path())
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The stored box for `role`, or the default one.
    pub fn get(&self, role: OverlayRole) -> Result<PanelBox, PersistenceError> {
        let _guard = self.guard();
        let db = read_object(&self.path)?;
        Ok(db
            .get(role.as_str())
            .and_then(|v| serde_json::from_value::<PanelBox>(v.clone()).ok())
            .unwrap_or_default())
    }

    pub fn set(&self, role: OverlayRole, panel: &PanelBox) -> Result<(), PersistenceError> {
        let _guard = self.guard();
        let mut db = read_object(&self.path)?;
        db.insert(role.as_str().to_string(), serde_json::to_value(panel)?);
        write_object(&self.path, &db)
    }
}
