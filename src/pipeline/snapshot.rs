//! Published HUD state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::regions::{RegionKey, RegionVisibility};
use crate::role::OverlayRole;

/// Current readings of one overlay role, as drawn by the HUD.
///
/// Readers get clones; nothing downstream mutates a published snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HudSnapshot {
    /// Milliseconds since the Unix epoch when this snapshot was built
    pub ts: i64,
    pub role: OverlayRole,
    pub profile_id: Option<String>,
    pub name: Option<String>,
    pub level: Option<u32>,
    pub exp_pct: Option<f64>,
    pub rm_exp_pct: Option<f64>,
    pub lauftext: Option<String>,
    pub enemy_name: Option<String>,
    pub enemy_hp: Option<String>,
    /// Last raw text per field, for the debug panel
    pub raw: BTreeMap<RegionKey, String>,
    /// Which fields the HUD should draw
    pub visibility: RegionVisibility,
}

impl HudSnapshot {
    pub fn empty(role: OverlayRole) -> Self {
        Self {
            ts: 0,
            role,
            profile_id: None,
            name: None,
            level: None,
            exp_pct: None,
            rm_exp_pct: None,
            lauftext: None,
            enemy_name: None,
            enemy_hp: None,
            raw: BTreeMap::new(),
            visibility: RegionVisibility::new(),
        }
    }

    /// Serialized form used to detect changes. Excludes the timestamp and
    /// raw text, which change without the drawn values changing.
    pub fn change_key(&self) -> String {
        let mut keyed = self.clone();
        keyed.ts = 0;
        keyed.raw.clear();
        serde_json::to_string(&keyed).unwrap_or_default()
    }
}
