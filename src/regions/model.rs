//! Normalized region types.
//!
//! A region is stored as ratios of the host surface (0.0 to 1.0) so it stays
//! valid when the host window is resized.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Smallest width/height a stored region may have.
pub const MIN_REGION_EXTENT: f64 = 0.001;

fn clamp01(n: f64) -> f64 {
    if n.is_finite() { n.clamp(0.0, 1.0) } else { 0.0 }
}

/// A rectangle in relative coordinates of the host surface.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Left edge (0.0 = host left, 1.0 = host right)
    pub x: f64,
    /// Top edge (0.0 = host top, 1.0 = host bottom)
    pub y: f64,
    /// Width as a fraction of host width
    pub w: f64,
    /// Height as a fraction of host height
    pub h: f64,
}

impl Region {
    /// Creates a region, clamping every component into range.
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }.clamped()
    }

    /// Returns a copy with x/y in `[0,1]` and w/h in `[0.001, 1]`.
    ///
    /// Idempotent: `r.clamped().clamped() == r.clamped()`.
    pub fn clamped(self) -> Self {
        Self {
            x: clamp01(self.x),
            y: clamp01(self.y),
            w: clamp01(self.w).max(MIN_REGION_EXTENT),
            h: clamp01(self.h).max(MIN_REGION_EXTENT),
        }
    }
}

/// Field keys a region can be calibrated for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RegionKey {
    #[serde(rename = "lvl")]
    Lvl,
    #[serde(rename = "charname")]
    Charname,
    #[serde(rename = "exp")]
    Exp,
    #[serde(rename = "lauftext")]
    Lauftext,
    #[serde(rename = "rmExp")]
    RmExp,
    #[serde(rename = "enemyName")]
    EnemyName,
    #[serde(rename = "enemyHp")]
    EnemyHp,
}

impl RegionKey {
    /// Every key, in calibration order.
    pub const ALL: [RegionKey; 7] = [
        RegionKey::Lvl,
        RegionKey::Charname,
        RegionKey::Exp,
        RegionKey::Lauftext,
        RegionKey::RmExp,
        RegionKey::EnemyName,
        RegionKey::EnemyHp,
    ];

    /// Key as written in the JSON store.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lvl => "lvl",
            Self::Charname => "charname",
            Self::Exp => "exp",
            Self::Lauftext => "lauftext",
            Self::RmExp => "rmExp",
            Self::EnemyName => "enemyName",
            Self::EnemyHp => "enemyHp",
        }
    }

    /// Short label drawn next to the region in previews.
    pub fn label(self) -> &'static str {
        match self {
            Self::Lvl => "LV",
            Self::Charname => "NAME",
            Self::Exp => "EXP%",
            Self::Lauftext => "TEXT",
            Self::RmExp => "RM EXP%",
            Self::EnemyName => "ENEMY",
            Self::EnemyHp => "ENEMY HP",
        }
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegionKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RegionKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown region key {:?}", s))
    }
}

/// Legacy two-field layout: `(old key, replacement)`.
const LEGACY_KEYS: [(&str, RegionKey); 2] = [
    ("nameLevel", RegionKey::Charname),
    ("expPercent", RegionKey::Exp),
];

/// Regions calibrated for one profile. Keys are optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionSet(BTreeMap<RegionKey, Region>);

impl RegionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: RegionKey) -> Option<Region> {
        self.0.get(&key).copied()
    }

    /// Stores `region` (clamped) under `key`, returning the previous value.
    pub fn insert(&mut self, key: RegionKey, region: Region) -> Option<Region> {
        self.0.insert(key, region.clamped())
    }

    pub fn remove(&mut self, key: RegionKey) -> Option<Region> {
        self.0.remove(&key)
    }

    pub fn contains(&self, key: RegionKey) -> bool {
        self.0.contains_key(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegionKey, Region)> + '_ {
        self.0.iter().map(|(k, r)| (*k, *r))
    }

    pub fn keys(&self) -> impl Iterator<Item = RegionKey> + '_ {
        self.0.keys().copied()
    }

    /// Returns only the entries whose key is in `allowed`.
    pub fn filtered(&self, allowed: &[RegionKey]) -> RegionSet {
        RegionSet(
            self.0
                .iter()
                .filter(|(k, _)| allowed.contains(k))
                .map(|(k, r)| (*k, *r))
                .collect(),
        )
    }

    /// Returns a copy with every region clamped.
    pub fn clamped(&self) -> RegionSet {
        RegionSet(self.0.iter().map(|(k, r)| (*k, r.clamped())).collect())
    }

    /// Parses a stored JSON object leniently: unknown keys and malformed
    /// regions are dropped, values are clamped.
    pub fn from_json_object(raw: &Map<String, Value>) -> RegionSet {
        let mut set = RegionSet::new();
        for (name, value) in raw {
            let Ok(key) = name.parse::<RegionKey>() else {
                continue;
            };
            match serde_json::from_value::<Region>(value.clone()) {
                Ok(region) => {
                    set.insert(key, region);
                }
                Err(e) => {
                    log::warn!("[regions] dropping malformed region {}: {}", name, e);
                }
            }
        }
        set
    }

    /// Serializes into the stored JSON object form.
    pub fn to_json_object(&self) -> Map<String, Value> {
        self.0
            .iter()
            .filter_map(|(k, r)| {
                serde_json::to_value(r.clamped())
                    .ok()
                    .map(|v| (k.as_str().to_string(), v))
            })
            .collect()
    }
}

impl FromIterator<(RegionKey, Region)> for RegionSet {
    fn from_iter<T: IntoIterator<Item = (RegionKey, Region)>>(iter: T) -> Self {
        let mut set = RegionSet::new();
        for (k, r) in iter {
            set.insert(k, r);
        }
        set
    }
}

/// Rewrites legacy `nameLevel`/`expPercent` entries into `charname`/`exp`.
///
/// A legacy entry never overwrites a modern key that is already present; it
/// is dropped instead. Returns true when the object changed. Running it again
/// on its own output is a no-op.
pub fn migrate_legacy(raw: &mut Map<String, Value>) -> bool {
    let mut changed = false;
    for (legacy, key) in LEGACY_KEYS {
        let Some(value) = raw.remove(legacy) else {
            continue;
        };
        changed = true;
        if !raw.contains_key(key.as_str()) {
            raw.insert(key.as_str().to_string(), value);
        }
    }
    changed
}
