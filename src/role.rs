//! Overlay roles.
//!
//! The fighter overlay tracks a character's own fields; the support overlay
//! tracks only the remaining-experience field of a second character. Each
//! role resolves its own target profile and never shares regions with the
//! other.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::regions::RegionKey;

const FIGHTER_KEYS: &[RegionKey] = &[
    RegionKey::Lvl,
    RegionKey::Charname,
    RegionKey::Exp,
    RegionKey::Lauftext,
    RegionKey::EnemyName,
    RegionKey::EnemyHp,
];

const SUPPORT_KEYS: &[RegionKey] = &[RegionKey::RmExp];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayRole {
    Fighter,
    Support,
}

impl OverlayRole {
    pub const ALL: [OverlayRole; 2] = [OverlayRole::Fighter, OverlayRole::Support];

    /// Fields the sampler reads for this role.
    pub fn tracked_keys(self) -> &'static [RegionKey] {
        match self {
            OverlayRole::Fighter => FIGHTER_KEYS,
            OverlayRole::Support => SUPPORT_KEYS,
        }
    }

    /// Fields a calibration session for this role may edit.
    pub fn calibration_keys(self) -> &'static [RegionKey] {
        match self {
            OverlayRole::Fighter => &RegionKey::ALL,
            OverlayRole::Support => SUPPORT_KEYS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OverlayRole::Fighter => "fighter",
            OverlayRole::Support => "support",
        }
    }
}

impl fmt::Display for OverlayRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverlayRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OverlayRole::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown overlay role {:?}", s))
    }
}
