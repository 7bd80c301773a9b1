//! Overlay surfaces and their synchronization with hosts.
//!
//! This module provides:
//! - The surface mutation seam and an in-memory surface (`surface`)
//! - Control panel placement and its persisted layout (`layout`)
//! - The per-role position/visibility loop (`sync`)
//! - Both roles together with global hide/restore (`manager`)

pub mod layout;
pub mod manager;
pub mod surface;
pub mod sync;

pub use layout::{PanelBox, PanelLayoutStore, PANEL_MIN_HEIGHT, PANEL_MIN_WIDTH};
pub use manager::{Companion, OverlayManager, SurfaceSlot, VisibilitySnapshot};
pub use surface::{
    MemorySurface, MemorySurfaceFactory, OverlaySurface, SurfaceFactory, SurfaceKind, SurfaceState,
};
pub use sync::{HideLatch, OverlaySync, SyncDeps, SyncState};
