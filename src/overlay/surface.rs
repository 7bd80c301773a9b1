//! Overlay surfaces: the one windowing mutation the core owns.
//!
//! A surface is a transparent, always-on-top, click-through window placed
//! over a host. The shell creates them through a `SurfaceFactory`; the core
//! only moves, shows, hides and fades them.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::capture::ScreenRect;
use crate::host::WindowId;
use crate::pipeline::HudSnapshot;
use crate::role::OverlayRole;

/// Operations on one overlay window.
pub trait OverlaySurface: Send + Sync {
    /// False once the shell has closed the window.
    fn is_alive(&self) -> bool;
    fn set_bounds(&self, rect: ScreenRect);
    /// Shows without taking focus, or hides.
    fn set_visible(&self, visible: bool);
    fn is_visible(&self) -> bool;
    /// 0.0 is fully transparent, 1.0 fully opaque.
    fn set_opacity(&self, opacity: f32);
    /// Re-parents the surface to a new owner window.
    fn set_owner(&self, owner: WindowId);
    /// Pushes fresh readings to the HUD content.
    fn send_update(&self, snapshot: &HudSnapshot);
    fn close(&self);
}

/// What a surface shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SurfaceKind {
    /// Click-through HUD covering the whole host
    Hud,
    /// HUD control and debug panel placed inside the host
    ControlPanel,
}

/// Creates overlay surfaces owned by a host window.
pub trait SurfaceFactory: Send + Sync {
    fn create(&self, role: OverlayRole, kind: SurfaceKind, owner: WindowId) -> Arc<dyn OverlaySurface>;
}

/// Observable state of a `MemorySurface`.
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceState {
    pub alive: bool,
    pub bounds: Option<ScreenRect>,
    pub visible: bool,
    pub opacity: f32,
    pub owner: Option<WindowId>,
    pub reparent_count: usize,
    pub last_update: Option<HudSnapshot>,
}

impl Default for SurfaceState {
    fn default() -> Self {
        Self {
            alive: true,
            bounds: None,
            visible: false,
            opacity: 1.0,
            owner: None,
            reparent_count: 0,
            last_update: None,
        }
    }
}

/// A surface that only records what was done to it.
#[derive(Default)]
pub struct MemorySurface {
    state: Mutex<SurfaceState>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> SurfaceState {
        self.lock().clone()
    }
}

impl OverlaySurface for MemorySurface {
    fn is_alive(&self) -> bool {
        self.lock().alive
    }

    fn set_bounds(&self, rect: ScreenRect) {
        self.lock().bounds = Some(rect);
    }

    fn set_visible(&self, visible: bool) {
        self.lock().visible = visible;
    }

    fn is_visible(&self) -> bool {
        let state = self.lock();
        state.alive && state.visible
    }

    fn set_opacity(&self, opacity: f32) {
        self.lock().opacity = opacity.clamp(0.0, 1.0);
    }

    fn set_owner(&self, owner: WindowId) {
        let mut state = self.lock();
        if state.owner.is_some() {
            state.reparent_count += 1;
        }
        state.owner = Some(owner);
    }

    fn send_update(&self, snapshot: &HudSnapshot) {
        self.lock().last_update = Some(snapshot.clone());
    }

    fn close(&self) {
        let mut state = self.lock();
        state.alive = false;
        state.visible = false;
    }
}

/// Hands out `MemorySurface`s and keeps every one it created.
#[derive(Default)]
pub struct MemorySurfaceFactory {
    created: Mutex<BTreeMap<(OverlayRole, SurfaceKind), Vec<Arc<MemorySurface>>>>,
}

impl MemorySurfaceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently created HUD surface for `role`.
    pub fn latest(&self, role: OverlayRole) -> Option<Arc<MemorySurface>> {
        self.latest_of(role, SurfaceKind::Hud)
    }

    pub fn latest_of(&self, role: OverlayRole, kind: SurfaceKind) -> Option<Arc<MemorySurface>> {
        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(role, kind))
            .and_then(|v| v.last().cloned())
    }

    /// Number of HUD surfaces created for `role`.
    pub fn created_count(&self, role: OverlayRole) -> usize {
        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(role, SurfaceKind::Hud))
            .map_or(0, Vec::len)
    }
}

impl SurfaceFactory for MemorySurfaceFactory {
    fn create(&self, role: OverlayRole, kind: SurfaceKind, owner: WindowId) -> Arc<dyn OverlaySurface> {
        let surface = Arc::new(MemorySurface::new());
        surface.set_owner(owner);
        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry((role, kind))
            .or_default()
            .push(surface.clone());
        surface
    }
}
