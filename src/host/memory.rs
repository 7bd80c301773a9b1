//! In-memory windowing shell.
//!
//! Implements every collaborator trait over plain maps. The command line
//! tools use it to simulate a desktop; tests drive it to move, focus and
//! close windows.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::collaborators::{
    InstanceRegistry, LegacySession, OverlayTargets, SessionEntry, SessionRegistry,
    SidePanelQuery, TabManager, WindowId, WindowQuery,
};
use crate::capture::ScreenRect;
use crate::role::OverlayRole;

#[derive(Clone, Debug)]
struct MemoryWindow {
    bounds: ScreenRect,
    visible: bool,
    minimized: bool,
    parent: Option<WindowId>,
}

#[derive(Default)]
struct DesktopState {
    windows: HashMap<WindowId, MemoryWindow>,
    focused: Option<WindowId>,
    side_panel: Option<WindowId>,
    instances: HashMap<String, WindowId>,
    sessions: Vec<(WindowId, Arc<MemoryTabs>)>,
    legacy: Option<(WindowId, Arc<MemoryTabs>)>,
}

/// A simulated desktop of top-level windows and session tabs.
#[derive(Default)]
pub struct MemoryDesktop {
    state: Mutex<DesktopState>,
}

impl MemoryDesktop {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DesktopState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds a visible, non-minimized window.
    pub fn add_window(&self, id: WindowId, bounds: ScreenRect) {
        self.lock().windows.insert(
            id,
            MemoryWindow {
                bounds,
                visible: true,
                minimized: false,
                parent: None,
            },
        );
    }

    pub fn set_bounds(&self, id: WindowId, bounds: ScreenRect) {
        if let Some(w) = self.lock().windows.get_mut(&id) {
            w.bounds = bounds;
        }
    }

    pub fn set_visible(&self, id: WindowId, visible: bool) {
        if let Some(w) = self.lock().windows.get_mut(&id) {
            w.visible = visible;
        }
    }

    pub fn set_minimized(&self, id: WindowId, minimized: bool) {
        if let Some(w) = self.lock().windows.get_mut(&id) {
            w.minimized = minimized;
        }
    }

    pub fn set_parent(&self, id: WindowId, parent: Option<WindowId>) {
        if let Some(w) = self.lock().windows.get_mut(&id) {
            w.parent = parent;
        }
    }

    /// Removes a window. Focus on it is dropped.
    pub fn close_window(&self, id: WindowId) {
        let mut state = self.lock();
        state.windows.remove(&id);
        if state.focused == Some(id) {
            state.focused = None;
        }
    }

    pub fn set_focused(&self, id: Option<WindowId>) {
        self.lock().focused = id;
    }

    pub fn set_side_panel(&self, id: Option<WindowId>) {
        self.lock().side_panel = id;
    }

    /// Registers `window` as the standalone window of `profile_id`.
    pub fn register_instance(&self, profile_id: &str, window: WindowId) {
        self.lock().instances.insert(profile_id.to_string(), window);
    }

    pub fn unregister_instance(&self, profile_id: &str) {
        self.lock().instances.remove(profile_id);
    }

    /// Registers `window` as a multi-window session and returns its tabs.
    pub fn add_session(&self, window: WindowId) -> Arc<MemoryTabs> {
        let tabs = Arc::new(MemoryTabs::default());
        self.lock().sessions.push((window, tabs.clone()));
        tabs
    }

    /// Makes `window` the legacy session window and returns its tabs.
    pub fn set_legacy_session(&self, window: WindowId) -> Arc<MemoryTabs> {
        let tabs = Arc::new(MemoryTabs::default());
        self.lock().legacy = Some((window, tabs.clone()));
        tabs
    }
}

impl WindowQuery for MemoryDesktop {
    fn is_alive(&self, window: WindowId) -> bool {
        self.lock().windows.contains_key(&window)
    }

    fn content_bounds(&self, window: WindowId) -> Option<ScreenRect> {
        self.lock().windows.get(&window).map(|w| w.bounds)
    }

    fn is_visible(&self, window: WindowId) -> bool {
        self.lock().windows.get(&window).is_some_and(|w| w.visible)
    }

    fn is_minimized(&self, window: WindowId) -> bool {
        self.lock().windows.get(&window).is_some_and(|w| w.minimized)
    }

    fn parent_of(&self, window: WindowId) -> Option<WindowId> {
        self.lock().windows.get(&window).and_then(|w| w.parent)
    }

    fn focused_window(&self) -> Option<WindowId> {
        self.lock().focused
    }
}

impl InstanceRegistry for MemoryDesktop {
    fn window_for(&self, profile_id: &str) -> Option<WindowId> {
        self.lock().instances.get(profile_id).copied()
    }
}

impl SessionRegistry for MemoryDesktop {
    fn sessions(&self) -> Vec<SessionEntry> {
        self.lock()
            .sessions
            .iter()
            .map(|(window, tabs)| SessionEntry {
                window: *window,
                tabs: tabs.clone(),
            })
            .collect()
    }
}

impl LegacySession for MemoryDesktop {
    fn session(&self) -> Option<SessionEntry> {
        self.lock().legacy.as_ref().map(|(window, tabs)| SessionEntry {
            window: *window,
            tabs: tabs.clone(),
        })
    }
}

impl SidePanelQuery for MemoryDesktop {
    fn side_panel_window(&self) -> Option<WindowId> {
        self.lock().side_panel
    }
}

#[derive(Default)]
struct TabsState {
    active: Option<String>,
    views: HashMap<String, ScreenRect>,
}

/// Tabs of one simulated session window.
#[derive(Default)]
pub struct MemoryTabs {
    state: Mutex<TabsState>,
}

impl MemoryTabs {
    fn lock(&self) -> MutexGuard<'_, TabsState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Opens a tab for `profile_id` with view bounds relative to the window.
    pub fn open(&self, profile_id: &str, view: ScreenRect) {
        self.lock().views.insert(profile_id.to_string(), view);
    }

    pub fn activate(&self, profile_id: &str) {
        self.lock().active = Some(profile_id.to_string());
    }

    pub fn close(&self, profile_id: &str) {
        let mut state = self.lock();
        state.views.remove(profile_id);
        if state.active.as_deref() == Some(profile_id) {
            state.active = None;
        }
    }
}

impl TabManager for MemoryTabs {
    fn is_active(&self, profile_id: &str) -> bool {
        let state = self.lock();
        state.active.as_deref() == Some(profile_id) && state.views.contains_key(profile_id)
    }

    fn view_bounds(&self, profile_id: &str) -> Option<ScreenRect> {
        self.lock().views.get(profile_id).copied()
    }
}

/// Overlay targets held in memory.
#[derive(Default)]
pub struct MemoryTargets {
    targets: Mutex<HashMap<OverlayRole, String>>,
}

impl MemoryTargets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, role: OverlayRole, profile_id: Option<&str>) {
        let mut targets = self.targets.lock().unwrap_or_else(|e| e.into_inner());
        match profile_id {
            Some(id) => {
                targets.insert(role, id.to_string());
            }
            None => {
                targets.remove(&role);
            }
        }
    }
}

impl OverlayTargets for MemoryTargets {
    fn target_for(&self, role: OverlayRole) -> Option<String> {
        self.targets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&role)
            .cloned()
    }
}
