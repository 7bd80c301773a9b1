//! Read-only queries the core makes against the windowing shell.
//!
//! The shell owns every top-level window and tab; these traits are the only
//! view the tracking core has of them. Implementations must answer from
//! in-memory state, since they are called on every tracking tick.

use std::sync::Arc;

use crate::capture::ScreenRect;
use crate::role::OverlayRole;

/// Opaque identifier of a top-level window.
pub type WindowId = u64;

/// Queries about top-level windows.
pub trait WindowQuery: Send + Sync {
    /// False once the window has been closed or destroyed.
    fn is_alive(&self, window: WindowId) -> bool;
    /// Content-area bounds in screen coordinates.
    fn content_bounds(&self, window: WindowId) -> Option<ScreenRect>;
    fn is_visible(&self, window: WindowId) -> bool;
    fn is_minimized(&self, window: WindowId) -> bool;
    /// Logical parent of a child window, if any.
    fn parent_of(&self, window: WindowId) -> Option<WindowId>;
    /// The application window that currently has OS focus.
    fn focused_window(&self) -> Option<WindowId>;
}

/// Tab manager of a session window hosting several profiles as embedded views.
pub trait TabManager: Send + Sync {
    /// True when `profile_id` is the tab currently shown.
    fn is_active(&self, profile_id: &str) -> bool;
    /// Bounds of the profile's view, relative to its window's content area.
    fn view_bounds(&self, profile_id: &str) -> Option<ScreenRect>;
}

/// Standalone per-profile windows.
pub trait InstanceRegistry: Send + Sync {
    fn window_for(&self, profile_id: &str) -> Option<WindowId>;
}

/// A session window together with its tab manager.
#[derive(Clone)]
pub struct SessionEntry {
    pub window: WindowId,
    pub tabs: Arc<dyn TabManager>,
}

/// Multi-window sessions, in registration order.
pub trait SessionRegistry: Send + Sync {
    fn sessions(&self) -> Vec<SessionEntry>;
}

/// The legacy single session window, if one is open.
pub trait LegacySession: Send + Sync {
    fn session(&self) -> Option<SessionEntry>;
}

/// Window id of the side panel that counts as "focusing" the overlay.
pub trait SidePanelQuery: Send + Sync {
    fn side_panel_window(&self) -> Option<WindowId>;
}

/// Profile settings: which profile each overlay role currently follows.
pub trait OverlayTargets: Send + Sync {
    fn target_for(&self, role: OverlayRole) -> Option<String>;
}
