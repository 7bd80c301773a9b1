//! Both overlay roles plus the global hide/restore mechanism.
//!
//! Three independent reasons can force every overlay hidden: the whole
//! application losing focus, the user's hotkey, and a modal dialog. Each
//! captures which surfaces were visible into its own snapshot and restores
//! exactly that set afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::surface::OverlaySurface;
use super::sync::{HideLatch, OverlaySync, SyncDeps};
use crate::config::TrackingConfig;
use crate::role::OverlayRole;

/// Shell-owned surfaces that hide and restore together with the overlays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Companion {
    SidePanelButton,
    SidePanel,
}

/// One hideable surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SurfaceSlot {
    Hud(OverlayRole),
    /// A role's control panel
    Panel(OverlayRole),
    Companion(Companion),
}

/// Surfaces that were visible when a hide was captured.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VisibilitySnapshot {
    visible: BTreeSet<SurfaceSlot>,
}

#[derive(Default)]
struct Snapshots {
    blur: VisibilitySnapshot,
    hotkey: VisibilitySnapshot,
    dialog: VisibilitySnapshot,
}

/// Owns the per-role synchronizers and the companion surfaces.
pub struct OverlayManager {
    config: TrackingConfig,
    deps: Arc<SyncDeps>,
    latch: Arc<HideLatch>,
    syncs: BTreeMap<OverlayRole, Arc<OverlaySync>>,
    companions: Mutex<BTreeMap<Companion, Arc<dyn OverlaySurface>>>,
    snapshots: Mutex<Snapshots>,
}

impl OverlayManager {
    /// Creates one synchronizer per role, sharing a single hide latch.
    pub fn new(config: TrackingConfig, deps: Arc<SyncDeps>) -> Self {
        let latch = Arc::new(HideLatch::new());
        let syncs = OverlayRole::ALL
            .iter()
            .map(|&role| {
                let sync = OverlaySync::new(role, config.clone(), deps.clone(), latch.clone());
                (role, Arc::new(sync))
            })
            .collect();
        Self {
            config,
            deps,
            latch,
            syncs,
            companions: Mutex::new(BTreeMap::new()),
            snapshots: Mutex::new(Snapshots::default()),
        }
    }

    fn snapshots(&self) -> MutexGuard<'_, Snapshots> {
        self.snapshots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn companions(&self) -> MutexGuard<'_, BTreeMap<Companion, Arc<dyn OverlaySurface>>> {
        self.companions.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn sync(&self, role: OverlayRole) -> Option<&Arc<OverlaySync>> {
        self.syncs.get(&role)
    }

    pub fn latch(&self) -> &Arc<HideLatch> {
        &self.latch
    }

    /// Registers a companion surface, replacing any previous one of that kind.
    pub fn register_companion(&self, kind: Companion, surface: Arc<dyn OverlaySurface>) {
        self.companions().insert(kind, surface);
    }

    pub fn unregister_companion(&self, kind: Companion) {
        self.companions().remove(&kind);
    }

    fn slot_surface(&self, slot: SurfaceSlot) -> Option<Arc<dyn OverlaySurface>> {
        let surface = match slot {
            SurfaceSlot::Hud(role) => self.syncs.get(&role).and_then(|s| s.surface()),
            SurfaceSlot::Panel(role) => self.syncs.get(&role).and_then(|s| s.panel()),
            SurfaceSlot::Companion(kind) => self.companions().get(&kind).cloned(),
        };
        surface.filter(|s| s.is_alive())
    }

    fn all_slots(&self) -> Vec<SurfaceSlot> {
        let companions: Vec<SurfaceSlot> = self
            .companions()
            .keys()
            .map(|&k| SurfaceSlot::Companion(k))
            .collect();
        self.syncs
            .keys()
            .flat_map(|&r| [SurfaceSlot::Hud(r), SurfaceSlot::Panel(r)])
            .chain(companions)
            .collect()
    }

    /// Records which surfaces are visible and hides them.
    fn capture_and_hide(&self) -> VisibilitySnapshot {
        let mut snapshot = VisibilitySnapshot::default();
        for slot in self.all_slots() {
            if let Some(surface) = self.slot_surface(slot) {
                if surface.is_visible() {
                    surface.set_visible(false);
                    snapshot.visible.insert(slot);
                }
            }
        }
        snapshot
    }

    /// Shows every surface recorded in `snapshot` that still exists.
    fn restore(&self, snapshot: &VisibilitySnapshot) {
        for &slot in &snapshot.visible {
            if let Some(surface) = self.slot_surface(slot) {
                surface.set_visible(true);
            }
        }
    }

    /// The application lost focus entirely.
    pub fn hide_all(&self) {
        let captured = self.capture_and_hide();
        log::debug!("[overlay] app blur hid {:?}", captured.visible);
        self.snapshots().blur = captured;
    }

    /// An application window regained focus. The tracking loops correct
    /// per-role visibility on their next tick.
    pub fn show_all(&self) {
        if self.latch.is_holding() {
            return;
        }
        let snapshot = std::mem::take(&mut self.snapshots().blur);
        self.restore(&snapshot);
    }

    pub fn hide_for_dialog(&self) {
        if self.latch.dialog() {
            return;
        }
        self.latch.set_dialog(true);
        let captured = self.capture_and_hide();
        self.snapshots().dialog = captured;
    }

    pub fn show_after_dialog(&self) {
        if !self.latch.dialog() {
            return;
        }
        self.latch.set_dialog(false);
        let mut snapshots = self.snapshots();
        let snapshot = std::mem::take(&mut snapshots.dialog);
        if self.latch.hotkey() {
            // Still hidden by the hotkey; its release restores these too.
            snapshots.hotkey.visible.extend(snapshot.visible);
            return;
        }
        drop(snapshots);
        self.restore(&snapshot);
    }

    /// Hotkey: hide everything, or restore what the last press hid.
    ///
    /// Returns true when overlays are now held hidden.
    pub fn toggle_visibility(&self) -> bool {
        if self.latch.hotkey() {
            self.latch.set_hotkey(false);
            let mut snapshots = self.snapshots();
            let snapshot = std::mem::take(&mut snapshots.hotkey);
            if self.latch.dialog() {
                snapshots.dialog.visible.extend(snapshot.visible);
                log::info!("[overlay] hotkey released while a dialog is open");
                return false;
            }
            drop(snapshots);
            self.restore(&snapshot);
            for sync in self.syncs.values() {
                sync.tick();
            }
            log::info!("[overlay] overlays restored by hotkey");
            return false;
        }
        self.latch.set_hotkey(true);
        let captured = self.capture_and_hide();
        self.snapshots().hotkey = captured;
        log::info!("[overlay] overlays hidden by hotkey");
        true
    }

    /// Application-wide blur event. Hides everything if no application
    /// window has focus once the grace period has passed.
    pub fn on_app_blur(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(manager.config.blur_grace()).await;
            if manager.deps.windows.focused_window().is_none() {
                manager.hide_all();
            }
        })
    }

    /// Application-wide focus event.
    pub fn on_app_focus(&self) {
        self.show_all();
    }

    /// Starts one tracking loop per role.
    pub fn spawn(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        self.syncs
            .values()
            .map(|sync| sync.spawn(cancel.child_token()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ScreenRect;
    use crate::host::{HostResolver, MemoryDesktop, MemoryTargets};
    use crate::overlay::layout::PanelLayoutStore;
    use crate::overlay::surface::{MemorySurface, MemorySurfaceFactory, SurfaceKind};
    use crate::overlay::sync::SyncState;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        desktop: Arc<MemoryDesktop>,
        factory: Arc<MemorySurfaceFactory>,
        button: Arc<MemorySurface>,
        manager: Arc<OverlayManager>,
    }

    /// Fighter on window 1 (p1), support on window 2 (p2), both visible.
    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let desktop = Arc::new(MemoryDesktop::new());
        let targets = Arc::new(MemoryTargets::new());
        let factory = Arc::new(MemorySurfaceFactory::new());
        desktop.add_window(1, ScreenRect::new(0, 0, 800, 600));
        desktop.add_window(2, ScreenRect::new(800, 0, 800, 600));
        desktop.set_parent(2, Some(1));
        desktop.register_instance("p1", 1);
        desktop.register_instance("p2", 2);
        desktop.set_focused(Some(1));
        targets.set(OverlayRole::Fighter, Some("p1"));
        targets.set(OverlayRole::Support, Some("p2"));

        let deps = Arc::new(SyncDeps {
            resolver: Arc::new(HostResolver::standard(
                desktop.clone(),
                desktop.clone(),
                desktop.clone(),
                desktop.clone(),
            )),
            windows: desktop.clone(),
            side_panel: desktop.clone(),
            targets,
            factory: factory.clone(),
            layout: Arc::new(PanelLayoutStore::new(dir.path().join("hud-layout.json"))),
        });
        let manager = Arc::new(OverlayManager::new(TrackingConfig::default(), deps));
        let button = Arc::new(MemorySurface::new());
        button.set_visible(true);
        manager.register_companion(Companion::SidePanelButton, button.clone());

        for role in OverlayRole::ALL {
            manager.sync(role).unwrap().tick();
        }
        Fixture {
            _dir: dir,
            desktop,
            factory,
            button,
            manager,
        }
    }

    fn hud_visible(f: &Fixture, role: OverlayRole) -> bool {
        f.factory.latest(role).unwrap().state().visible
    }

    fn panel_visible(f: &Fixture, role: OverlayRole) -> bool {
        f.factory
            .latest_of(role, SurfaceKind::ControlPanel)
            .unwrap()
            .state()
            .visible
    }

    #[test]
    fn test_fixture_starts_visible() {
        let f = fixture();
        assert!(hud_visible(&f, OverlayRole::Fighter));
        // Window 2 is a child of window 1, not the other way round, so
        // focusing window 1 does not count for the support host.
        assert!(!hud_visible(&f, OverlayRole::Support));
    }

    #[test]
    fn test_dialog_hides_and_restores_exactly() {
        let f = fixture();
        assert!(panel_visible(&f, OverlayRole::Fighter));
        f.manager.hide_for_dialog();
        assert!(!hud_visible(&f, OverlayRole::Fighter));
        assert!(!panel_visible(&f, OverlayRole::Fighter));
        assert!(!f.button.is_visible());

        // Held hidden even though the host still has focus.
        let fighter = f.manager.sync(OverlayRole::Fighter).unwrap();
        assert_eq!(fighter.tick(), SyncState::HiddenUnfocused);
        assert!(!hud_visible(&f, OverlayRole::Fighter));

        f.manager.show_after_dialog();
        assert!(hud_visible(&f, OverlayRole::Fighter));
        assert!(panel_visible(&f, OverlayRole::Fighter));
        assert!(f.button.is_visible());
        assert!(!hud_visible(&f, OverlayRole::Support));
        assert!(!panel_visible(&f, OverlayRole::Support));
    }

    #[test]
    fn test_hotkey_toggle() {
        let f = fixture();
        assert!(f.manager.toggle_visibility());
        assert!(!hud_visible(&f, OverlayRole::Fighter));
        assert!(!f.button.is_visible());
        assert!(!f.manager.toggle_visibility());
        assert!(hud_visible(&f, OverlayRole::Fighter));
        assert!(f.button.is_visible());
    }

    #[test]
    fn test_focus_does_not_restore_while_hotkey_holds() {
        let f = fixture();
        f.manager.toggle_visibility();
        f.manager.hide_all();
        f.manager.on_app_focus();
        assert!(!hud_visible(&f, OverlayRole::Fighter));
        assert!(!f.button.is_visible());
    }

    #[test]
    fn test_dialog_and_hotkey_snapshots_are_separate() {
        let f = fixture();
        f.manager.hide_for_dialog();
        f.manager.toggle_visibility();
        f.manager.show_after_dialog();
        assert!(!f.button.is_visible());
        assert!(f.manager.latch().hotkey());

        // Releasing the hotkey brings back what the dialog had hidden.
        f.manager.toggle_visibility();
        assert!(f.button.is_visible());
        assert!(hud_visible(&f, OverlayRole::Fighter));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blur_hides_after_grace_without_focus() {
        let f = fixture();
        f.desktop.set_focused(None);
        f.manager.on_app_blur().await.unwrap();
        assert!(!hud_visible(&f, OverlayRole::Fighter));
        assert!(!f.button.is_visible());

        f.desktop.set_focused(Some(1));
        f.manager.on_app_focus();
        assert!(hud_visible(&f, OverlayRole::Fighter));
        assert!(f.button.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blur_ignored_when_focus_moves_within_app() {
        let f = fixture();
        let pending = f.manager.on_app_blur();
        tokio::time::sleep(Duration::from_millis(10)).await;
        f.desktop.set_focused(Some(2));
        pending.await.unwrap();
        assert!(hud_visible(&f, OverlayRole::Fighter));
        assert!(f.button.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loops_stop_and_close_surfaces() {
        let f = fixture();
        let cancel = CancellationToken::new();
        let handles = f.manager.spawn(&cancel);
        tokio::time::sleep(Duration::from_millis(120)).await;
        cancel.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(!f.factory.latest(OverlayRole::Fighter).unwrap().is_alive());
        assert!(f.manager.sync(OverlayRole::Fighter).unwrap().surface().is_none());
    }
}
