//! Per-role overlay synchronizer.
//!
//! Every tick re-resolves the role's host, moves the HUD surface to cover
//! the host exactly, places the control panel at its stored offset inside
//! the host and decides visibility from OS focus. A host that moves fades
//! both surfaces out until it has been still for a short while.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::layout::{PanelBox, PanelLayoutStore};
use super::surface::{OverlaySurface, SurfaceFactory, SurfaceKind};
use crate::capture::ScreenRect;
use crate::config::TrackingConfig;
use crate::error::PersistenceError;
use crate::host::{HostDescriptor, HostResolver, OverlayTargets, SidePanelQuery, WindowId, WindowQuery};
use crate::pipeline::HudSnapshot;
use crate::role::OverlayRole;

/// Where a surface is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// No target or no host.
    Absent,
    /// Host exists but nothing related to it has focus.
    HiddenUnfocused,
    /// Host, its child or the side panel has focus; the surface covers the host.
    VisibleFollowing,
}

/// Reasons overlays are held hidden regardless of focus.
///
/// Shared by every synchronizer and written only by the overlay manager.
#[derive(Debug, Default)]
pub struct HideLatch {
    hotkey: AtomicBool,
    dialog: AtomicBool,
}

impl HideLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hotkey(&self) -> bool {
        self.hotkey.load(Ordering::SeqCst)
    }

    pub fn dialog(&self) -> bool {
        self.dialog.load(Ordering::SeqCst)
    }

    /// True while the hotkey or a dialog holds overlays hidden.
    pub fn is_holding(&self) -> bool {
        self.hotkey() || self.dialog()
    }

    pub(crate) fn set_hotkey(&self, held: bool) {
        self.hotkey.store(held, Ordering::SeqCst);
    }

    pub(crate) fn set_dialog(&self, held: bool) {
        self.dialog.store(held, Ordering::SeqCst);
    }
}

/// Everything a synchronizer reads from the shell.
pub struct SyncDeps {
    pub resolver: Arc<HostResolver>,
    pub windows: Arc<dyn WindowQuery>,
    pub side_panel: Arc<dyn SidePanelQuery>,
    pub targets: Arc<dyn OverlayTargets>,
    pub factory: Arc<dyn SurfaceFactory>,
    pub layout: Arc<PanelLayoutStore>,
}

/// A surface and the host window it is currently parented to.
#[derive(Default)]
struct Attached {
    surface: Option<Arc<dyn OverlaySurface>>,
    owner: Option<WindowId>,
}

impl Attached {
    fn live(&self) -> Option<Arc<dyn OverlaySurface>> {
        self.surface.clone().filter(|s| s.is_alive())
    }

    fn hide(&self) {
        if let Some(surface) = self.live() {
            surface.set_visible(false);
        }
    }

    fn close(&mut self) {
        if let Some(surface) = self.surface.take() {
            surface.close();
        }
        self.owner = None;
    }
}

struct SyncInner {
    hud: Attached,
    panel: Attached,
    panel_box: PanelBox,
    last_rect: Option<ScreenRect>,
    /// Set while faded out; the instant of the latest host movement.
    moved_at: Option<Instant>,
    state: SyncState,
    snapshots: Option<watch::Receiver<HudSnapshot>>,
}

impl SyncInner {
    fn hide(&self) {
        self.hud.hide();
        self.panel.hide();
    }
}

/// Keeps one role's HUD and control panel glued to its host.
pub struct OverlaySync {
    role: OverlayRole,
    config: TrackingConfig,
    deps: Arc<SyncDeps>,
    latch: Arc<HideLatch>,
    inner: Mutex<SyncInner>,
}

impl OverlaySync {
    /// Reads the role's stored panel box once; later changes go through
    /// `set_panel_box`.
    pub fn new(
        role: OverlayRole,
        config: TrackingConfig,
        deps: Arc<SyncDeps>,
        latch: Arc<HideLatch>,
    ) -> Self {
        let panel_box = deps.layout.get(role).unwrap_or_else(|e| {
            log::warn!("[overlay] failed to load {} panel layout: {}", role, e);
            PanelBox::default()
        });
        Self {
            role,
            config,
            deps,
            latch,
            inner: Mutex::new(SyncInner {
                hud: Attached::default(),
                panel: Attached::default(),
                panel_box,
                last_rect: None,
                moved_at: None,
                state: SyncState::Absent,
                snapshots: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn role(&self) -> OverlayRole {
        self.role
    }

    pub fn state(&self) -> SyncState {
        self.lock().state
    }

    /// The live HUD surface, if one has been created.
    pub fn surface(&self) -> Option<Arc<dyn OverlaySurface>> {
        self.lock().hud.live()
    }

    /// The live control panel, if one has been created.
    pub fn panel(&self) -> Option<Arc<dyn OverlaySurface>> {
        self.lock().panel.live()
    }

    pub fn panel_box(&self) -> PanelBox {
        self.lock().panel_box
    }

    /// Moves or resizes the control panel and persists the new box.
    ///
    /// The panel picks it up on the next tick.
    pub fn set_panel_box(&self, panel: PanelBox) -> Result<(), PersistenceError> {
        self.deps.layout.set(self.role, &panel)?;
        self.lock().panel_box = panel;
        log::debug!("[overlay] {} panel box set to {:?}", self.role, panel);
        Ok(())
    }

    /// Forwards published snapshots to the surfaces on each tick.
    pub fn attach_snapshots(&self, rx: watch::Receiver<HudSnapshot>) {
        let mut inner = self.lock();
        inner.snapshots = Some(rx);
        // Make the current value count as unseen so it reaches the next surface.
        if let Some(rx) = inner.snapshots.as_mut() {
            rx.mark_changed();
        }
    }

    pub fn tick(&self) -> SyncState {
        self.tick_at(Instant::now())
    }

    /// Runs one synchronization step as of `now`.
    pub fn tick_at(&self, now: Instant) -> SyncState {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if self.latch.is_holding() {
            inner.hide();
            if inner.state == SyncState::VisibleFollowing {
                inner.state = SyncState::HiddenUnfocused;
            }
            return inner.state;
        }

        let host = self
            .deps
            .targets
            .target_for(self.role)
            .and_then(|profile| self.deps.resolver.resolve(&profile));
        let Some(host) = host else {
            inner.hide();
            if inner.state != SyncState::Absent {
                log::debug!("[overlay] {} host lost", self.role);
            }
            inner.state = SyncState::Absent;
            return inner.state;
        };

        let (hud, created) = self.attach(&mut inner.hud, SurfaceKind::Hud, &host);
        if created {
            inner.last_rect = None;
            inner.moved_at = None;
        }
        let (panel, panel_created) = self.attach(&mut inner.panel, SurfaceKind::ControlPanel, &host);
        if created || panel_created {
            if let Some(rx) = inner.snapshots.as_mut() {
                rx.mark_changed();
            }
        }

        let surfaces = [hud.as_ref(), panel.as_ref()];
        self.follow_movement(inner, &surfaces, host.rect, now);
        hud.set_bounds(host.rect);
        panel.set_bounds(inner.panel_box.bounds_in(host.rect));

        if let Some(rx) = inner.snapshots.as_mut() {
            if rx.has_changed().unwrap_or(false) {
                let snapshot = rx.borrow_and_update().clone();
                for surface in surfaces {
                    surface.send_update(&snapshot);
                }
            }
        }

        let state = if self.host_focused(host.owner) {
            SyncState::VisibleFollowing
        } else {
            SyncState::HiddenUnfocused
        };
        for surface in surfaces {
            surface.set_visible(state == SyncState::VisibleFollowing);
        }
        if state != inner.state {
            log::debug!("[overlay] {} {:?} -> {:?}", self.role, inner.state, state);
        }
        inner.state = state;
        state
    }

    /// Creates the surface on first use or after the shell closed it;
    /// re-parents it when the host moved to another window. The flag is
    /// true when a new surface was created.
    fn attach(
        &self,
        slot: &mut Attached,
        kind: SurfaceKind,
        host: &HostDescriptor,
    ) -> (Arc<dyn OverlaySurface>, bool) {
        if let Some(surface) = slot.live() {
            if slot.owner != Some(host.owner) {
                log::info!(
                    "[overlay] {} {:?} re-parented {:?} -> {}",
                    self.role,
                    kind,
                    slot.owner,
                    host.owner
                );
                surface.set_owner(host.owner);
                slot.owner = Some(host.owner);
            }
            return (surface, false);
        }

        log::info!("[overlay] {} {:?} created over window {}", self.role, kind, host.owner);
        let surface = self.deps.factory.create(self.role, kind, host.owner);
        slot.surface = Some(surface.clone());
        slot.owner = Some(host.owner);
        (surface, true)
    }

    /// Fades out while the host moves and back in once it has settled.
    fn follow_movement(
        &self,
        inner: &mut SyncInner,
        surfaces: &[&dyn OverlaySurface],
        rect: ScreenRect,
        now: Instant,
    ) {
        let moved = inner.last_rect.is_some_and(|last| last != rect);
        inner.last_rect = Some(rect);

        if moved {
            if inner.moved_at.is_none() {
                for surface in surfaces {
                    surface.set_opacity(0.0);
                }
            }
            inner.moved_at = Some(now);
            return;
        }

        if let Some(moved_at) = inner.moved_at {
            if now.saturating_duration_since(moved_at) >= self.config.fade_restore() {
                for surface in surfaces {
                    surface.set_opacity(1.0);
                }
                inner.moved_at = None;
            }
        }
    }

    /// The host counts as focused when it, one of its children or the side
    /// panel has focus, and it is neither minimized nor hidden.
    fn host_focused(&self, owner: WindowId) -> bool {
        let windows = self.deps.windows.as_ref();
        if windows.is_minimized(owner) || !windows.is_visible(owner) {
            return false;
        }
        let Some(focused) = windows.focused_window() else {
            return false;
        };
        focused == owner
            || self.deps.side_panel.side_panel_window() == Some(focused)
            || windows.parent_of(focused) == Some(owner)
    }

    /// Hides and closes both surfaces.
    pub fn stop(&self) {
        let mut inner = self.lock();
        inner.hud.close();
        inner.panel.close();
        inner.last_rect = None;
        inner.moved_at = None;
        inner.state = SyncState::Absent;
    }

    /// Runs the tracking loop until `cancel`, then closes the surfaces.
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let sync = Arc::clone(self);
        tokio::spawn(async move {
            log::info!(
                "[overlay] {} tracking started ({} ms interval)",
                sync.role,
                sync.config.tick_ms
            );
            let mut ticker = tokio::time::interval(sync.config.tick());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sync.tick();
                    }
                    _ = cancel.cancelled() => break,
                }
            }
            sync.stop();
            log::info!("[overlay] {} tracking stopped", sync.role);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MemoryDesktop, MemoryTargets};
    use crate::overlay::layout::PANEL_MIN_HEIGHT;
    use crate::overlay::surface::{MemorySurface, MemorySurfaceFactory};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        deps: Arc<SyncDeps>,
        desktop: Arc<MemoryDesktop>,
        targets: Arc<MemoryTargets>,
        factory: Arc<MemorySurfaceFactory>,
        latch: Arc<HideLatch>,
        sync: OverlaySync,
    }

    impl Fixture {
        fn new(role: OverlayRole) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let desktop = Arc::new(MemoryDesktop::new());
            let targets = Arc::new(MemoryTargets::new());
            let factory = Arc::new(MemorySurfaceFactory::new());
            let latch = Arc::new(HideLatch::new());
            let deps = Arc::new(SyncDeps {
                resolver: Arc::new(HostResolver::standard(
                    desktop.clone(),
                    desktop.clone(),
                    desktop.clone(),
                    desktop.clone(),
                )),
                windows: desktop.clone(),
                side_panel: desktop.clone(),
                targets: targets.clone(),
                factory: factory.clone(),
                layout: Arc::new(PanelLayoutStore::new(dir.path().join("hud-layout.json"))),
            });
            let sync = OverlaySync::new(role, TrackingConfig::default(), deps.clone(), latch.clone());
            Self {
                _dir: dir,
                deps,
                desktop,
                targets,
                factory,
                latch,
                sync,
            }
        }

        /// Standalone window 1 hosting p1, focused.
        fn with_focused_host(role: OverlayRole) -> Self {
            let f = Self::new(role);
            f.desktop.add_window(1, ScreenRect::new(100, 100, 800, 600));
            f.desktop.register_instance("p1", 1);
            f.desktop.set_focused(Some(1));
            f.targets.set(role, Some("p1"));
            f
        }
    }

    #[test]
    fn test_absent_without_target_or_host() {
        let f = Fixture::new(OverlayRole::Fighter);
        assert_eq!(f.sync.tick(), SyncState::Absent);

        f.targets.set(OverlayRole::Fighter, Some("p1"));
        assert_eq!(f.sync.tick(), SyncState::Absent);
        assert_eq!(f.factory.created_count(OverlayRole::Fighter), 0);
    }

    #[test]
    fn test_covers_host_and_follows_focus() {
        let f = Fixture::with_focused_host(OverlayRole::Fighter);
        assert_eq!(f.sync.tick(), SyncState::VisibleFollowing);
        let surface = f.factory.latest(OverlayRole::Fighter).unwrap();
        let state = surface.state();
        assert_eq!(state.bounds, Some(ScreenRect::new(100, 100, 800, 600)));
        assert!(state.visible);

        f.desktop.add_window(2, ScreenRect::new(0, 0, 10, 10));
        f.desktop.set_focused(Some(2));
        assert_eq!(f.sync.tick(), SyncState::HiddenUnfocused);
        assert!(!surface.state().visible);
    }

    #[test]
    fn test_child_and_side_panel_count_as_focus() {
        let f = Fixture::with_focused_host(OverlayRole::Fighter);
        f.desktop.add_window(5, ScreenRect::new(0, 0, 50, 50));
        f.desktop.set_parent(5, Some(1));
        f.desktop.set_focused(Some(5));
        assert_eq!(f.sync.tick(), SyncState::VisibleFollowing);

        f.desktop.add_window(6, ScreenRect::new(0, 0, 50, 50));
        f.desktop.set_side_panel(Some(6));
        f.desktop.set_focused(Some(6));
        assert_eq!(f.sync.tick(), SyncState::VisibleFollowing);

        f.desktop.set_focused(None);
        assert_eq!(f.sync.tick(), SyncState::HiddenUnfocused);
    }

    #[test]
    fn test_minimized_host_hides() {
        let f = Fixture::with_focused_host(OverlayRole::Fighter);
        f.sync.tick();
        f.desktop.set_minimized(1, true);
        assert_eq!(f.sync.tick(), SyncState::HiddenUnfocused);
    }

    #[test]
    fn test_host_closed_goes_absent_and_hides() {
        let f = Fixture::with_focused_host(OverlayRole::Fighter);
        f.sync.tick();
        let surface = f.factory.latest(OverlayRole::Fighter).unwrap();
        f.desktop.close_window(1);
        assert_eq!(f.sync.tick(), SyncState::Absent);
        assert!(!surface.state().visible);
    }

    #[test]
    fn test_move_fades_until_settled() {
        let f = Fixture::with_focused_host(OverlayRole::Fighter);
        let t0 = Instant::now();
        f.sync.tick_at(t0);
        let surface = f.factory.latest(OverlayRole::Fighter).unwrap();
        assert_eq!(surface.state().opacity, 1.0);

        f.desktop.set_bounds(1, ScreenRect::new(120, 100, 800, 600));
        f.sync.tick_at(t0 + Duration::from_millis(50));
        assert_eq!(surface.state().opacity, 0.0);
        assert_eq!(surface.state().bounds, Some(ScreenRect::new(120, 100, 800, 600)));

        f.desktop.set_bounds(1, ScreenRect::new(140, 100, 800, 600));
        f.sync.tick_at(t0 + Duration::from_millis(100));
        f.sync.tick_at(t0 + Duration::from_millis(150));
        assert_eq!(surface.state().opacity, 0.0);

        f.sync.tick_at(t0 + Duration::from_millis(200));
        assert_eq!(surface.state().opacity, 1.0);
    }

    #[test]
    fn test_owner_change_reparents_instead_of_recreating() {
        let f = Fixture::with_focused_host(OverlayRole::Fighter);
        f.sync.tick();

        f.desktop.unregister_instance("p1");
        f.desktop.add_window(3, ScreenRect::new(0, 0, 1000, 800));
        let tabs = f.desktop.add_session(3);
        tabs.open("p1", ScreenRect::new(0, 40, 1000, 760));
        tabs.activate("p1");
        f.desktop.set_focused(Some(3));

        assert_eq!(f.sync.tick(), SyncState::VisibleFollowing);
        assert_eq!(f.factory.created_count(OverlayRole::Fighter), 1);
        let state = f.factory.latest(OverlayRole::Fighter).unwrap().state();
        assert_eq!(state.owner, Some(3));
        assert_eq!(state.reparent_count, 1);
        assert_eq!(state.bounds, Some(ScreenRect::new(0, 40, 1000, 760)));
    }

    #[test]
    fn test_closed_surface_is_recreated() {
        let f = Fixture::with_focused_host(OverlayRole::Support);
        f.sync.tick();
        f.factory.latest(OverlayRole::Support).unwrap().close();
        f.sync.tick();
        assert_eq!(f.factory.created_count(OverlayRole::Support), 2);
        assert!(f.factory.latest(OverlayRole::Support).unwrap().state().visible);
    }

    #[test]
    fn test_latch_holds_hidden() {
        let f = Fixture::with_focused_host(OverlayRole::Fighter);
        f.sync.tick();
        f.latch.set_dialog(true);
        assert_eq!(f.sync.tick(), SyncState::HiddenUnfocused);
        assert!(!f.factory.latest(OverlayRole::Fighter).unwrap().state().visible);
        assert!(!panel(&f, OverlayRole::Fighter).state().visible);

        f.latch.set_dialog(false);
        assert_eq!(f.sync.tick(), SyncState::VisibleFollowing);
    }

    #[test]
    fn test_snapshots_forwarded_to_surface() {
        let f = Fixture::with_focused_host(OverlayRole::Fighter);
        let (tx, rx) = watch::channel(HudSnapshot::empty(OverlayRole::Fighter));
        f.sync.attach_snapshots(rx);
        f.sync.tick();
        let surface = f.factory.latest(OverlayRole::Fighter).unwrap();
        assert_eq!(surface.state().last_update.unwrap().exp_pct, None);

        let mut next = HudSnapshot::empty(OverlayRole::Fighter);
        next.exp_pct = Some(42.0);
        tx.send_replace(next);
        f.sync.tick();
        assert_eq!(surface.state().last_update.unwrap().exp_pct, Some(42.0));
    }

    #[test]
    fn test_stop_closes_surface() {
        let f = Fixture::with_focused_host(OverlayRole::Fighter);
        f.sync.tick();
        f.sync.stop();
        assert!(!f.factory.latest(OverlayRole::Fighter).unwrap().is_alive());
        assert!(!panel(&f, OverlayRole::Fighter).is_alive());
        assert!(f.sync.surface().is_none());
        assert!(f.sync.panel().is_none());
        assert_eq!(f.sync.state(), SyncState::Absent);
    }

    fn panel(f: &Fixture, role: OverlayRole) -> Arc<MemorySurface> {
        f.factory.latest_of(role, SurfaceKind::ControlPanel).unwrap()
    }

    #[test]
    fn test_control_panel_follows_host() {
        let f = Fixture::with_focused_host(OverlayRole::Fighter);
        f.sync.tick();
        let state = panel(&f, OverlayRole::Fighter).state();
        assert_eq!(state.bounds, Some(ScreenRect::new(114, 114, 160, 60)));
        assert!(state.visible);

        f.desktop.set_bounds(1, ScreenRect::new(300, 200, 800, 600));
        f.sync.tick();
        assert_eq!(
            panel(&f, OverlayRole::Fighter).state().bounds,
            Some(ScreenRect::new(314, 214, 160, 60))
        );

        f.desktop.add_window(2, ScreenRect::new(0, 0, 10, 10));
        f.desktop.set_focused(Some(2));
        f.sync.tick();
        assert!(!panel(&f, OverlayRole::Fighter).state().visible);
    }

    #[test]
    fn test_control_panel_is_reparented_with_host() {
        let f = Fixture::with_focused_host(OverlayRole::Fighter);
        f.sync.tick();

        f.desktop.unregister_instance("p1");
        f.desktop.add_window(3, ScreenRect::new(0, 0, 1000, 800));
        let tabs = f.desktop.add_session(3);
        tabs.open("p1", ScreenRect::new(0, 40, 1000, 760));
        tabs.activate("p1");
        f.desktop.set_focused(Some(3));
        f.sync.tick();

        let state = panel(&f, OverlayRole::Fighter).state();
        assert_eq!(state.owner, Some(3));
        assert_eq!(state.reparent_count, 1);
        assert_eq!(state.bounds, Some(ScreenRect::new(14, 54, 160, 60)));
    }

    #[test]
    fn test_panel_box_is_persisted_and_applied() {
        let f = Fixture::with_focused_host(OverlayRole::Support);
        let moved = PanelBox {
            x: 40,
            y: 20,
            width: 300,
            height: 0,
        };
        f.sync.set_panel_box(moved).unwrap();
        f.sync.tick();
        assert_eq!(
            panel(&f, OverlayRole::Support).state().bounds,
            Some(ScreenRect::new(140, 120, 300, PANEL_MIN_HEIGHT))
        );

        let reopened = OverlaySync::new(
            OverlayRole::Support,
            TrackingConfig::default(),
            f.deps.clone(),
            f.latch.clone(),
        );
        assert_eq!(reopened.panel_box(), moved);
    }
}
