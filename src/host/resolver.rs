//! Host resolution.
//!
//! A profile's game content can live in a standalone window, in a tab of one
//! of several session windows, or in a tab of the legacy session window. The
//! resolver asks an ordered list of providers and takes the first answer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::collaborators::{
    InstanceRegistry, LegacySession, SessionEntry, SessionRegistry, WindowId, WindowQuery,
};
use crate::capture::ScreenRect;

/// Where a profile's content is on screen right now. Recomputed every tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDescriptor {
    /// Top-level window that owns the content.
    pub owner: WindowId,
    /// Absolute screen rectangle of the content.
    pub rect: ScreenRect,
}

impl HostDescriptor {
    pub fn new(owner: WindowId, rect: ScreenRect) -> Self {
        Self { owner, rect }
    }
}

/// One hosting topology.
pub trait HostProvider: Send + Sync {
    /// Name used in log messages.
    fn name(&self) -> &'static str;
    /// Returns the host if this topology currently shows `profile_id`.
    fn resolve(&self, profile_id: &str) -> Option<HostDescriptor>;
}

/// A standalone window registered for the profile; its content area is the host.
pub struct StandaloneWindowProvider {
    windows: Arc<dyn WindowQuery>,
    instances: Arc<dyn InstanceRegistry>,
}

impl StandaloneWindowProvider {
    pub fn new(windows: Arc<dyn WindowQuery>, instances: Arc<dyn InstanceRegistry>) -> Self {
        Self { windows, instances }
    }
}

impl HostProvider for StandaloneWindowProvider {
    fn name(&self) -> &'static str {
        "standalone"
    }

    fn resolve(&self, profile_id: &str) -> Option<HostDescriptor> {
        let window = self.instances.window_for(profile_id)?;
        if !self.windows.is_alive(window) {
            return None;
        }
        let rect = self.windows.content_bounds(window)?;
        Some(HostDescriptor::new(window, rect))
    }
}

/// Window content bounds plus the active tab's view bounds.
fn resolve_in_session(
    windows: &dyn WindowQuery,
    entry: &SessionEntry,
    profile_id: &str,
) -> Option<HostDescriptor> {
    if !windows.is_alive(entry.window) || !entry.tabs.is_active(profile_id) {
        return None;
    }
    let content = windows.content_bounds(entry.window)?;
    let view = entry.tabs.view_bounds(profile_id)?;
    Some(HostDescriptor::new(entry.window, content.translate_child(view)))
}

/// Registered multi-window sessions, checked in registration order.
pub struct SessionRegistryProvider {
    windows: Arc<dyn WindowQuery>,
    registry: Arc<dyn SessionRegistry>,
}

impl SessionRegistryProvider {
    pub fn new(windows: Arc<dyn WindowQuery>, registry: Arc<dyn SessionRegistry>) -> Self {
        Self { windows, registry }
    }
}

impl HostProvider for SessionRegistryProvider {
    fn name(&self) -> &'static str {
        "session-registry"
    }

    fn resolve(&self, profile_id: &str) -> Option<HostDescriptor> {
        self.registry
            .sessions()
            .iter()
            .find_map(|entry| resolve_in_session(self.windows.as_ref(), entry, profile_id))
    }
}

/// The legacy singleton session window.
pub struct LegacySessionProvider {
    windows: Arc<dyn WindowQuery>,
    legacy: Arc<dyn LegacySession>,
}

impl LegacySessionProvider {
    pub fn new(windows: Arc<dyn WindowQuery>, legacy: Arc<dyn LegacySession>) -> Self {
        Self { windows, legacy }
    }
}

impl HostProvider for LegacySessionProvider {
    fn name(&self) -> &'static str {
        "legacy-session"
    }

    fn resolve(&self, profile_id: &str) -> Option<HostDescriptor> {
        let entry = self.legacy.session()?;
        resolve_in_session(self.windows.as_ref(), &entry, profile_id)
    }
}

/// Resolves a profile id to its current host by asking providers in order.
pub struct HostResolver {
    providers: Vec<Box<dyn HostProvider>>,
}

impl HostResolver {
    /// Builds a resolver from an explicit priority list (first wins).
    pub fn new(providers: Vec<Box<dyn HostProvider>>) -> Self {
        Self { providers }
    }

    /// Standalone window, then registered sessions, then the legacy session.
    pub fn standard(
        windows: Arc<dyn WindowQuery>,
        instances: Arc<dyn InstanceRegistry>,
        registry: Arc<dyn SessionRegistry>,
        legacy: Arc<dyn LegacySession>,
    ) -> Self {
        Self::new(vec![
            Box::new(StandaloneWindowProvider::new(windows.clone(), instances)),
            Box::new(SessionRegistryProvider::new(windows.clone(), registry)),
            Box::new(LegacySessionProvider::new(windows, legacy)),
        ])
    }

    /// Provider names in priority order.
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Returns the host for `profile_id`, or `None`.
    ///
    /// The first provider that reports the profile decides. A degenerate
    /// rectangle from that provider is reported as no host at all.
    pub fn resolve(&self, profile_id: &str) -> Option<HostDescriptor> {
        let (provider, host) = self
            .providers
            .iter()
            .find_map(|p| p.resolve(profile_id).map(|h| (p.name(), h)))?;

        if host.rect.is_degenerate() {
            log::debug!(
                "[host] {} reported degenerate rect {:?} for {}",
                provider,
                host.rect,
                profile_id
            );
            return None;
        }
        Some(host)
    }
}
