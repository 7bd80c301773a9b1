//! Calibration sessions.
//!
//! Opening a session resolves the profile's host, freezes one screenshot of
//! it and shows a calibrator over the host. Every finished drag arrives as
//! an incremental `rois` message and is persisted immediately; `ok` or
//! `cancel` ends the session. While open, the calibrator optionally follows
//! the host as it moves.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::time::MissedTickBehavior;

use super::channel::{CalibrationHub, CalibrationMessage, SessionChannel};
use super::preview::render_regions;
use super::surface::{CalibratorInit, CalibratorSurfaces, CalibratorWindow};
use crate::capture::{encode_png, FrameSource, ScreenRect};
use crate::config::CalibrationConfig;
use crate::error::{CalibrationError, CaptureError};
use crate::host::HostResolver;
use crate::pipeline::SamplingPipeline;
use crate::regions::{RegionKey, RegionSet, RegionStore};
use crate::role::OverlayRole;

/// How a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The user confirmed.
    Saved,
    Cancelled,
    /// The calibrator window went away without a final message.
    Closed,
}

/// Something that reloads regions after a calibration save.
pub trait RegionsRefresh: Send + Sync {
    fn refresh_from_store(&self);
}

impl RegionsRefresh for SamplingPipeline {
    fn refresh_from_store(&self) {
        SamplingPipeline::refresh_from_store(self);
    }
}

pub struct CalibrationDeps {
    pub resolver: Arc<HostResolver>,
    pub frames: Arc<dyn FrameSource>,
    pub regions: Arc<RegionStore>,
    pub hub: Arc<CalibrationHub>,
    pub surfaces: Arc<dyn CalibratorSurfaces>,
}

type OpenProfiles = Arc<Mutex<HashSet<String>>>;

fn lock_profiles(profiles: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    profiles.lock().unwrap_or_else(|e| e.into_inner())
}

/// Marks a profile as being calibrated until dropped.
struct ProfileClaim {
    profile_id: String,
    open: OpenProfiles,
}

impl Drop for ProfileClaim {
    fn drop(&mut self) {
        lock_profiles(&self.open).remove(&self.profile_id);
    }
}

/// Opens calibration sessions, at most one per profile at a time.
pub struct CalibrationController {
    config: CalibrationConfig,
    deps: Arc<CalibrationDeps>,
    refresh: Mutex<Vec<Arc<dyn RegionsRefresh>>>,
    open: OpenProfiles,
}

impl CalibrationController {
    pub fn new(config: CalibrationConfig, deps: Arc<CalibrationDeps>) -> Self {
        Self {
            config,
            deps,
            refresh: Mutex::new(Vec::new()),
            open: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Registers a consumer to refresh after every successful save.
    pub fn add_refresh_target(&self, target: Arc<dyn RegionsRefresh>) {
        self.refresh
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(target);
    }

    pub fn is_open(&self, profile_id: &str) -> bool {
        lock_profiles(&self.open).contains(profile_id)
    }

    /// Shows a calibrator for `profile_id`.
    ///
    /// The support role may only edit `rmExp`; every other role may edit
    /// every field. Existing regions outside the allowed fields are neither
    /// shown nor touched.
    pub async fn open(
        &self,
        profile_id: &str,
        role: OverlayRole,
        active: Option<RegionKey>,
    ) -> Result<CalibrationSession, CalibrationError> {
        if !lock_profiles(&self.open).insert(profile_id.to_string()) {
            return Err(CalibrationError::AlreadyOpen(profile_id.to_string()));
        }
        let claim = ProfileClaim {
            profile_id: profile_id.to_string(),
            open: Arc::clone(&self.open),
        };

        let host = self
            .deps
            .resolver
            .resolve(profile_id)
            .ok_or_else(|| CalibrationError::NoHost(profile_id.to_string()))?;
        let frame = self.deps.frames.capture_host(&host).await?;

        let allowed = role.calibration_keys().to_vec();
        let existing = self
            .deps
            .regions
            .get(profile_id)?
            .unwrap_or_default()
            .filtered(&allowed);
        let active = active.filter(|k| allowed.contains(k));
        let preview = render_regions(&frame, &existing, active);
        let preview_png = encode_png(&preview).map_err(CaptureError::from)?;

        let channel = self.deps.hub.open();
        let window = self
            .deps
            .surfaces
            .open(CalibratorInit {
                session_id: channel.id().to_string(),
                profile_id: profile_id.to_string(),
                role,
                owner: host.owner,
                bounds: host.rect,
                preview_png,
                existing,
                allowed_keys: allowed.clone(),
                active_key: active,
            })
            .await?;

        log::info!(
            "[calibration] opened session {} for {} ({}, {} editable fields)",
            channel.id(),
            profile_id,
            role,
            allowed.len()
        );

        let refresh = self
            .refresh
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        Ok(CalibrationSession {
            profile_id: profile_id.to_string(),
            allowed,
            config: self.config.clone(),
            deps: Arc::clone(&self.deps),
            refresh,
            channel,
            window,
            last_bounds: host.rect,
            _claim: claim,
        })
    }

    /// Opens a session and drives it to the end.
    pub async fn calibrate(
        &self,
        profile_id: &str,
        role: OverlayRole,
        active: Option<RegionKey>,
    ) -> Result<SessionOutcome, CalibrationError> {
        let session = self.open(profile_id, role, active).await?;
        Ok(session.run().await)
    }
}

/// One open calibrator.
pub struct CalibrationSession {
    profile_id: String,
    allowed: Vec<RegionKey>,
    config: CalibrationConfig,
    deps: Arc<CalibrationDeps>,
    refresh: Vec<Arc<dyn RegionsRefresh>>,
    channel: SessionChannel,
    window: Arc<dyn CalibratorWindow>,
    last_bounds: ScreenRect,
    _claim: ProfileClaim,
}

impl CalibrationSession {
    /// Id the calibrator surface addresses its messages to.
    pub fn id(&self) -> &str {
        self.channel.id()
    }

    pub fn allowed_keys(&self) -> &[RegionKey] {
        &self.allowed
    }

    /// Handles messages and follows the host until the session ends.
    ///
    /// A failed save is answered with the error and the session stays open.
    pub async fn run(mut self) -> SessionOutcome {
        let mut ticker = tokio::time::interval(self.config.follow_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let outcome = loop {
            tokio::select! {
                envelope = self.channel.recv() => {
                    let Some(envelope) = envelope else {
                        break SessionOutcome::Closed;
                    };
                    match envelope.message.clone() {
                        CalibrationMessage::Rois(rois) => {
                            let result = self.persist(&rois);
                            if let Err(e) = &result {
                                log::warn!("[calibration] save for {} failed: {}", self.profile_id, e);
                            }
                            envelope.respond(result);
                        }
                        CalibrationMessage::Ok => {
                            envelope.respond(Ok(()));
                            break SessionOutcome::Saved;
                        }
                        CalibrationMessage::Cancel => {
                            envelope.respond(Ok(()));
                            break SessionOutcome::Cancelled;
                        }
                    }
                }
                _ = ticker.tick() => {
                    if !self.window.is_open() {
                        break SessionOutcome::Closed;
                    }
                    if self.config.follow {
                        self.follow_host();
                    }
                }
            }
        };

        self.channel.close();
        self.window.close();
        log::info!(
            "[calibration] session {} for {} ended: {:?}",
            self.channel.id(),
            self.profile_id,
            outcome
        );
        outcome
    }

    /// Persists one incremental save and tells consumers to reload.
    fn persist(&self, rois: &RegionSet) -> Result<(), CalibrationError> {
        if let Some(key) = rois.keys().find(|k| !self.allowed.contains(k)) {
            return Err(CalibrationError::KeyNotAllowed(key));
        }
        let stored = self
            .deps
            .regions
            .apply_calibration(&self.profile_id, &rois.clamped(), &self.allowed)?;
        log::info!(
            "[calibration] saved {} for {} ({} regions stored)",
            rois.keys().map(|k| k.as_str()).collect::<Vec<_>>().join(","),
            self.profile_id,
            stored.len()
        );
        for target in &self.refresh {
            target.refresh_from_store();
        }
        Ok(())
    }

    /// Moves the calibrator to the host's current rectangle if it changed.
    fn follow_host(&mut self) {
        let Some(host) = self.deps.resolver.resolve(&self.profile_id) else {
            return;
        };
        if host.rect != self.last_bounds {
            self.window.set_bounds(host.rect);
            self.last_bounds = host.rect;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::surface::MemoryCalibrators;
    use crate::capture::StillFrameSource;
    use crate::host::MemoryDesktop;
    use crate::regions::Region;
    use image::{Rgba, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingRefresh(AtomicUsize);

    impl RegionsRefresh for CountingRefresh {
        fn refresh_from_store(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        dir: TempDir,
        desktop: Arc<MemoryDesktop>,
        regions: Arc<RegionStore>,
        hub: Arc<CalibrationHub>,
        calibrators: Arc<MemoryCalibrators>,
        refreshed: Arc<CountingRefresh>,
        controller: Arc<CalibrationController>,
    }

    /// Profile p1 in standalone window 1 at (100,100) 400×300.
    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let desktop = Arc::new(MemoryDesktop::new());
        desktop.add_window(1, ScreenRect::new(100, 100, 400, 300));
        desktop.register_instance("p1", 1);

        let regions = Arc::new(RegionStore::new(dir.path().join("rois.json")));
        let hub = Arc::new(CalibrationHub::new());
        let calibrators = Arc::new(MemoryCalibrators::new());
        let deps = Arc::new(CalibrationDeps {
            resolver: Arc::new(HostResolver::standard(
                desktop.clone(),
                desktop.clone(),
                desktop.clone(),
                desktop.clone(),
            )),
            frames: Arc::new(StillFrameSource::new(RgbaImage::from_pixel(
                400,
                300,
                Rgba([20, 20, 20, 255]),
            ))),
            regions: regions.clone(),
            hub: hub.clone(),
            surfaces: calibrators.clone(),
        });
        let controller = Arc::new(CalibrationController::new(CalibrationConfig::default(), deps));
        let refreshed = Arc::new(CountingRefresh::default());
        controller.add_refresh_target(refreshed.clone());
        Fixture {
            dir,
            desktop,
            regions,
            hub,
            calibrators,
            refreshed,
            controller,
        }
    }

    fn fighter_regions() -> RegionSet {
        [
            (RegionKey::Exp, Region::new(0.5, 0.9, 0.1, 0.03)),
            (RegionKey::Lvl, Region::new(0.01, 0.01, 0.05, 0.03)),
            (RegionKey::Charname, Region::new(0.07, 0.01, 0.2, 0.03)),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn test_open_without_host_fails() {
        let f = fixture();
        let result = f.controller.open("nobody", OverlayRole::Fighter, None).await;
        assert!(matches!(result, Err(CalibrationError::NoHost(_))));
        assert!(!f.controller.is_open("nobody"));
    }

    #[tokio::test]
    async fn test_support_recalibration_keeps_fighter_regions() {
        let f = fixture();
        let mut stored = fighter_regions();
        stored.insert(RegionKey::RmExp, Region::new(0.1, 0.1, 0.1, 0.1));
        f.regions.set("p1", &stored).unwrap();

        let session = f.controller.open("p1", OverlayRole::Support, None).await.unwrap();
        let id = session.id().to_string();
        let (init, _) = f.calibrators.latest().unwrap();
        assert_eq!(init.allowed_keys, vec![RegionKey::RmExp]);
        assert_eq!(init.existing.keys().collect::<Vec<_>>(), vec![RegionKey::RmExp]);
        assert_eq!(init.bounds, ScreenRect::new(100, 100, 400, 300));
        assert!(!init.preview_png.is_empty());

        let run = tokio::spawn(session.run());
        let mut rois = RegionSet::new();
        rois.insert(RegionKey::RmExp, Region::new(0.3, 0.3, 0.2, 0.05));
        f.hub.send(&id, CalibrationMessage::Rois(rois)).await.unwrap();

        let after = f.regions.get("p1").unwrap().unwrap();
        assert_eq!(after.get(RegionKey::RmExp), Some(Region::new(0.3, 0.3, 0.2, 0.05)));
        for (key, region) in fighter_regions().iter() {
            assert_eq!(after.get(key), Some(region));
        }
        assert_eq!(f.refreshed.0.load(Ordering::SeqCst), 1);

        f.hub.send(&id, CalibrationMessage::Ok).await.unwrap();
        assert_eq!(run.await.unwrap(), SessionOutcome::Saved);
        assert!(!f.controller.is_open("p1"));

        let late = f.hub.send(&id, CalibrationMessage::Ok).await;
        assert!(matches!(late, Err(CalibrationError::UnknownSession(_))));
    }

    #[tokio::test]
    async fn test_rejected_save_keeps_session_open() {
        let f = fixture();
        let session = f.controller.open("p1", OverlayRole::Support, None).await.unwrap();
        let id = session.id().to_string();
        let run = tokio::spawn(session.run());

        let mut rois = RegionSet::new();
        rois.insert(RegionKey::Exp, Region::new(0.1, 0.1, 0.1, 0.1));
        let result = f.hub.send(&id, CalibrationMessage::Rois(rois)).await;
        assert!(matches!(result, Err(CalibrationError::KeyNotAllowed(RegionKey::Exp))));
        assert_eq!(f.regions.get("p1").unwrap(), None);

        f.hub.send(&id, CalibrationMessage::Cancel).await.unwrap();
        assert_eq!(run.await.unwrap(), SessionOutcome::Cancelled);
        assert_eq!(f.refreshed.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_returned_to_sender() {
        let f = fixture();
        let session = f.controller.open("p1", OverlayRole::Fighter, None).await.unwrap();
        let id = session.id().to_string();
        let run = tokio::spawn(session.run());

        // Replace the store file with a directory so reads fail.
        std::fs::create_dir(f.dir.path().join("rois.json")).unwrap();
        let result = f
            .hub
            .send(&id, CalibrationMessage::Rois(fighter_regions()))
            .await;
        assert!(matches!(result, Err(CalibrationError::Persistence(_))));
        assert!(f.hub.is_open(&id));

        std::fs::remove_dir(f.dir.path().join("rois.json")).unwrap();
        f.hub
            .send(&id, CalibrationMessage::Rois(fighter_regions()))
            .await
            .unwrap();
        f.hub.send(&id, CalibrationMessage::Ok).await.unwrap();
        assert_eq!(run.await.unwrap(), SessionOutcome::Saved);
        assert_eq!(f.regions.get("p1").unwrap(), Some(fighter_regions()));
    }

    #[tokio::test]
    async fn test_one_session_per_profile() {
        let f = fixture();
        let first = f.controller.open("p1", OverlayRole::Fighter, None).await.unwrap();
        let second = f.controller.open("p1", OverlayRole::Support, None).await;
        assert!(matches!(second, Err(CalibrationError::AlreadyOpen(_))));

        drop(first);
        assert!(!f.controller.is_open("p1"));
        assert!(f.controller.open("p1", OverlayRole::Support, None).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_follows_host_and_ends_when_window_closes() {
        let f = fixture();
        let session = f.controller.open("p1", OverlayRole::Fighter, Some(RegionKey::Exp)).await.unwrap();
        let id = session.id().to_string();
        let (init, window) = f.calibrators.latest().unwrap();
        assert_eq!(init.active_key, Some(RegionKey::Exp));
        let run = tokio::spawn(session.run());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(window.bounds_history().len(), 1);

        f.desktop.set_bounds(1, ScreenRect::new(150, 120, 400, 300));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            window.bounds_history(),
            vec![ScreenRect::new(100, 100, 400, 300), ScreenRect::new(150, 120, 400, 300)]
        );

        window.close();
        assert_eq!(run.await.unwrap(), SessionOutcome::Closed);
        assert!(!f.hub.is_open(&id));
    }
}
