//! Capture → recognize → parse → smooth loop for one overlay role.
//!
//! Each tick resolves the role's host, grabs one frame, crops every field
//! that is due, sends the crops to the shared recognition gateway and folds
//! the parsed readings into the current snapshot. The snapshot is published
//! on a `watch` channel only when it differs from the last published one.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{Local, Utc};
use image::RgbaImage;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::smoothing::{ExpSmoother, GlitchPolicy, SmoothingOutcome};
use super::snapshot::HudSnapshot;
use crate::capture::{crop_pixels, encode_png, region_to_pixels, FrameSource};
use crate::config::SamplingConfig;
use crate::error::RecognitionError;
use crate::host::{HostResolver, OverlayTargets};
use crate::ocr::{self, OcrGateway, Recognition, RecognitionHint};
use crate::regions::{RegionKey, RegionSet, RegionStore, RegionVisibility, RegionVisibilityStore};
use crate::role::OverlayRole;

/// What a single tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick was still running.
    Skipped,
    /// The role has no target profile.
    NoTarget,
    /// The target is not on screen; previous values are kept.
    NoHost,
    /// The host frame could not be captured.
    CaptureFailed,
    /// Fields were sampled but the published values did not change.
    Unchanged,
    /// A new snapshot was published.
    Published,
    /// The loop stopped while this tick was running; its readings were dropped.
    Cancelled,
}

/// Everything the pipeline reads from outside.
pub struct PipelineDeps {
    pub resolver: Arc<HostResolver>,
    pub frames: Arc<dyn FrameSource>,
    pub gateway: Arc<OcrGateway>,
    pub regions: Arc<RegionStore>,
    pub visibility: Arc<RegionVisibilityStore>,
    pub targets: Arc<dyn OverlayTargets>,
}

struct SamplerState {
    target: Option<String>,
    regions: RegionSet,
    visibility: RegionVisibility,
    last_sampled: HashMap<RegionKey, Instant>,
    exp: ExpSmoother,
    rm_exp: ExpSmoother,
    current: HudSnapshot,
    last_key: Option<String>,
    ticks: u64,
}

impl SamplerState {
    fn new(role: OverlayRole, glitch: &GlitchPolicy) -> Self {
        Self {
            target: None,
            regions: RegionSet::new(),
            visibility: RegionVisibility::new(),
            last_sampled: HashMap::new(),
            exp: ExpSmoother::new(glitch.clone()),
            rm_exp: ExpSmoother::new(glitch.clone()),
            current: HudSnapshot::empty(role),
            last_key: None,
            ticks: 0,
        }
    }

    /// Drops every reading, e.g. when the role switches to another profile.
    fn clear_readings(&mut self, role: OverlayRole) {
        self.last_sampled.clear();
        self.exp.reset();
        self.rm_exp.reset();
        self.current = HudSnapshot::empty(role);
    }
}

/// Clears the in-flight flag when a tick ends, even by panic.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SamplingPipeline {
    role: OverlayRole,
    config: SamplingConfig,
    glitch: GlitchPolicy,
    deps: PipelineDeps,
    debug_dir: Option<PathBuf>,
    in_flight: AtomicBool,
    state: Mutex<SamplerState>,
    publisher: watch::Sender<HudSnapshot>,
}

impl SamplingPipeline {
    pub fn new(
        role: OverlayRole,
        config: SamplingConfig,
        glitch: GlitchPolicy,
        deps: PipelineDeps,
    ) -> Self {
        let (publisher, _) = watch::channel(HudSnapshot::empty(role));
        Self {
            role,
            state: Mutex::new(SamplerState::new(role, &glitch)),
            config,
            glitch,
            deps,
            debug_dir: None,
            in_flight: AtomicBool::new(false),
            publisher,
        }
    }

    /// Where crops are dumped when `debug_every_n` is set.
    pub fn with_debug_dir(mut self, dir: PathBuf) -> Self {
        self.debug_dir = Some(dir);
        self
    }

    pub fn role(&self) -> OverlayRole {
        self.role
    }

    pub fn glitch_policy(&self) -> &GlitchPolicy {
        &self.glitch
    }

    fn lock(&self) -> MutexGuard<'_, SamplerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Receives every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<HudSnapshot> {
        self.publisher.subscribe()
    }

    /// The last published snapshot.
    pub fn latest(&self) -> HudSnapshot {
        self.publisher.borrow().clone()
    }

    /// Reloads target, regions and visibility from the stores.
    ///
    /// Fields whose region changed are sampled on the next tick. Switching
    /// to a different target drops all previous readings.
    pub fn refresh_from_store(&self) {
        let target = self.deps.targets.target_for(self.role);
        let (regions, visibility) = match target.as_deref() {
            Some(profile) => (self.load_regions(profile), self.load_visibility(profile)),
            None => (RegionSet::new(), RegionVisibility::new()),
        };

        let mut state = self.lock();
        if state.target != target {
            log::info!(
                "[sampler] {} target changed: {:?} -> {:?}",
                self.role,
                state.target,
                target
            );
            state.clear_readings(self.role);
            state.target = target;
        }
        for key in RegionKey::ALL {
            if state.regions.get(key) != regions.get(key) {
                state.last_sampled.remove(&key);
            }
        }
        state.regions = regions;
        state.visibility = visibility;
        self.publish_if_changed(&mut state);
    }

    fn load_regions(&self, profile: &str) -> RegionSet {
        match self.deps.regions.get(profile) {
            Ok(set) => set
                .unwrap_or_default()
                .filtered(self.role.tracked_keys()),
            Err(e) => {
                log::warn!("[sampler] failed to load regions for {}: {}", profile, e);
                RegionSet::new()
            }
        }
    }

    fn load_visibility(&self, profile: &str) -> RegionVisibility {
        self.deps.visibility.get(profile).unwrap_or_else(|e| {
            log::warn!("[sampler] failed to load visibility for {}: {}", profile, e);
            RegionVisibility::new()
        })
    }

    fn cadence(&self, key: RegionKey) -> Duration {
        match key {
            RegionKey::Exp | RegionKey::RmExp => Duration::ZERO,
            RegionKey::Charname | RegionKey::Lvl => {
                Duration::from_millis(self.config.name_level_every_ms)
            }
            RegionKey::Lauftext | RegionKey::EnemyName | RegionKey::EnemyHp => {
                Duration::from_millis(self.config.text_every_ms)
            }
        }
    }

    pub async fn tick(&self) -> TickOutcome {
        self.tick_at(Instant::now()).await
    }

    /// Runs one tick as of `now`, unless one is already running.
    pub async fn tick_at(&self, now: Instant) -> TickOutcome {
        self.guarded_tick(now, None).await
    }

    async fn guarded_tick(&self, now: Instant, cancel: Option<&CancellationToken>) -> TickOutcome {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            log::debug!("[sampler] {} tick skipped, previous still running", self.role);
            return TickOutcome::Skipped;
        }
        let _guard = InFlight(&self.in_flight);
        self.run_tick(now, cancel).await
    }

    async fn run_tick(&self, now: Instant, cancel: Option<&CancellationToken>) -> TickOutcome {
        let (target, due, dump) = {
            let mut state = self.lock();
            let Some(target) = state.target.clone() else {
                return TickOutcome::NoTarget;
            };
            state.ticks += 1;
            let dump = self.config.debug_every_n > 0
                && state.ticks % u64::from(self.config.debug_every_n) == 0;
            let due: Vec<_> = state
                .regions
                .iter()
                .filter(|(key, _)| {
                    state
                        .last_sampled
                        .get(key)
                        .is_none_or(|at| now.duration_since(*at) >= self.cadence(*key))
                })
                .collect();
            (target, due, dump)
        };

        let Some(host) = self.deps.resolver.resolve(&target) else {
            return TickOutcome::NoHost;
        };
        if due.is_empty() {
            return TickOutcome::Unchanged;
        }

        let frame = match self.deps.frames.capture_host(&host).await {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("[sampler] {} capture failed: {}", self.role, e);
                return TickOutcome::CaptureFailed;
            }
        };
        let (width, height) = frame.dimensions();

        let mut readings = Vec::with_capacity(due.len());
        for (key, region) in due {
            let rect = region_to_pixels(&region, width, height);
            let crop = match crop_pixels(&frame, rect) {
                Ok(crop) => crop,
                Err(e) => {
                    log::warn!("[sampler] {} crop failed: {}", key, e);
                    continue;
                }
            };
            if dump {
                self.dump_crop(key, &crop);
            }
            match self.recognize(key, &crop).await {
                Ok(rec) => readings.push((key, Some(rec))),
                Err(e) => {
                    log::warn!("[sampler] {} recognition failed: {}", key, e);
                    readings.push((key, None));
                }
            }
        }

        if cancel.is_some_and(CancellationToken::is_cancelled) {
            log::debug!("[sampler] {} stopped mid-tick, dropping readings", self.role);
            return TickOutcome::Cancelled;
        }
        let mut state = self.lock();
        if state.target.as_deref() != Some(target.as_str()) {
            // Retargeted while recognizing; these readings belong to the old profile.
            return TickOutcome::Unchanged;
        }
        for (key, rec) in readings {
            state.last_sampled.insert(key, now);
            if let Some(rec) = rec {
                self.apply_reading(&mut state, key, rec);
            }
        }
        if self.publish_if_changed(&mut state) {
            TickOutcome::Published
        } else {
            TickOutcome::Unchanged
        }
    }

    async fn recognize(
        &self,
        key: RegionKey,
        crop: &RgbaImage,
    ) -> Result<Recognition, RecognitionError> {
        let png = encode_png(crop)?;
        self.deps
            .gateway
            .recognize(&png, RecognitionHint::for_key(key))
            .await
    }

    fn dump_crop(&self, key: RegionKey, crop: &RgbaImage) {
        let Some(dir) = &self.debug_dir else {
            return;
        };
        let path = dir.join(format!(
            "{}_{}.png",
            key,
            Local::now().format("%Y%m%d_%H%M%S%3f")
        ));
        if let Err(e) = std::fs::create_dir_all(dir).map_err(|e| e.to_string()).and_then(|_| {
            crop.save(&path).map_err(|e| e.to_string())
        }) {
            log::warn!("[sampler] failed to dump {}: {}", path.display(), e);
        }
    }

    fn apply_reading(&self, state: &mut SamplerState, key: RegionKey, rec: Recognition) {
        let raw = rec.raw.clone();
        match key {
            RegionKey::Exp | RegionKey::RmExp => {
                match ocr::exp_from_response(&rec.raw, rec.value.as_deref()) {
                    Ok(value) => {
                        let (smoother, slot) = if key == RegionKey::Exp {
                            (&mut state.exp, &mut state.current.exp_pct)
                        } else {
                            (&mut state.rm_exp, &mut state.current.rm_exp_pct)
                        };
                        match smoother.push(value) {
                            SmoothingOutcome::Accepted(median) => *slot = Some(median),
                            SmoothingOutcome::Restarted(value) => {
                                log::info!("[sampler] {} wrapped to {}, smoothing restarted", key, value);
                                *slot = Some(value);
                            }
                            SmoothingOutcome::Rejected => {
                                log::debug!("[sampler] {} rejected implausible {}", key, value)
                            }
                        }
                    }
                    Err(e) => log::debug!("[sampler] {} unreadable: {}", key, e),
                }
            }
            RegionKey::Charname => match ocr::parse_name_level(&rec.raw) {
                Ok(parsed) => {
                    if let Some(name) = parsed.name {
                        state.current.name = Some(name);
                    }
                    if let Some(level) = parsed.level {
                        self.apply_level(state, level);
                    }
                }
                Err(e) => log::debug!("[sampler] {} unreadable: {}", key, e),
            },
            RegionKey::Lvl => match ocr::parse_level(&rec.raw) {
                Ok(level) => self.apply_level(state, level),
                Err(e) => log::debug!("[sampler] {} unreadable: {}", key, e),
            },
            RegionKey::Lauftext | RegionKey::EnemyName => match ocr::parse_text(&rec.raw) {
                Ok(text) if key == RegionKey::Lauftext => state.current.lauftext = Some(text),
                Ok(text) => state.current.enemy_name = Some(text),
                Err(e) => log::debug!("[sampler] {} unreadable: {}", key, e),
            },
            RegionKey::EnemyHp => match ocr::parse_hp(&rec.raw) {
                Ok(hp) => state.current.enemy_hp = Some(hp),
                Err(e) => log::debug!("[sampler] {} unreadable: {}", key, e),
            },
        }
        state.current.raw.insert(key, raw);
    }

    /// A new level restarts the percentage scale, so the smoothing baseline
    /// and the old level's percentage go.
    fn apply_level(&self, state: &mut SamplerState, level: u32) {
        if let Some(previous) = state.current.level {
            if previous != level {
                log::info!("[sampler] level changed {} -> {}, resetting exp history", previous, level);
                state.exp.reset();
                state.current.exp_pct = None;
            }
        }
        state.current.level = Some(level);
    }

    /// Publishes the current snapshot if its change key differs from the last.
    fn publish_if_changed(&self, state: &mut SamplerState) -> bool {
        state.current.profile_id = state.target.clone();
        state.current.visibility = state.visibility.clone();
        let key = state.current.change_key();
        if state.last_key.as_deref() == Some(key.as_str()) {
            return false;
        }
        state.last_key = Some(key);
        state.current.ts = Utc::now().timestamp_millis();
        self.publisher.send_replace(state.current.clone());
        true
    }

    /// Acquires the gateway, loads the stores and samples until `cancel`.
    ///
    /// Each tick runs as its own task so a slow tick never delays the
    /// schedule; a tick that would overlap the running one is skipped. On
    /// cancel the running tick is awaited and its readings dropped before
    /// the gateway reference is released.
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            pipeline.deps.gateway.acquire().await;
            pipeline.refresh_from_store();
            log::info!(
                "[sampler] {} started ({} ms interval)",
                pipeline.role,
                pipeline.config.interval_ms
            );

            let mut ticker = tokio::time::interval(pipeline.config.interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut running: Option<JoinHandle<TickOutcome>> = None;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if running.as_ref().is_some_and(|t| !t.is_finished()) {
                            log::debug!("[sampler] {} tick skipped, previous still running", pipeline.role);
                        } else {
                            let p = Arc::clone(&pipeline);
                            let token = cancel.clone();
                            running = Some(tokio::spawn(async move {
                                p.guarded_tick(Instant::now(), Some(&token)).await
                            }));
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }

            if let Some(tick) = running.take() {
                if let Err(e) = tick.await {
                    log::warn!("[sampler] {} tick task failed: {}", pipeline.role, e);
                }
            }
            pipeline.deps.gateway.release().await;
            log::info!("[sampler] {} stopped", pipeline.role);
        })
    }
}
