//! The calibrator window seam.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::capture::ScreenRect;
use crate::error::CalibrationError;
use crate::host::WindowId;
use crate::regions::{RegionKey, RegionSet};
use crate::role::OverlayRole;

/// Everything the shell needs to show a calibrator.
#[derive(Clone, Debug)]
pub struct CalibratorInit {
    /// Id the surface must address its messages to
    pub session_id: String,
    pub profile_id: String,
    pub role: OverlayRole,
    /// Window the calibrator sits over
    pub owner: WindowId,
    pub bounds: ScreenRect,
    /// Screenshot of the host with existing regions drawn in
    pub preview_png: Vec<u8>,
    pub existing: RegionSet,
    pub allowed_keys: Vec<RegionKey>,
    pub active_key: Option<RegionKey>,
}

/// An open calibrator window.
pub trait CalibratorWindow: Send + Sync {
    /// False once the user or the shell closed it.
    fn is_open(&self) -> bool;
    fn set_bounds(&self, rect: ScreenRect);
    fn close(&self);
}

/// Opens calibrator windows.
#[async_trait]
pub trait CalibratorSurfaces: Send + Sync {
    async fn open(&self, init: CalibratorInit) -> Result<Arc<dyn CalibratorWindow>, CalibrationError>;
}

/// A calibrator window that records bound changes.
#[derive(Debug)]
pub struct MemoryCalibratorWindow {
    open: AtomicBool,
    bounds: Mutex<Vec<ScreenRect>>,
}

impl MemoryCalibratorWindow {
    pub fn new(bounds: ScreenRect) -> Self {
        Self {
            open: AtomicBool::new(true),
            bounds: Mutex::new(vec![bounds]),
        }
    }

    /// Every bounds the window has had, oldest first.
    pub fn bounds_history(&self) -> Vec<ScreenRect> {
        self.bounds.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl CalibratorWindow for MemoryCalibratorWindow {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn set_bounds(&self, rect: ScreenRect) {
        self.bounds.lock().unwrap_or_else(|e| e.into_inner()).push(rect);
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// Opens `MemoryCalibratorWindow`s and remembers what each was opened with.
#[derive(Default)]
pub struct MemoryCalibrators {
    opened: Mutex<Vec<(CalibratorInit, Arc<MemoryCalibratorWindow>)>>,
}

impl MemoryCalibrators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<(CalibratorInit, Arc<MemoryCalibratorWindow>)> {
        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

#[async_trait]
impl CalibratorSurfaces for MemoryCalibrators {
    async fn open(&self, init: CalibratorInit) -> Result<Arc<dyn CalibratorWindow>, CalibrationError> {
        let window = Arc::new(MemoryCalibratorWindow::new(init.bounds));
        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((init, window.clone()));
        Ok(window)
    }
}
