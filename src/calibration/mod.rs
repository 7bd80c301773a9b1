//! Interactive region calibration.
//!
//! This module provides:
//! - The pointer drag state machine (`drag`)
//! - Calibrator canvas state and input handling (`canvas`)
//! - One-shot per-session result channels (`channel`)
//! - Screenshot previews with regions drawn in (`preview`)
//! - The calibrator window seam (`surface`)
//! - Session lifecycle: open, incremental saves, follow, close (`session`)

pub mod canvas;
pub mod channel;
pub mod drag;
pub mod preview;
pub mod session;
pub mod surface;

pub use canvas::{CalibrationCanvas, CanvasEvent, KeyInput};
pub use channel::{CalibrationHub, CalibrationMessage, Envelope, SessionChannel};
pub use drag::{CanvasRect, DragState, Point};
pub use preview::render_regions;
pub use session::{
    CalibrationController, CalibrationDeps, CalibrationSession, RegionsRefresh, SessionOutcome,
};
pub use surface::{
    CalibratorInit, CalibratorSurfaces, CalibratorWindow, MemoryCalibratorWindow, MemoryCalibrators,
};
