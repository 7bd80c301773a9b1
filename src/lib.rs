//! Screen-region tracking and calibration for a game HUD overlay.
//!
//! Resolves where a profile's game content is on screen, keeps overlay
//! surfaces glued to it, samples calibrated regions through an external
//! recognition worker and lets the user draw those regions interactively.

pub mod calibration;
pub mod capture;
pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod ocr;
pub mod overlay;
pub mod paths;
pub mod pipeline;
pub mod regions;
pub mod role;
