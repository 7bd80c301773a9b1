//! Periodic sampling of calibrated regions.
//!
//! This module provides:
//! - The glitch filter and median smoother for percentage fields (`smoothing`)
//! - The snapshot published to HUD consumers (`snapshot`)
//! - The per-role capture/recognize/parse loop (`sampler`)

pub mod sampler;
pub mod smoothing;
pub mod snapshot;

pub use sampler::{PipelineDeps, SamplingPipeline, TickOutcome};
pub use smoothing::{ExpSmoother, GlitchPolicy, SmoothingOutcome};
pub use snapshot::HudSnapshot;
