//! Error types shared across the tracking core.
//!
//! None of these are allowed to escape a sampling or tracking tick; the loops
//! log them and carry on. Calibration and persistence errors do reach callers.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::capture::PixelRect;
use crate::regions::RegionKey;

/// A single screenshot or crop failed. The field is skipped for this tick.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("host surface is no longer available")]
    HostGone,
    #[error("crop {0:?} is empty")]
    EmptyRegion(PixelRect),
    #[error("capture backend failed: {0}")]
    Backend(String),
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// The recognition worker could not produce a result.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("recognition worker has not been acquired")]
    NotAcquired,
    #[error("invalid worker program {program:?}: {reason}")]
    InvalidProgram { program: String, reason: String },
    #[error("failed to spawn recognition worker: {0}")]
    Spawn(String),
    #[error("worker I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("worker did not answer within {0:?}")]
    Timeout(Duration),
    #[error("worker process exited")]
    Exited,
    #[error("malformed worker response: {0}")]
    Protocol(String),
    #[error("worker reported an error: {0}")]
    Worker(String),
    #[error("failed to encode crop: {0}")]
    Encode(#[from] image::ImageError),
}

impl RecognitionError {
    /// True when the worker process itself is suspect and should be respawned.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Timeout(_) | Self::Exited | Self::Protocol(_)
        )
    }
}

/// Recognized text did not have the expected shape; treated as "no reading".
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("no {expected} found in {raw:?}")]
    NoMatch { expected: &'static str, raw: String },
    #[error("{value} is outside {min}..={max}")]
    OutOfRange { value: f64, min: f64, max: f64 },
    #[error("invalid pattern: {0}")]
    Pattern(String),
}

/// Reading or writing a JSON store failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize store: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by the calibration flow.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("no host is currently showing profile {0}")]
    NoHost(String),
    #[error("a calibration session is already open for profile {0}")]
    AlreadyOpen(String),
    #[error("unknown or finished calibration session {0}")]
    UnknownSession(String),
    #[error("region {0} may not be edited in this session")]
    KeyNotAllowed(RegionKey),
    #[error("calibration surface failed: {0}")]
    Surface(String),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
