//! Pointer drag state machine.
//!
//! `Idle -> Dragging -> Idle` per press/move/release cycle. The transition
//! functions are pure; the canvas owns the current state.

use crate::capture::pixels_to_region;
use crate::regions::{Region, RegionKey};

/// A point on the calibration canvas, in canvas pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle on the canvas with non-negative extent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl CanvasRect {
    /// Rectangle spanned by two corners, whichever way the drag went.
    /// A zero extent is widened to one pixel.
    pub fn spanning(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            w: (b.x - a.x).abs().max(1.0),
            h: (b.y - a.y).abs().max(1.0),
        }
    }

    /// Converts to a normalized region of a `width`×`height` canvas.
    pub fn to_region(self, width: f64, height: f64) -> Region {
        pixels_to_region(self.x, self.y, self.w, self.h, width, height)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        start: Point,
        current: Point,
        key: RegionKey,
    },
}

impl DragState {
    /// The candidate rectangle while dragging.
    pub fn candidate(&self) -> Option<(RegionKey, CanvasRect)> {
        match *self {
            DragState::Idle => None,
            DragState::Dragging { start, current, key } => {
                Some((key, CanvasRect::spanning(start, current)))
            }
        }
    }
}

/// Starts a new candidate at the press point. A press while already
/// dragging restarts the candidate.
pub fn pointer_down(_state: DragState, at: Point, key: RegionKey) -> DragState {
    DragState::Dragging {
        start: at,
        current: at,
        key,
    }
}

/// Resizes the candidate to the pointer; ignored while idle.
pub fn pointer_move(state: DragState, at: Point) -> DragState {
    match state {
        DragState::Idle => DragState::Idle,
        DragState::Dragging { start, key, .. } => DragState::Dragging {
            start,
            current: at,
            key,
        },
    }
}

/// Finishes the drag and returns the completed region, if one was in progress.
pub fn pointer_up(state: DragState, canvas_w: f64, canvas_h: f64) -> (DragState, Option<(RegionKey, Region)>) {
    let done = state
        .candidate()
        .map(|(key, rect)| (key, rect.to_region(canvas_w, canvas_h)));
    (DragState::Idle, done)
}
