//! Calibrator canvas state.
//!
//! Holds what the user sees while calibrating: the editable fields, the
//! active one, the regions drawn so far and the current drag. Input events
//! map to at most one outgoing `CalibrationMessage`.

use super::channel::CalibrationMessage;
use super::drag::{self, CanvasRect, DragState, Point};
use crate::regions::{RegionKey, RegionSet};

/// Keys the calibrator reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyInput {
    Tab,
    /// Number key `1..=9`
    Digit(u8),
    Enter,
    Escape,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CanvasEvent {
    PointerDown(Point),
    PointerMove(Point),
    PointerUp,
    Key(KeyInput),
    Resize { width: f64, height: f64 },
}

pub struct CalibrationCanvas {
    allowed: Vec<RegionKey>,
    active: RegionKey,
    regions: RegionSet,
    drag: DragState,
    width: f64,
    height: f64,
}

impl CalibrationCanvas {
    /// An empty `allowed` means every key; `active` falls back to the first allowed key.
    pub fn new(
        allowed: &[RegionKey],
        existing: RegionSet,
        active: Option<RegionKey>,
        width: f64,
        height: f64,
    ) -> Self {
        let allowed: Vec<RegionKey> = if allowed.is_empty() {
            RegionKey::ALL.to_vec()
        } else {
            allowed.to_vec()
        };
        let active = active
            .filter(|k| allowed.contains(k))
            .unwrap_or(allowed[0]);
        Self {
            regions: existing.filtered(&allowed),
            allowed,
            active,
            drag: DragState::Idle,
            width,
            height,
        }
    }

    pub fn active(&self) -> RegionKey {
        self.active
    }

    pub fn allowed(&self) -> &[RegionKey] {
        &self.allowed
    }

    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    /// Rectangle being dragged, for drawing.
    pub fn candidate(&self) -> Option<(RegionKey, CanvasRect)> {
        self.drag.candidate()
    }

    pub fn handle(&mut self, event: CanvasEvent) -> Option<CalibrationMessage> {
        match event {
            CanvasEvent::PointerDown(at) => {
                self.drag = drag::pointer_down(self.drag, at, self.active);
                None
            }
            CanvasEvent::PointerMove(at) => {
                self.drag = drag::pointer_move(self.drag, at);
                None
            }
            CanvasEvent::PointerUp => {
                let (next, done) = drag::pointer_up(self.drag, self.width, self.height);
                self.drag = next;
                let (key, region) = done?;
                self.regions.insert(key, region);
                Some(CalibrationMessage::Rois(self.regions.clone()))
            }
            CanvasEvent::Key(KeyInput::Tab) => {
                let i = self.allowed.iter().position(|&k| k == self.active).unwrap_or(0);
                self.active = self.allowed[(i + 1) % self.allowed.len()];
                None
            }
            CanvasEvent::Key(KeyInput::Digit(n)) => {
                if let Some(&key) = (n as usize).checked_sub(1).and_then(|i| self.allowed.get(i)) {
                    self.active = key;
                }
                None
            }
            CanvasEvent::Key(KeyInput::Enter) => Some(CalibrationMessage::Ok),
            CanvasEvent::Key(KeyInput::Escape) => Some(CalibrationMessage::Cancel),
            CanvasEvent::Resize { width, height } => {
                self.width = width;
                self.height = height;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions::Region;

    fn drag(canvas: &mut CalibrationCanvas, from: (f64, f64), to: (f64, f64)) -> Option<CalibrationMessage> {
        canvas.handle(CanvasEvent::PointerDown(Point::new(from.0, from.1)));
        canvas.handle(CanvasEvent::PointerMove(Point::new(to.0, to.1)));
        canvas.handle(CanvasEvent::PointerUp)
    }

    #[test]
    fn test_switching_fields_keeps_other_regions() {
        let mut canvas = CalibrationCanvas::new(&RegionKey::ALL, RegionSet::new(), None, 1000.0, 800.0);
        assert_eq!(canvas.active(), RegionKey::Lvl);
        drag(&mut canvas, (0.0, 0.0), (100.0, 80.0));

        canvas.handle(CanvasEvent::Key(KeyInput::Digit(3)));
        assert_eq!(canvas.active(), RegionKey::Exp);
        let msg = drag(&mut canvas, (100.0, 100.0), (50.0, 180.0));

        let Some(CalibrationMessage::Rois(rois)) = msg else {
            panic!("expected rois");
        };
        assert!(rois.contains(RegionKey::Lvl));
        let exp = rois.get(RegionKey::Exp).unwrap();
        assert!((exp.x - 0.05).abs() < 1e-9 && (exp.y - 0.125).abs() < 1e-9);
    }

    #[test]
    fn test_tab_cycles_and_digits_out_of_range_are_ignored() {
        let allowed = [RegionKey::Exp, RegionKey::Lvl];
        let mut canvas = CalibrationCanvas::new(&allowed, RegionSet::new(), Some(RegionKey::Lvl), 10.0, 10.0);
        assert_eq!(canvas.active(), RegionKey::Lvl);
        canvas.handle(CanvasEvent::Key(KeyInput::Tab));
        assert_eq!(canvas.active(), RegionKey::Exp);
        canvas.handle(CanvasEvent::Key(KeyInput::Digit(9)));
        canvas.handle(CanvasEvent::Key(KeyInput::Digit(0)));
        assert_eq!(canvas.active(), RegionKey::Exp);
    }

    #[test]
    fn test_support_canvas_only_sees_rm_exp() {
        let mut existing = RegionSet::new();
        existing.insert(RegionKey::Exp, Region::new(0.1, 0.1, 0.1, 0.1));
        existing.insert(RegionKey::RmExp, Region::new(0.2, 0.2, 0.1, 0.1));
        let mut canvas = CalibrationCanvas::new(&[RegionKey::RmExp], existing, Some(RegionKey::Exp), 100.0, 100.0);
        assert_eq!(canvas.active(), RegionKey::RmExp);
        assert!(!canvas.regions().contains(RegionKey::Exp));

        canvas.handle(CanvasEvent::Key(KeyInput::Tab));
        assert_eq!(canvas.active(), RegionKey::RmExp);
    }

    #[test]
    fn test_keys_emit_terminal_messages() {
        let mut canvas = CalibrationCanvas::new(&RegionKey::ALL, RegionSet::new(), None, 10.0, 10.0);
        assert_eq!(canvas.handle(CanvasEvent::Key(KeyInput::Enter)), Some(CalibrationMessage::Ok));
        assert_eq!(canvas.handle(CanvasEvent::Key(KeyInput::Escape)), Some(CalibrationMessage::Cancel));
        assert_eq!(canvas.handle(CanvasEvent::PointerUp), None);
    }

    #[test]
    fn test_resize_changes_normalization() {
        let mut canvas = CalibrationCanvas::new(&RegionKey::ALL, RegionSet::new(), None, 100.0, 100.0);
        canvas.handle(CanvasEvent::Resize { width: 200.0, height: 100.0 });
        let Some(CalibrationMessage::Rois(rois)) = drag(&mut canvas, (100.0, 0.0), (200.0, 50.0)) else {
            panic!("expected rois");
        };
        let lvl = rois.get(RegionKey::Lvl).unwrap();
        assert!((lvl.x - 0.5).abs() < 1e-9 && (lvl.w - 0.5).abs() < 1e-9);
    }
}
