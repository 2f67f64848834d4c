//! Tracked servo angle and shortest-path rotation.
//!
//! A half turn is ambiguous; it always resolves to +180 (clockwise), so
//! `compute_delta(0, 180)` and `compute_delta(180, 0)` both turn clockwise.

use crate::types::{normalize_degrees, Angle, Direction, Rotation};

/// Shortest rotation that carries `current` onto `target`.
pub fn compute_delta(current: Angle, target: Angle) -> Rotation {
    // Both sides are already in (-180, 180], so the raw difference fits in
    // (-360, 360) and folding it back into (-180, 180] picks the short arc.
    let raw = target.degrees() - current.degrees();
    let delta = normalize_degrees(raw);
    let direction = if delta > 0 {
        Direction::Clockwise
    } else {
        Direction::CounterClockwise
    };
    Rotation { delta, direction }
}

/// Last commanded angle. Open loop: commanded is assumed achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AngleTracker {
    current: Angle,
}

impl AngleTracker {
    pub fn new(initial: Angle) -> Self {
        AngleTracker { current: initial }
    }

    pub fn current(&self) -> Angle {
        self.current
    }

    pub fn plan(&self, target: Angle) -> Rotation {
        compute_delta(self.current, target)
    }

    pub fn commit(&mut self, target: Angle) {
        self.current = target;
    }
}
