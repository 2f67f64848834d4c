use crate::constants::{FULL_TURN, HALF_TURN};
use std::fmt;
use std::time::Instant;
use strum_macros::{Display, EnumIter};

/// Reduces any whole-degree value into (-180, 180].
pub(crate) fn normalize_degrees(degrees: i32) -> i32 {
    let reduced = degrees.rem_euclid(FULL_TURN);
    if reduced > HALF_TURN {
        reduced - FULL_TURN
    } else {
        reduced
    }
}

/// Absolute angle in whole degrees, always held in (-180, 180].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Angle(i32);

impl Angle {
    pub fn new(degrees: i32) -> Self {
        Angle(normalize_degrees(degrees))
    }

    pub fn degrees(self) -> i32 {
        self.0
    }

    /// Parses a signed decimal integer of any length, reducing it modulo 360
    /// digit by digit so nothing overflows. Accepts an optional `+`/`-` sign
    /// and ASCII digits only.
    pub fn parse_decimal(text: &str) -> Option<Self> {
        let (negative, digits) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let reduced = digits
            .bytes()
            .fold(0, |acc, digit| (acc * 10 + i32::from(digit - b'0')) % FULL_TURN);
        Some(Angle::new(if negative { -reduced } else { reduced }))
    }

    /// The angle reached after turning by `delta` degrees.
    pub fn offset(self, delta: i32) -> Self {
        // i64 keeps extreme inputs from overflowing before reduction
        let sum = (self.0 as i64 + delta as i64).rem_euclid(FULL_TURN as i64) as i32;
        Angle::new(sum)
    }
}

impl From<i32> for Angle {
    fn from(degrees: i32) -> Self {
        Angle::new(degrees)
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.0)
    }
}

#[derive(Debug, Display, EnumIter, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Direction {
    #[strum(serialize = "CW")]
    Clockwise,
    #[strum(serialize = "CCW")]
    CounterClockwise,
}

/// Shortest signed turn between two angles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    /// Signed degrees in (-180, 180]; positive is clockwise.
    pub delta: i32,
    pub direction: Direction,
}

impl Rotation {
    pub fn is_noop(&self) -> bool {
        self.delta == 0
    }
}

/// A validated target waiting for the rotation worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationCommand {
    pub target: Angle,
    pub received_at: Instant,
    /// Monotonic per dispatcher, starting at 1.
    pub sequence: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn normalizes_into_half_open_domain() {
        assert_eq!(Angle::new(0).degrees(), 0);
        assert_eq!(Angle::new(180).degrees(), 180);
        assert_eq!(Angle::new(-180).degrees(), 180);
        assert_eq!(Angle::new(181).degrees(), -179);
        assert_eq!(Angle::new(-181).degrees(), 179);
        assert_eq!(Angle::new(360).degrees(), 0);
        assert_eq!(Angle::new(725).degrees(), 5);
        assert_eq!(Angle::new(-725).degrees(), -5);
    }

    #[test]
    fn normalization_handles_extremes() {
        assert!(Angle::new(i32::MAX).degrees() > -180);
        assert!(Angle::new(i32::MIN).degrees() <= 180);
        assert_eq!(Angle::new(170).offset(i32::MAX), Angle::new(170 + i32::MAX % 360));
    }

    #[test]
    fn parses_decimals_of_any_length() {
        assert_eq!(Angle::parse_decimal("30"), Some(Angle::new(30)));
        assert_eq!(Angle::parse_decimal("+15"), Some(Angle::new(15)));
        assert_eq!(Angle::parse_decimal("-170"), Some(Angle::new(-170)));
        assert_eq!(Angle::parse_decimal("-180"), Some(Angle::new(180)));
        assert_eq!(Angle::parse_decimal("0000370"), Some(Angle::new(10)));
        // 2^32 + 10 is 266 mod 360
        assert_eq!(Angle::parse_decimal("4294967306"), Some(Angle::new(-94)));
        assert_eq!(Angle::parse_decimal("-4294967306"), Some(Angle::new(94)));
        assert_eq!(
            Angle::parse_decimal("123456789012345678901234567890"),
            Some(Angle::new(90))
        );

        for bad in ["", "-", "+", "12.5", "1e3", "--5", "+-5", "abc", "٣"] {
            assert_eq!(Angle::parse_decimal(bad), None, "{bad:?}");
        }
    }

    #[test]
    fn offset_wraps_exactly() {
        assert_eq!(Angle::new(170).offset(20), Angle::new(-170));
        assert_eq!(Angle::new(-170).offset(-20), Angle::new(170));
        assert_eq!(Angle::new(90).offset(180), Angle::new(-90));
    }

    #[test]
    fn directions_render_short_names() {
        let names: Vec<String> = Direction::iter().map(|d| d.to_string()).collect();
        assert_eq!(names, vec!["CW", "CCW"]);
    }
}
