//! Arrow value domain and per-end scoring arithmetic.

mod sheet;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use self::sheet::{BaleTotals, End, ScoreSheet};

/// Which ranking round is being shot, fixing the number of ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundKind {
    /// 360 round: 12 ends of 3 arrows.
    #[serde(rename = "R360")]
    Ranking360,
    /// 300 round: 10 ends of 3 arrows.
    #[serde(rename = "R300")]
    Ranking300,
}

impl RoundKind {
    /// Number of ends in a round of this kind.
    pub fn total_ends(self) -> u8 {
        match self {
            RoundKind::Ranking360 => 12,
            RoundKind::Ranking300 => 10,
        }
    }

    /// Wire code used by the backend (`R360` / `R300`).
    pub fn code(self) -> &'static str {
        match self {
            RoundKind::Ranking360 => "R360",
            RoundKind::Ranking300 => "R300",
        }
    }

    /// Lenient parse of a wire round-type code; unknown codes fall back to
    /// the 300 round, the backend's own default.
    pub fn from_code(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "R360" | "360" => RoundKind::Ranking360,
            _ => RoundKind::Ranking300,
        }
    }
}

/// A single recorded arrow value.
///
/// The raw scoring domain is `{"", "M", "1".."9", "10", "X"}`; anything else
/// encountered in stored or wire data is treated as not-yet-shot. Parsing is
/// lenient and never fails, matching the forgiving behavior scorers expect
/// from a keypad during a live end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Arrow {
    /// Not yet shot.
    #[default]
    Empty,
    /// Miss, scores zero.
    Miss,
    /// Scoring ring 1..=10.
    Value(u8),
    /// Inner ten: scores 10 and counts toward both tens and X count.
    InnerTen,
}

impl Arrow {
    /// Lenient parse of a raw arrow string.
    pub fn from_raw(raw: &str) -> Self {
        let s = raw.trim().to_ascii_uppercase();
        match s.as_str() {
            "" => Arrow::Empty,
            "M" => Arrow::Miss,
            "X" => Arrow::InnerTen,
            other => match other.parse::<i64>() {
                Ok(n) if n <= 0 => Arrow::Miss,
                Ok(n) => Arrow::Value(n.min(10) as u8),
                Err(_) => Arrow::Empty,
            },
        }
    }

    /// Point value in `[0, 10]`.
    pub fn points(self) -> u32 {
        match self {
            Arrow::Empty | Arrow::Miss => 0,
            Arrow::Value(n) => u32::from(n.min(10)),
            Arrow::InnerTen => 10,
        }
    }

    /// Whether a value has been entered for this arrow.
    pub fn is_set(self) -> bool {
        !matches!(self, Arrow::Empty)
    }

    /// Whether this arrow counts as a ten (an X does).
    pub fn is_ten(self) -> bool {
        matches!(self, Arrow::Value(10) | Arrow::InnerTen)
    }

    /// Whether this arrow is an inner ten.
    pub fn is_x(self) -> bool {
        matches!(self, Arrow::InnerTen)
    }

    /// Raw scoring string as written on a paper card.
    pub fn as_raw(self) -> String {
        match self {
            Arrow::Empty => String::new(),
            Arrow::Miss => "M".to_string(),
            Arrow::Value(n) => n.to_string(),
            Arrow::InnerTen => "X".to_string(),
        }
    }

    /// Target-face color band this arrow landed in.
    pub fn band(self) -> Band {
        match self.points() {
            9 | 10 => Band::Gold,
            7 | 8 => Band::Red,
            5 | 6 => Band::Blue,
            3 | 4 => Band::Black,
            _ => Band::White,
        }
    }
}

impl From<String> for Arrow {
    fn from(value: String) -> Self {
        Arrow::from_raw(&value)
    }
}

impl From<Arrow> for String {
    fn from(value: Arrow) -> Self {
        value.as_raw()
    }
}

impl fmt::Display for Arrow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_raw())
    }
}

/// Target-face color band, the scoring-domain contract behind score cell
/// coloring: gold covers X/10/9, red 8/7, blue 6/5, black 4/3, white
/// everything below including misses and unshot arrows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    /// X, 10 or 9.
    Gold,
    /// 8 or 7.
    Red,
    /// 6 or 5.
    Blue,
    /// 4 or 3.
    Black,
    /// 2, 1, miss or empty.
    White,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_covers_whole_domain_without_panicking() {
        let inputs = [
            "", "M", "m", "0", "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "X", "x", "11",
            "99", "-3", "banana", "1O", " 7 ", "X ",
        ];
        for raw in inputs {
            let points = Arrow::from_raw(raw).points();
            assert!(points <= 10, "{raw:?} scored {points}");
        }
    }

    #[test]
    fn x_and_ten_score_ten() {
        assert_eq!(Arrow::from_raw("X").points(), 10);
        assert_eq!(Arrow::from_raw("10").points(), 10);
        assert!(Arrow::from_raw("X").is_x());
        assert!(!Arrow::from_raw("10").is_x());
        assert!(Arrow::from_raw("10").is_ten());
    }

    #[test]
    fn miss_and_empty_score_zero() {
        assert_eq!(Arrow::from_raw("M").points(), 0);
        assert_eq!(Arrow::from_raw("").points(), 0);
        assert!(!Arrow::from_raw("").is_set());
        assert!(Arrow::from_raw("M").is_set());
    }

    #[test]
    fn out_of_range_numbers_are_clamped() {
        assert_eq!(Arrow::from_raw("37").points(), 10);
        assert_eq!(Arrow::from_raw("-2").points(), 0);
    }

    #[test]
    fn band_boundaries() {
        assert_eq!(Arrow::from_raw("X").band(), Band::Gold);
        assert_eq!(Arrow::from_raw("10").band(), Band::Gold);
        assert_eq!(Arrow::from_raw("9").band(), Band::Gold);
        assert_eq!(Arrow::from_raw("8").band(), Band::Red);
        assert_eq!(Arrow::from_raw("7").band(), Band::Red);
        assert_eq!(Arrow::from_raw("6").band(), Band::Blue);
        assert_eq!(Arrow::from_raw("5").band(), Band::Blue);
        assert_eq!(Arrow::from_raw("4").band(), Band::Black);
        assert_eq!(Arrow::from_raw("3").band(), Band::Black);
        assert_eq!(Arrow::from_raw("2").band(), Band::White);
        assert_eq!(Arrow::from_raw("1").band(), Band::White);
        assert_eq!(Arrow::from_raw("M").band(), Band::White);
        assert_eq!(Arrow::from_raw("").band(), Band::White);
    }

    #[test]
    fn raw_round_trip_for_valid_values() {
        for raw in ["", "M", "1", "5", "9", "10", "X"] {
            assert_eq!(Arrow::from_raw(raw).as_raw(), raw);
        }
    }
}
