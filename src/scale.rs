//! The ordinal achievement scale `C < B < A < AD` and its rank arithmetic.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InvalidGradeError;

/// Which grading scale a value was read against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleKind {
    /// Letter grades `C`, `B`, `A`, `AD`.
    Ordinal,
    /// Legacy marks out of 20.
    Numeric,
}

impl fmt::Display for ScaleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleKind::Ordinal => f.write_str("ordinal"),
            ScaleKind::Numeric => f.write_str("numeric"),
        }
    }
}

/// A letter grade. Variants are declared lowest to highest so the derived
/// `Ord` follows the scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    C,
    B,
    A,
    AD,
}

/// Rank at or above which an averaged rank bands to `AD`.
pub const AD_BREAKPOINT: f64 = 3.5;
/// Rank at or above which an averaged rank bands to `A`.
pub const A_BREAKPOINT: f64 = 2.5;
/// Rank at or above which an averaged rank bands to `B`.
pub const B_BREAKPOINT: f64 = 1.5;

impl Grade {
    /// The whole scale, lowest first.
    pub const ALL: [Grade; 4] = [Grade::C, Grade::B, Grade::A, Grade::AD];

    /// The lowest band, the one risk policies count.
    pub const LOWEST: Grade = Grade::C;

    pub fn rank(self) -> u8 {
        match self {
            Grade::C => 1,
            Grade::B => 2,
            Grade::A => 3,
            Grade::AD => 4,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Grade::C => "C",
            Grade::B => "B",
            Grade::A => "A",
            Grade::AD => "AD",
        }
    }

    /// Achievement level shown next to the letter.
    pub fn label(self) -> &'static str {
        match self {
            Grade::C => "Beginning",
            Grade::B => "In progress",
            Grade::A => "Expected achievement",
            Grade::AD => "Outstanding achievement",
        }
    }

    /// Bands a possibly fractional rank back onto the scale.
    ///
    /// | Rank        | Grade |
    /// |-------------|-------|
    /// | >= 3.5      | AD    |
    /// | >= 2.5      | A     |
    /// | >= 1.5      | B     |
    /// | < 1.5       | C     |
    pub fn from_rank(rank: f64) -> Grade {
        match rank {
            r if r >= AD_BREAKPOINT => Grade::AD,
            r if r >= A_BREAKPOINT => Grade::A,
            r if r >= B_BREAKPOINT => Grade::B,
            _ => Grade::C,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Grade {
    type Err = InvalidGradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "C" => Ok(Grade::C),
            "B" => Ok(Grade::B),
            "A" => Ok(Grade::A),
            "AD" => Ok(Grade::AD),
            _ => Err(InvalidGradeError::new(s, ScaleKind::Ordinal)),
        }
    }
}

/// Rank (1..=4) of a grade symbol. Unknown symbols are an error, never a
/// default rank.
pub fn rank_of(symbol: &str) -> Result<u8, InvalidGradeError> {
    symbol.parse::<Grade>().map(Grade::rank)
}

/// Letter for an averaged rank; ties round down to the lower band.
pub fn symbol_of(rank: f64) -> Grade {
    Grade::from_rank(rank)
}

/// Arithmetic mean of a slice, 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn ranks_follow_scale_order() {
        assert_eq!(rank_of("C").unwrap(), 1);
        assert_eq!(rank_of("B").unwrap(), 2);
        assert_eq!(rank_of("A").unwrap(), 3);
        assert_eq!(rank_of("AD").unwrap(), 4);
        assert!(Grade::C < Grade::B && Grade::B < Grade::A && Grade::A < Grade::AD);
    }

    #[test]
    fn unknown_symbol_is_rejected() {
        let err = rank_of("D").unwrap_err();
        assert_eq!(err.value, "D");
        assert_eq!(err.scale, ScaleKind::Ordinal);
        assert!(rank_of("").is_err());
        assert!(rank_of("ad").is_err());
        assert!(rank_of("14").is_err());
    }

    #[test]
    fn padded_symbol_is_rejected() {
        let err = rank_of(" AD ").unwrap_err();
        assert_eq!(err.value, " AD ");
        assert!(rank_of("C\n").is_err());
    }

    #[test]
    fn banding_breakpoints_are_exact() {
        assert_eq!(symbol_of(4.0), Grade::AD);
        assert_eq!(symbol_of(3.5), Grade::AD);
        assert_eq!(symbol_of(3.49), Grade::A);
        assert_eq!(symbol_of(2.5), Grade::A);
        assert_eq!(symbol_of(2.49), Grade::B);
        assert_eq!(symbol_of(1.5), Grade::B);
        assert_eq!(symbol_of(1.49), Grade::C);
        assert_eq!(symbol_of(1.0), Grade::C);
        assert_eq!(symbol_of(0.0), Grade::C);
    }

    #[test]
    fn grades_serialize_as_symbols() {
        let json = serde_json::to_string(&Grade::ALL).unwrap();
        assert_eq!(json, r#"["C","B","A","AD"]"#);
    }

    #[test]
    fn mean_of_empty_is_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert!((mean(&[1.0, 1.0, 2.0]) - 4.0 / 3.0).abs() < 1e-9);
    }

    #[quickcheck]
    fn symbol_round_trip_is_stable(index: usize) -> bool {
        let grade = Grade::ALL[index % Grade::ALL.len()];
        let rank = rank_of(grade.symbol()).unwrap();
        rank_of(symbol_of(f64::from(rank)).symbol()).unwrap() == rank
    }

    #[quickcheck]
    fn banding_is_monotonic(a: u16, b: u16) -> bool {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let lo = f64::from(lo) / 1000.0;
        let hi = f64::from(hi) / 1000.0;
        symbol_of(lo) <= symbol_of(hi)
    }
}
