//! Fixed letter-grade scale.
//!
//! | Percentage | Grade |
//! |------------|-------|
//! | >= 90      | A+    |
//! | >= 80      | A     |
//! | >= 70      | B+    |
//! | >= 60      | B     |
//! | >= 50      | C+    |
//! | >= 40      | C     |
//! | >= 35      | D     |
//! | < 35       | F     |
//!
//! This is the only scale in the service: every write and every ranking view goes through it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GradeError {
    #[error("max marks must be greater than zero (got {0})")]
    NonPositiveMaximum(i32),

    #[error("obtained marks cannot be negative (got {0})")]
    NegativeObtained(i32),

    #[error("unknown grade: {0}")]
    UnknownGrade(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    // declared lowest first so the derived Ord follows the scale
    #[serde(rename = "F")]
    F,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A+")]
    APlus,
}

/// Lower bound (inclusive percentage) of each band, highest first
const BANDS: [(i64, Grade); 7] = [
    (90, Grade::APlus),
    (80, Grade::A),
    (70, Grade::BPlus),
    (60, Grade::B),
    (50, Grade::CPlus),
    (40, Grade::C),
    (35, Grade::D),
];

impl Grade {
    pub const ALL: [Grade; 8] = [
        Grade::APlus,
        Grade::A,
        Grade::BPlus,
        Grade::B,
        Grade::CPlus,
        Grade::C,
        Grade::D,
        Grade::F,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }

    pub fn from_percentage(percentage: f64) -> Grade {
        BANDS
            .iter()
            .find(|(floor, _)| percentage >= *floor as f64)
            .map(|(_, grade)| *grade)
            .unwrap_or(Grade::F)
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = GradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Grade::ALL
            .iter()
            .copied()
            .find(|g| g.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| GradeError::UnknownGrade(trimmed.to_string()))
    }
}

/// Classify a single mark. Band edges are compared in integer arithmetic
/// (`100 * obtained >= floor * possible`) so 89.999..% never rounds into A+.
pub fn classify(obtained: i32, possible: i32) -> Result<Grade, GradeError> {
    if possible <= 0 {
        return Err(GradeError::NonPositiveMaximum(possible));
    }
    if obtained < 0 {
        return Err(GradeError::NegativeObtained(obtained));
    }

    let scaled = i64::from(obtained) * 100;
    let possible = i64::from(possible);
    Ok(BANDS
        .iter()
        .find(|(floor, _)| scaled >= floor * possible)
        .map(|(_, grade)| *grade)
        .unwrap_or(Grade::F))
}

/// `100 * obtained / possible`, defined as 0 when nothing was possible
pub fn percentage(obtained: i64, possible: i64) -> f64 {
    if possible <= 0 {
        0.0
    } else {
        100.0 * obtained as f64 / possible as f64
    }
}

/// Round for presentation (two decimals)
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
