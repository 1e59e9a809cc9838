//! Bounded similarity score.
//!
//! Every score that flows between retrieval stages lives in `[0, 1]`. A value
//! outside that range means a scoring-logic defect (historically: summing
//! repeated hits instead of averaging them), so construction panics instead
//! of clamping. Values within [`SNAP_EPSILON`] of a bound are float rounding
//! and are snapped onto the bound.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

pub const SNAP_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Score(f64);

impl Score {
    pub const ZERO: Score = Score(0.0);
    pub const ONE: Score = Score(1.0);

    /// Panics if `value` is NaN or lies outside `[0, 1]` beyond rounding noise.
    pub fn new(value: f64) -> Self {
        match Self::checked(value) {
            Some(score) => score,
            None => panic!("score out of range [0, 1]: {value}"),
        }
    }

    pub fn checked(value: f64) -> Option<Self> {
        if value.is_nan() {
            return None;
        }
        if (0.0..=1.0).contains(&value) {
            return Some(Self(value));
        }
        if value < 0.0 && value >= -SNAP_EPSILON {
            return Some(Self(0.0));
        }
        if value > 1.0 && value <= 1.0 + SNAP_EPSILON {
            return Some(Self(1.0));
        }
        None
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Arithmetic mean of the given scores; `None` for an empty slice.
    pub fn mean(scores: &[Score]) -> Option<Score> {
        if scores.is_empty() {
            return None;
        }
        let sum: f64 = scores.iter().map(|s| s.0).sum();
        Some(Score::new(sum / scores.len() as f64))
    }

    /// Descending total order used by every ranking in the engine.
    pub fn cmp_desc(a: Score, b: Score) -> Ordering {
        b.0.total_cmp(&a.0)
    }
}

impl TryFrom<f64> for Score {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Score::checked(value).ok_or_else(|| format!("score out of range [0, 1]: {value}"))
    }
}

impl From<Score> for f64 {
    fn from(score: Score) -> f64 {
        score.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}
