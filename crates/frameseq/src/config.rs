use serde::{Deserialize, Serialize};

use crate::error::CorrectionError;

/// Tunable parameters of a correction pass.
///
/// All fields have defaults; a JSON overlay only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    /// Window length (frames) for duplicate-block detection and length of the
    /// periodic increment pattern.
    pub window_length: usize,
    /// Override for the set of legitimate consecutive deltas.
    ///
    /// When `None` the set is the distinct values of the derived pattern.
    pub valid_increment_set: Option<Vec<i64>>,
    /// Explicit expected increment pattern (length `window_length`).
    ///
    /// Sensor-specific. When `None` the pattern is derived from the most
    /// frequent delta windows observed in the raw sequence.
    pub increment_pattern: Option<Vec<i64>>,
    /// Nominal counter clock rate (Hz). Used with the reference frame rate when
    /// the raw sequence has no usable deltas.
    pub counter_rate_hz: Option<f64>,
    /// Tolerated length difference between raw and reference sequences.
    pub max_length_slack: usize,
    /// Fraction of window positions that must match exactly for two windows
    /// to count as duplicates, in `(0, 1]`.
    pub duplicate_similarity_threshold: f64,
    /// Duplicate look-back bound, in multiples of `window_length`.
    pub duplicate_lookback_windows: usize,
    /// Frame indices where a legitimate counter restart is expected.
    ///
    /// A repeated window whose two occurrences straddle one of these frames is
    /// not flagged as a duplicate.
    pub expected_reset_points: Vec<usize>,
    /// Extra raw values that mean "no reading". Zero and negative values always do.
    pub sentinel_values: Vec<i64>,
    /// Maximum per-delta deviation between an observed delta window and the
    /// expected pattern for a periodic-misread rewrite.
    pub pattern_max_deviation: i64,
    /// Boundary extrapolation runs longer than this add a warning note.
    pub max_extrapolation_frames: usize,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            window_length: 3,
            valid_increment_set: None,
            increment_pattern: None,
            counter_rate_hz: None,
            max_length_slack: 2,
            duplicate_similarity_threshold: 1.0,
            duplicate_lookback_windows: 4,
            expected_reset_points: Vec::new(),
            sentinel_values: Vec::new(),
            pattern_max_deviation: 2,
            max_extrapolation_frames: 30,
        }
    }
}

impl CorrectionConfig {
    /// Returns `true` when `value` denotes a missing reading.
    #[inline]
    pub fn is_missing_reading(&self, value: i64) -> bool {
        value <= 0 || self.sentinel_values.contains(&value)
    }

    /// Look-back bound (frames) for the duplicate-block search.
    #[inline]
    pub fn duplicate_lookback_frames(&self) -> usize {
        self.duplicate_lookback_windows.max(1) * self.window_length
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), CorrectionError> {
        if self.window_length == 0 {
            return Err(invalid("window_length", "must be at least 1"));
        }
        if let Some(pattern) = &self.increment_pattern {
            if pattern.len() != self.window_length {
                return Err(invalid(
                    "increment_pattern",
                    format!(
                        "length {} does not match window_length {}",
                        pattern.len(),
                        self.window_length
                    ),
                ));
            }
            if pattern.iter().any(|&d| d < 0) || pattern.iter().all(|&d| d == 0) {
                return Err(invalid(
                    "increment_pattern",
                    "entries must be non-negative and not all zero",
                ));
            }
        }
        if let Some(set) = &self.valid_increment_set {
            if set.is_empty() {
                return Err(invalid("valid_increment_set", "must not be empty"));
            }
            if set.iter().any(|&d| d < 0) {
                return Err(invalid("valid_increment_set", "entries must be non-negative"));
            }
        }
        if let Some(rate) = self.counter_rate_hz {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(invalid("counter_rate_hz", "must be finite and positive"));
            }
        }
        let t = self.duplicate_similarity_threshold;
        if !(t > 0.0 && t <= 1.0) {
            return Err(invalid("duplicate_similarity_threshold", "must be in (0, 1]"));
        }
        if self.pattern_max_deviation < 0 {
            return Err(invalid("pattern_max_deviation", "must be non-negative"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> CorrectionError {
    CorrectionError::InvalidConfig {
        field,
        reason: reason.into(),
    }
}
