//! Error types for sequence correction.
//!
//! Anomalies in the raw counter (duplicates, misreads, gaps) are never errors;
//! they end up in the correction log. Errors are reserved for inputs the engine
//! cannot work with and for broken post-repair invariants.

/// Which post-repair invariant failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantKind {
    /// `corrected_value[i] < corrected_value[i - 1]`.
    NonMonotonic {
        /// Corrected value of the previous frame.
        prev: i64,
        /// Corrected value of the offending frame.
        value: i64,
    },
    /// A frame is still `unresolved` after gap filling.
    Unresolved,
    /// The corrected sequence does not cover every frame exactly once.
    Coverage {
        /// Number of frames in the raw input.
        expected: usize,
        /// Number of frame records produced.
        got: usize,
    },
    /// A frame value changed without a recorded correction.
    UnloggedChange,
}

impl std::fmt::Display for InvariantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonMonotonic { prev, value } => {
                write!(f, "non-monotonic value {} after {}", value, prev)
            }
            Self::Unresolved => write!(f, "frame left unresolved"),
            Self::Coverage { expected, got } => {
                write!(f, "expected {} frame records, got {}", expected, got)
            }
            Self::UnloggedChange => write!(f, "value changed without a correction"),
        }
    }
}

/// Errors returned by [`CorrectionEngine`](crate::CorrectionEngine).
#[derive(Debug, Clone, PartialEq)]
pub enum CorrectionError {
    /// The reference time series has too few usable timestamps to derive a
    /// frame rate.
    InsufficientReferenceData {
        /// Usable (finite, distinct) timestamps found.
        usable: usize,
        /// Minimum required.
        needed: usize,
    },
    /// Raw and reference sequences differ in length beyond the configured slack.
    LengthMismatch {
        /// Length of the raw counter sequence.
        n_raw: usize,
        /// Length of the reference time series.
        n_reference: usize,
        /// Configured `max_length_slack`.
        max_slack: usize,
    },
    /// A post-repair invariant failed. This is a defect in the repair logic.
    InvariantViolation {
        /// First frame at which the check failed.
        frame_idx: usize,
        /// The failed check.
        kind: InvariantKind,
    },
    /// The configuration was rejected before any work was done.
    InvalidConfig {
        /// Offending field name.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl std::fmt::Display for CorrectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientReferenceData { usable, needed } => write!(
                f,
                "insufficient reference data: need {} usable timestamps, got {}",
                needed, usable
            ),
            Self::LengthMismatch {
                n_raw,
                n_reference,
                max_slack,
            } => write!(
                f,
                "length mismatch: {} raw frames vs {} reference timestamps (max slack {})",
                n_raw, n_reference, max_slack
            ),
            Self::InvariantViolation { frame_idx, kind } => {
                write!(f, "invariant violation at frame {}: {}", frame_idx, kind)
            }
            Self::InvalidConfig { field, reason } => {
                write!(f, "invalid config `{}`: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for CorrectionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_counts() {
        let e = CorrectionError::LengthMismatch {
            n_raw: 100,
            n_reference: 90,
            max_slack: 2,
        };
        let s = e.to_string();
        assert!(s.contains("100") && s.contains("90") && s.contains("2"));

        let e = CorrectionError::InvariantViolation {
            frame_idx: 7,
            kind: InvariantKind::NonMonotonic { prev: 10, value: 9 },
        };
        assert_eq!(
            e.to_string(),
            "invariant violation at frame 7: non-monotonic value 9 after 10"
        );
    }
}
