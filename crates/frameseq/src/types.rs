//! Output records of a correction pass.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Correction catalog ────────────────────────────────────────────────────────

/// Closed catalog of correction types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CorrectionKind {
    #[serde(rename = "LEADING_ZERO")]
    LeadingZero,
    #[serde(rename = "DUPLICATE_SEQ")]
    DuplicateSeq,
    #[serde(rename = "PATTERN_446")]
    Pattern446,
    #[serde(rename = "BAD_DIFF")]
    BadDiff,
    #[serde(rename = "INTERPOLATED")]
    Interpolated,
    #[serde(rename = "EXTRAPOLATED_LEADING")]
    ExtrapolatedLeading,
    #[serde(rename = "EXTRAPOLATED_TRAILING")]
    ExtrapolatedTrailing,
    #[serde(rename = "INTERPOLATED_SYNTHETIC")]
    InterpolatedSynthetic,
}

impl CorrectionKind {
    /// Every correction type, in catalog order.
    pub const ALL: [CorrectionKind; 8] = [
        Self::LeadingZero,
        Self::DuplicateSeq,
        Self::Pattern446,
        Self::BadDiff,
        Self::Interpolated,
        Self::ExtrapolatedLeading,
        Self::ExtrapolatedTrailing,
        Self::InterpolatedSynthetic,
    ];

    /// Stable type name used in logs and serialized output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LeadingZero => "LEADING_ZERO",
            Self::DuplicateSeq => "DUPLICATE_SEQ",
            Self::Pattern446 => "PATTERN_446",
            Self::BadDiff => "BAD_DIFF",
            Self::Interpolated => "INTERPOLATED",
            Self::ExtrapolatedLeading => "EXTRAPOLATED_LEADING",
            Self::ExtrapolatedTrailing => "EXTRAPOLATED_TRAILING",
            Self::InterpolatedSynthetic => "INTERPOLATED_SYNTHETIC",
        }
    }

    /// One-line human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Self::LeadingZero => "Leading missing frames held for backward extrapolation",
            Self::DuplicateSeq => "Repeated block detected and cleared for interpolation",
            Self::Pattern446 => "Misread delta window rewritten to the expected pattern",
            Self::BadDiff => "Invalid delta corrected using the predicted increment",
            Self::Interpolated => "Unresolved frame filled via linear interpolation",
            Self::ExtrapolatedLeading => "Leading unresolved frame extrapolated backwards",
            Self::ExtrapolatedTrailing => "Trailing unresolved frame extrapolated forwards",
            Self::InterpolatedSynthetic => "No valid frames; synthetic sequence generated",
        }
    }
}

impl std::fmt::Display for CorrectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a `BAD_DIFF` replacement delta came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaSource {
    /// Next element of the periodic pattern, phase-locked to the preceding deltas.
    PhaseContinuation,
    /// The most recent valid delta before the frame.
    PrecedingDelta,
    /// Rounded global expected increment.
    ExpectedIncrement,
    /// Chosen so the delta into the next reading is valid too.
    FollowingFrame,
    /// Raw step from the previous frame, kept across that frame's replacement.
    ObservedStep,
}

/// Outcome of the invalid-delta detector for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "repair", rename_all = "snake_case")]
pub enum DeltaRepair {
    /// Replaced immediately with `prev + delta`.
    Replaced {
        /// Replacement delta.
        delta: i64,
        /// How the replacement was chosen.
        source: DeltaSource,
    },
    /// The frame follows an unresolved run and its delta over the gap is
    /// implausible; its value is left for gap filling.
    Deferred {
        /// Frames between the last resolved frame and this one.
        gap: usize,
        /// Observed cumulative delta over the gap.
        observed: i64,
    },
    /// The frame disagrees with the readings around it while those agree
    /// with each other; its value is left for gap filling.
    Outlier {
        /// Next frame with a reading.
        next_idx: usize,
    },
}

/// A correction applied to one frame, with type-specific evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Correction {
    /// Placeholder for a leading missing frame.
    #[serde(rename = "LEADING_ZERO")]
    LeadingZero,
    /// Placeholder for a frame inside a repeated block.
    #[serde(rename = "DUPLICATE_SEQ")]
    DuplicateSeq {
        /// Start frame of the earlier block this one repeats.
        prior_start: usize,
        /// Fraction of positions that matched exactly.
        similarity: f64,
    },
    /// Delta window rewritten to the expected periodic pattern.
    #[serde(rename = "PATTERN_446")]
    Pattern446 {
        /// Observed deltas of the window.
        observed: Vec<i64>,
        /// Expected deltas written instead.
        expected: Vec<i64>,
    },
    /// Delta outside the valid-increment set.
    #[serde(rename = "BAD_DIFF")]
    BadDiff(DeltaRepair),
    /// Linear interpolation between two resolved frames.
    #[serde(rename = "INTERPOLATED")]
    Interpolated {
        /// Left bounding frame.
        left_idx: usize,
        /// Right bounding frame.
        right_idx: usize,
    },
    /// Backward slope extrapolation from the first resolved frame.
    #[serde(rename = "EXTRAPOLATED_LEADING")]
    ExtrapolatedLeading {
        /// Resolved frame the extrapolation is anchored at.
        anchor_idx: usize,
        /// Counter increment per frame.
        slope: f64,
    },
    /// Forward slope extrapolation from the last resolved frame.
    #[serde(rename = "EXTRAPOLATED_TRAILING")]
    ExtrapolatedTrailing {
        /// Resolved frame the extrapolation is anchored at.
        anchor_idx: usize,
        /// Counter increment per frame.
        slope: f64,
    },
    /// Whole-sequence arithmetic reconstruction.
    #[serde(rename = "INTERPOLATED_SYNTHETIC")]
    InterpolatedSynthetic {
        /// Increment per frame used for the reconstruction.
        expected_increment: f64,
    },
}

impl Correction {
    /// Catalog type of this correction.
    pub fn kind(&self) -> CorrectionKind {
        match self {
            Self::LeadingZero => CorrectionKind::LeadingZero,
            Self::DuplicateSeq { .. } => CorrectionKind::DuplicateSeq,
            Self::Pattern446 { .. } => CorrectionKind::Pattern446,
            Self::BadDiff(_) => CorrectionKind::BadDiff,
            Self::Interpolated { .. } => CorrectionKind::Interpolated,
            Self::ExtrapolatedLeading { .. } => CorrectionKind::ExtrapolatedLeading,
            Self::ExtrapolatedTrailing { .. } => CorrectionKind::ExtrapolatedTrailing,
            Self::InterpolatedSynthetic { .. } => CorrectionKind::InterpolatedSynthetic,
        }
    }

    /// `true` for the placeholder claims that gap filling must replace.
    pub fn is_placeholder(&self) -> bool {
        matches!(
            self,
            Self::LeadingZero
                | Self::DuplicateSeq { .. }
                | Self::BadDiff(DeltaRepair::Deferred { .. } | DeltaRepair::Outlier { .. })
        )
    }

    /// Free-text details for the correction log.
    pub fn details(&self) -> String {
        match self {
            Self::LeadingZero => "leading missing reading".to_string(),
            Self::DuplicateSeq {
                prior_start,
                similarity,
            } => format!(
                "repeats block at frame {} (similarity {:.2})",
                prior_start, similarity
            ),
            Self::Pattern446 { observed, expected } => {
                format!("delta window {:?} rewritten to {:?}", observed, expected)
            }
            Self::BadDiff(DeltaRepair::Replaced { delta, source }) => {
                let from = match source {
                    DeltaSource::PhaseContinuation => "pattern phase",
                    DeltaSource::PrecedingDelta => "preceding delta",
                    DeltaSource::ExpectedIncrement => "expected increment",
                    DeltaSource::FollowingFrame => "next reading",
                    DeltaSource::ObservedStep => "observed step",
                };
                format!("delta replaced by {} from {}", delta, from)
            }
            Self::BadDiff(DeltaRepair::Deferred { gap, observed }) => format!(
                "implausible delta {} over {} frames; deferred to gap fill",
                observed, gap
            ),
            Self::BadDiff(DeltaRepair::Outlier { next_idx }) => format!(
                "disagrees with the readings around it (next at frame {}); deferred to gap fill",
                next_idx
            ),
            Self::Interpolated {
                left_idx,
                right_idx,
            } => format!("interpolated between frames {} and {}", left_idx, right_idx),
            Self::ExtrapolatedLeading { anchor_idx, slope } => format!(
                "extrapolated backwards from frame {} at slope {:.3}",
                anchor_idx, slope
            ),
            Self::ExtrapolatedTrailing { anchor_idx, slope } => format!(
                "extrapolated forwards from frame {} at slope {:.3}",
                anchor_idx, slope
            ),
            Self::InterpolatedSynthetic { expected_increment } => format!(
                "synthetic sequence at {:.3} per frame",
                expected_increment
            ),
        }
    }
}

// ── Per-frame records ─────────────────────────────────────────────────────────

/// Repair status of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameStatus {
    /// Raw reading kept unchanged.
    Valid,
    /// A correction was applied.
    Corrected,
    /// No trustworthy value yet. Never present in a returned result.
    Unresolved,
}

/// One entry per frame of the corrected sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub frame_idx: usize,
    pub raw_value: i64,
    pub corrected_value: i64,
    pub status: FrameStatus,
    /// Final correction, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction: Option<Correction>,
    /// Detector that claimed this frame during anomaly repair, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flagged_by: Option<CorrectionKind>,
    /// `raw[i] - corrected[i - 1]` when frame `i` has a reading.
    pub diff_before: Option<i64>,
    /// `corrected[i] - corrected[i - 1]`.
    pub diff_after: Option<i64>,
    pub details: String,
}

impl FrameRecord {
    /// Catalog type of the final correction.
    pub fn correction_type(&self) -> Option<CorrectionKind> {
        self.correction.as_ref().map(Correction::kind)
    }
}

/// Ordered frame records after a repair pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectedSequence {
    pub frames: Vec<FrameRecord>,
}

impl CorrectedSequence {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Corrected frame indices in frame order.
    pub fn values(&self) -> Vec<i64> {
        self.frames.iter().map(|f| f.corrected_value).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FrameRecord> {
        self.frames.iter()
    }

    /// Returns `true` when corrected values never decrease.
    pub fn is_monotonic(&self) -> bool {
        self.frames
            .windows(2)
            .all(|w| w[1].corrected_value >= w[0].corrected_value)
    }
}

/// Audit-log entry for a frame whose value changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionLogEntry {
    pub frame_idx: usize,
    pub interpolation_type: CorrectionKind,
    pub original_value: i64,
    pub corrected_value: i64,
    pub diff_before: Option<i64>,
    pub diff_after: Option<i64>,
    pub details: String,
}

// ── Summary ───────────────────────────────────────────────────────────────────

/// Statistics of one correction pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceSummary {
    /// Total number of frames.
    pub n_frames: usize,
    /// Frames with a present raw reading.
    pub n_valid_ocr: usize,
    /// Entries in the reference time series.
    pub n_csv_timestamps: usize,
    /// Frame rate estimated from the median reference interval (Hz).
    pub frame_rate_hz: f64,
    /// First-to-last usable reference timestamp span (seconds).
    pub duration_sec: f64,
    /// Soft warnings for downstream review.
    pub notes: Vec<String>,
    /// `notes` joined into one line.
    pub notes_text: String,
    /// Frames whose value changed.
    pub n_corrected: usize,
    /// Frames per final correction type.
    pub corrections_by_type: BTreeMap<CorrectionKind, usize>,
    /// Whether the synthetic fallback produced the sequence.
    pub synthetic_fallback: bool,
}

// ── Inputs and full output ────────────────────────────────────────────────────

/// One recording's already-parsed inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    /// Raw per-frame counter readings; zero (or a sentinel) means no reading.
    pub raw_frame_indices: Vec<i64>,
    /// Independent per-frame timestamps in seconds.
    pub reference_timestamps: Vec<f64>,
}

/// Result of one correction pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionOutput {
    /// The raw input, preserved unmodified for audit.
    pub raw_frame_indices: Vec<i64>,
    pub sequence: CorrectedSequence,
    pub correction_log: Vec<CorrectionLogEntry>,
    pub summary: SequenceSummary,
}

impl CorrectionOutput {
    /// Corrected frame indices in frame order.
    pub fn corrected_frame_indices(&self) -> Vec<i64> {
        self.sequence.values()
    }

    /// Split into `(sequence, log, summary)`.
    pub fn into_parts(self) -> (CorrectedSequence, Vec<CorrectionLogEntry>, SequenceSummary) {
        (self.sequence, self.correction_log, self.summary)
    }
}
