//! High-level correction API.
//!
//! [`CorrectionEngine`] wraps a [`CorrectionConfig`] and runs one full pass:
//! increment model, anomaly repair, gap filling (or the synthetic fallback),
//! then invariant validation.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::config::CorrectionConfig;
use crate::error::{CorrectionError, InvariantKind};
use crate::gap_fill::fill_gaps;
use crate::model::IncrementModel;
use crate::repair::{run_repair, RepairWorkspace};
use crate::synthetic::apply_synthetic;
use crate::types::{
    CorrectedSequence, CorrectionLogEntry, CorrectionOutput, FrameRecord, FrameStatus, Recording,
    SequenceSummary,
};

/// Primary correction interface.
///
/// Create once, correct many recordings. Holds no per-recording state.
///
/// # Examples
///
/// ```
/// use frameseq::{CorrectionEngine, CorrectionKind};
///
/// let mut raw: Vec<i64> = vec![0, 0];
/// let mut v = 4;
/// for i in 0..40 {
///     raw.push(v);
///     v += [4, 5, 5][i % 3];
/// }
/// let timestamps: Vec<f64> = (0..raw.len()).map(|i| i as f64 / 30.0).collect();
///
/// let out = CorrectionEngine::new().correct(&raw, &timestamps).unwrap();
/// assert!(out.sequence.is_monotonic());
/// assert_eq!(out.correction_log.len(), 2);
/// assert_eq!(
///     out.correction_log[0].interpolation_type,
///     CorrectionKind::ExtrapolatedLeading
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct CorrectionEngine {
    config: CorrectionConfig,
}

impl CorrectionEngine {
    /// Engine with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with full config control. The config is validated on each run.
    pub fn with_config(config: CorrectionConfig) -> Self {
        Self { config }
    }

    /// Access the current configuration.
    pub fn config(&self) -> &CorrectionConfig {
        &self.config
    }

    /// Mutable access to configuration for post-construction tuning.
    pub fn config_mut(&mut self) -> &mut CorrectionConfig {
        &mut self.config
    }

    /// Derive the increment model for a recording without repairing it.
    pub fn increment_model(
        &self,
        raw_frame_indices: &[i64],
        reference_timestamps: &[f64],
    ) -> Result<IncrementModel, CorrectionError> {
        self.config.validate()?;
        IncrementModel::derive(raw_frame_indices, reference_timestamps, &self.config)
    }

    /// Correct one recording.
    pub fn correct(
        &self,
        raw_frame_indices: &[i64],
        reference_timestamps: &[f64],
    ) -> Result<CorrectionOutput, CorrectionError> {
        self.config.validate()?;
        let raw = raw_frame_indices;
        let n_raw = raw.len();
        let n_reference = reference_timestamps.len();
        if n_raw.abs_diff(n_reference) > self.config.max_length_slack {
            return Err(CorrectionError::LengthMismatch {
                n_raw,
                n_reference,
                max_slack: self.config.max_length_slack,
            });
        }
        if n_raw == 0 {
            return Ok(CorrectionOutput {
                raw_frame_indices: Vec::new(),
                sequence: CorrectedSequence::default(),
                correction_log: Vec::new(),
                summary: SequenceSummary {
                    n_csv_timestamps: n_reference,
                    ..SequenceSummary::default()
                },
            });
        }

        let model = IncrementModel::derive(raw, reference_timestamps, &self.config)?;
        let n_valid_ocr = raw
            .iter()
            .filter(|&&v| !self.config.is_missing_reading(v))
            .count();

        let mut ws = RepairWorkspace::new(raw, &model, &self.config);
        if n_raw != n_reference {
            ws.note(format!(
                "reference has {} timestamps for {} frames",
                n_reference, n_raw
            ));
        }
        let synthetic_fallback = n_valid_ocr == 0;
        if synthetic_fallback {
            apply_synthetic(&mut ws);
        } else {
            run_repair(&mut ws);
            let fill = fill_gaps(&mut ws);
            tracing::debug!(repair = ?ws.stats, ?fill, "correction stages complete");
        }

        let sequence = build_sequence(&ws)?;
        validate_sequence(raw, &sequence)?;
        let correction_log = build_log(&sequence, &ws.details);

        let mut corrections_by_type = BTreeMap::new();
        for kind in sequence.iter().filter_map(FrameRecord::correction_type) {
            *corrections_by_type.entry(kind).or_insert(0usize) += 1;
        }
        let summary = SequenceSummary {
            n_frames: n_raw,
            n_valid_ocr,
            n_csv_timestamps: n_reference,
            frame_rate_hz: model.frame_rate_hz(),
            duration_sec: model.duration_sec(),
            notes_text: ws.notes.join("; "),
            notes: std::mem::take(&mut ws.notes),
            n_corrected: correction_log.len(),
            corrections_by_type,
            synthetic_fallback,
        };

        tracing::info!(
            n_frames = summary.n_frames,
            n_valid_ocr = summary.n_valid_ocr,
            n_corrected = summary.n_corrected,
            synthetic_fallback,
            frame_rate_hz = summary.frame_rate_hz,
            "sequence corrected",
        );

        Ok(CorrectionOutput {
            raw_frame_indices: raw.to_vec(),
            sequence,
            correction_log,
            summary,
        })
    }

    /// Correct one [`Recording`].
    pub fn correct_recording(
        &self,
        recording: &Recording,
    ) -> Result<CorrectionOutput, CorrectionError> {
        self.correct(&recording.raw_frame_indices, &recording.reference_timestamps)
    }

    /// Correct independent recordings in parallel. Results keep input order.
    pub fn correct_batch(
        &self,
        recordings: &[Recording],
    ) -> Vec<Result<CorrectionOutput, CorrectionError>> {
        recordings
            .par_iter()
            .map(|rec| self.correct_recording(rec))
            .collect()
    }
}

fn build_sequence(ws: &RepairWorkspace<'_>) -> Result<CorrectedSequence, CorrectionError> {
    let raw = ws.raw;
    let mut frames = Vec::with_capacity(raw.len());
    let mut prev: Option<i64> = None;
    for (i, &raw_value) in raw.iter().enumerate() {
        let correction = ws.corrections[i].clone();
        let unresolved = CorrectionError::InvariantViolation {
            frame_idx: i,
            kind: InvariantKind::Unresolved,
        };
        let Some(corrected_value) = ws.working[i] else {
            return Err(unresolved);
        };
        if correction.as_ref().is_some_and(|c| c.is_placeholder()) {
            return Err(unresolved);
        }
        let diff_before = match prev {
            Some(p) if !ws.config.is_missing_reading(raw_value) => Some(raw_value - p),
            _ => None,
        };
        let diff_after = prev.map(|p| corrected_value - p);
        frames.push(FrameRecord {
            frame_idx: i,
            raw_value,
            corrected_value,
            status: if correction.is_some() {
                FrameStatus::Corrected
            } else {
                FrameStatus::Valid
            },
            flagged_by: ws.claims.owner(i).map(|d| d.correction_kind()),
            correction,
            diff_before,
            diff_after,
            details: ws.details[i].join("; "),
        });
        prev = Some(corrected_value);
    }
    Ok(CorrectedSequence { frames })
}

/// Check coverage, resolution, monotonicity and that every changed value
/// carries a correction.
fn validate_sequence(raw: &[i64], sequence: &CorrectedSequence) -> Result<(), CorrectionError> {
    let violation = |frame_idx: usize, kind: InvariantKind| {
        tracing::warn!(frame_idx, %kind, "post-repair invariant failed");
        Err(CorrectionError::InvariantViolation { frame_idx, kind })
    };

    if sequence.len() != raw.len() {
        return violation(
            sequence.len().min(raw.len()),
            InvariantKind::Coverage {
                expected: raw.len(),
                got: sequence.len(),
            },
        );
    }
    for (i, rec) in sequence.iter().enumerate() {
        if rec.frame_idx != i {
            return violation(
                i,
                InvariantKind::Coverage {
                    expected: raw.len(),
                    got: sequence.len(),
                },
            );
        }
        if rec.status == FrameStatus::Unresolved {
            return violation(i, InvariantKind::Unresolved);
        }
        if rec.corrected_value != raw[i] && rec.correction.is_none() {
            return violation(i, InvariantKind::UnloggedChange);
        }
    }
    for (i, w) in sequence.frames.windows(2).enumerate() {
        if w[1].corrected_value < w[0].corrected_value {
            return violation(
                i + 1,
                InvariantKind::NonMonotonic {
                    prev: w[0].corrected_value,
                    value: w[1].corrected_value,
                },
            );
        }
    }
    Ok(())
}

/// One entry per frame whose value changed.
fn build_log(sequence: &CorrectedSequence, details: &[Vec<String>]) -> Vec<CorrectionLogEntry> {
    sequence
        .iter()
        .filter(|rec| rec.corrected_value != rec.raw_value)
        .filter_map(|rec| {
            let kind = rec.correction_type()?;
            Some(CorrectionLogEntry {
                frame_idx: rec.frame_idx,
                interpolation_type: kind,
                original_value: rec.raw_value,
                corrected_value: rec.corrected_value,
                diff_before: rec.diff_before,
                diff_after: rec.diff_after,
                details: details[rec.frame_idx].join("; "),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{counter_sequence, uniform_timestamps};
    use crate::types::{Correction, CorrectionKind};

    fn recording(raw: Vec<i64>) -> Recording {
        let n = raw.len();
        Recording {
            raw_frame_indices: raw,
            reference_timestamps: uniform_timestamps(n, 30.0),
        }
    }

    #[test]
    fn clean_counter_yields_empty_log() {
        let rec = recording(counter_sequence(100, 45, &[4, 5, 5]));
        let out = CorrectionEngine::new().correct_recording(&rec).expect("correct");
        assert!(out.correction_log.is_empty());
        assert_eq!(out.corrected_frame_indices(), rec.raw_frame_indices);
        assert!(out.sequence.iter().all(|f| f.status == FrameStatus::Valid));
        assert_eq!(out.summary.n_valid_ocr, 45);
        assert!(!out.summary.synthetic_fallback);
    }

    #[test]
    fn length_mismatch_beyond_slack() {
        let raw = counter_sequence(100, 30, &[4, 5, 5]);
        let ts = uniform_timestamps(26, 30.0);
        let err = CorrectionEngine::new().correct(&raw, &ts).unwrap_err();
        assert_eq!(
            err,
            CorrectionError::LengthMismatch {
                n_raw: 30,
                n_reference: 26,
                max_slack: 2
            }
        );
    }

    #[test]
    fn length_mismatch_within_slack_is_noted() {
        let raw = counter_sequence(100, 30, &[4, 5, 5]);
        let ts = uniform_timestamps(29, 30.0);
        let out = CorrectionEngine::new().correct(&raw, &ts).expect("correct");
        assert_eq!(out.summary.n_csv_timestamps, 29);
        assert_eq!(out.summary.notes.len(), 1);
        assert_eq!(out.summary.notes_text, out.summary.notes[0]);
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let out = CorrectionEngine::new().correct(&[], &[]).expect("correct");
        assert!(out.sequence.is_empty());
        assert!(out.correction_log.is_empty());
        assert_eq!(out.summary.n_frames, 0);
    }

    #[test]
    fn invalid_config_is_rejected_before_work() {
        let engine = CorrectionEngine::with_config(CorrectionConfig {
            window_length: 0,
            ..CorrectionConfig::default()
        });
        let raw = counter_sequence(100, 30, &[4, 5, 5]);
        let ts = uniform_timestamps(30, 30.0);
        assert!(matches!(
            engine.correct(&raw, &ts),
            Err(CorrectionError::InvalidConfig {
                field: "window_length",
                ..
            })
        ));
    }

    #[test]
    fn bad_diff_entry_carries_deltas() {
        let mut raw = counter_sequence(100, 40, &[5, 5, 5]);
        raw[20] += 32;
        let rec = recording(raw);
        let out = CorrectionEngine::new().correct_recording(&rec).expect("correct");
        assert_eq!(out.correction_log.len(), 1);
        let entry = &out.correction_log[0];
        assert_eq!(entry.frame_idx, 20);
        assert_eq!(entry.interpolation_type, CorrectionKind::BadDiff);
        assert_eq!(entry.diff_before, Some(37));
        assert_eq!(entry.diff_after, Some(5));
        assert_eq!(entry.corrected_value, 200);
        assert_eq!(out.summary.corrections_by_type[&CorrectionKind::BadDiff], 1);
    }

    #[test]
    fn synthetic_fallback_when_nothing_was_read() {
        let rec = recording(vec![0; 10]);
        let out = CorrectionEngine::with_config(CorrectionConfig {
            counter_rate_hz: Some(150.0),
            ..CorrectionConfig::default()
        })
        .correct_recording(&rec)
        .expect("correct");
        assert!(out.summary.synthetic_fallback);
        assert!(out
            .sequence
            .iter()
            .all(|f| f.correction_type() == Some(CorrectionKind::InterpolatedSynthetic)));
        assert_eq!(out.corrected_frame_indices()[9], 45);
        // Frame 0 stays 0: typed synthetic, but not a changed value.
        assert_eq!(out.correction_log.len(), 9);
    }

    #[test]
    fn pattern_window_marks_changed_deltas() {
        let mut raw = counter_sequence(100, 40, &[4, 5, 5]);
        raw[8] = 136;
        let rec = recording(raw);
        let out = CorrectionEngine::new().correct_recording(&rec).expect("correct");
        let seq = &out.sequence.frames;
        assert!(seq[7].correction.is_none());
        assert_eq!(seq[7].flagged_by, Some(CorrectionKind::Pattern446));
        assert!(matches!(seq[8].correction, Some(Correction::Pattern446 { .. })));
        assert!(matches!(seq[9].correction, Some(Correction::Pattern446 { .. })));
        assert_eq!(seq[8].diff_after, Some(5));
        assert_eq!(seq[9].diff_after, Some(5));
        assert_eq!(out.correction_log.len(), 1);
        assert_eq!(out.correction_log[0].frame_idx, 8);
    }

    #[test]
    fn batch_keeps_input_order() {
        let recs = vec![
            recording(counter_sequence(100, 30, &[4, 5, 5])),
            Recording {
                raw_frame_indices: vec![1, 2, 3],
                reference_timestamps: vec![0.0],
            },
            recording(vec![0, 0, 108, 113, 117, 122, 127, 131, 136, 141]),
        ];
        let results = CorrectionEngine::new().correct_batch(&recs);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(CorrectionError::InsufficientReferenceData { usable: 1, .. })
        ));
        let third = results[2].as_ref().expect("third");
        assert_eq!(third.correction_log.len(), 2);
    }
}
