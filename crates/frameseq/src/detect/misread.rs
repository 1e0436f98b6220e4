use crate::config::CorrectionConfig;
use crate::model::{is_rotation_of, rotations, IncrementModel};
use crate::types::Correction;

use super::{AnomalySpan, ClaimMap, DetectorKind};

/// Flag delta windows that are a misread permutation of the expected pattern.
///
/// A window `[s, s + p)` (with base frame `s - 1`) matches when its observed
/// deltas sum to the pattern total, are not a rotation of the pattern, and
/// some rotation lies within `pattern_max_deviation` of every observed delta.
/// The chosen rotation minimizes L1 distance, then agrees with the phase of
/// the preceding deltas, then has the lowest rotation index. Windows do not
/// overlap.
pub(crate) fn find_periodic_misreads(
    raw: &[i64],
    claims: &ClaimMap,
    model: &IncrementModel,
    config: &CorrectionConfig,
) -> Vec<AnomalySpan> {
    let pattern = model.expected_triplet_pattern();
    let p = pattern.len();
    let n = raw.len();
    let mut spans = Vec::new();
    if p < 2 || n < p + 1 {
        return spans;
    }

    let target_sum: i64 = pattern.iter().sum();
    let candidates = rotations(pattern);
    let present = |i: usize| !config.is_missing_reading(raw[i]);

    let mut s = 1usize;
    while s + p <= n {
        if !(s - 1..s + p).all(present) || !claims.is_free(s - 1, s + p) {
            s += 1;
            continue;
        }
        let observed: Vec<i64> = (s..s + p).map(|i| raw[i] - raw[i - 1]).collect();
        if observed.iter().sum::<i64>() != target_sum || is_rotation_of(&observed, pattern) {
            s += 1;
            continue;
        }

        let phase_next = preceding_deltas(raw, s, p, model, config)
            .and_then(|prev| model.phase_continuation(&prev));

        let best = candidates
            .iter()
            .enumerate()
            .filter(|(_, rot)| {
                rot.iter()
                    .zip(&observed)
                    .all(|(e, o)| (e - o).abs() <= config.pattern_max_deviation)
            })
            .min_by_key(|(idx, rot)| {
                let l1: i64 = rot.iter().zip(&observed).map(|(e, o)| (e - o).abs()).sum();
                let off_phase = phase_next.is_some_and(|next| rot[0] != next);
                (l1, off_phase, *idx)
            });

        match best {
            Some((_, expected)) => {
                let l1: i64 = expected
                    .iter()
                    .zip(&observed)
                    .map(|(e, o)| (e - o).abs())
                    .sum();
                let evidence = (1.0 - l1 as f64 / target_sum.max(1) as f64).clamp(0.0, 1.0);
                tracing::trace!(s, ?observed, ?expected, "periodic misread");
                spans.push(AnomalySpan {
                    detector: DetectorKind::PeriodicMisread,
                    start: s,
                    end: s + p,
                    evidence,
                    correction: Correction::Pattern446 {
                        observed,
                        expected: expected.clone(),
                    },
                });
                s += p;
            }
            None => s += 1,
        }
    }
    spans
}

/// The `p - 1` raw deltas leading into frame `s`, if all are present and valid.
fn preceding_deltas(
    raw: &[i64],
    s: usize,
    p: usize,
    model: &IncrementModel,
    config: &CorrectionConfig,
) -> Option<Vec<i64>> {
    if s < p {
        return None;
    }
    let mut out = Vec::with_capacity(p - 1);
    for q in (s + 1 - p)..s {
        if config.is_missing_reading(raw[q]) || config.is_missing_reading(raw[q - 1]) {
            return None;
        }
        let d = raw[q] - raw[q - 1];
        if !model.is_valid_delta(d) {
            return None;
        }
        out.push(d);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{counter_sequence, uniform_timestamps};

    fn model() -> IncrementModel {
        let clean = counter_sequence(100, 40, &[4, 5, 5]);
        let ts = uniform_timestamps(40, 30.0);
        IncrementModel::derive(&clean, &ts, &CorrectionConfig::default()).expect("model")
    }

    #[test]
    fn four_four_six_becomes_four_five_five() {
        // ...,128,132,[136],142,... : deltas into frames 7..10 are 4,4,6.
        let mut raw = counter_sequence(100, 16, &[4, 5, 5]);
        assert_eq!(raw[8], 137);
        raw[8] = 136;
        let cfg = CorrectionConfig::default();
        let spans = find_periodic_misreads(&raw, &ClaimMap::new(raw.len()), &model(), &cfg);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].frames(), 7..10);
        assert_eq!(
            spans[0].correction,
            Correction::Pattern446 {
                observed: vec![4, 4, 6],
                expected: vec![4, 5, 5],
            }
        );
    }

    #[test]
    fn clean_counter_has_no_misreads() {
        let raw = counter_sequence(100, 40, &[4, 5, 5]);
        let cfg = CorrectionConfig::default();
        assert!(find_periodic_misreads(&raw, &ClaimMap::new(40), &model(), &cfg).is_empty());
    }

    #[test]
    fn large_deviation_is_left_to_other_detectors() {
        // Deltas 1,6,7 into frames 4..7 sum to 14 but are too far from any rotation.
        let mut raw = counter_sequence(100, 12, &[4, 5, 5]);
        raw[4] = 115;
        raw[5] = 121;
        raw[6] = 128;
        let cfg = CorrectionConfig::default();
        assert!(find_periodic_misreads(&raw, &ClaimMap::new(12), &model(), &cfg).is_empty());
    }

    #[test]
    fn claimed_frames_are_skipped() {
        let mut raw = counter_sequence(100, 16, &[4, 5, 5]);
        raw[8] = 136;
        let mut claims = ClaimMap::new(raw.len());
        claims.claim(&AnomalySpan {
            detector: DetectorKind::DuplicateBlock,
            start: 8,
            end: 9,
            evidence: 1.0,
            correction: Correction::LeadingZero,
        });
        let cfg = CorrectionConfig::default();
        assert!(find_periodic_misreads(&raw, &claims, &model(), &cfg).is_empty());
    }
}
