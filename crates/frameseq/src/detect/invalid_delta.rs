use crate::config::CorrectionConfig;
use crate::model::IncrementModel;
use crate::types::{Correction, DeltaRepair, DeltaSource};

use super::{AnomalySpan, ClaimMap, DetectorKind};

/// Result of the invalid-delta scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct InvalidDeltaScan {
    /// One single-frame span per flagged frame, in frame order.
    pub(crate) spans: Vec<AnomalySpan>,
    /// Claimed frames whose value must move to stay consistent with an
    /// earlier replacement, as `(frame_idx, value)` in frame order.
    pub(crate) rebased: Vec<(usize, i64)>,
}

/// Flag frames whose delta from the previous resolved frame is invalid.
///
/// Runs over `working`, the sequence after higher-priority repairs (`None`
/// for frames that are missing or awaiting gap filling). Replacements are
/// applied to a local copy as the scan advances, so each frame is checked
/// against the already-corrected previous value.
///
/// For a one-frame delta outside the valid set, in order:
///
/// 1. If the previous frame was replaced and the raw step from it is valid,
///    the step is kept. A persistent offset is removed without drift.
/// 2. If the next reading agrees with the previous resolved frame, the frame
///    is an isolated spike. The replacement is chosen so that both deltas are
///    valid, or the frame is deferred when a gap follows it.
/// 3. Otherwise the replacement is the pattern element that continues the
///    phase of the preceding deltas, then the most recent valid delta, then
///    the rounded expected increment.
///
/// A frame following an unresolved gap is checked against the cumulative
/// plausible range instead; if it falls outside, no replacement value exists
/// yet and the frame is deferred to gap filling. The first reading is deferred
/// as well when it disagrees with the two readings after it while they agree.
///
/// Frames claimed by a higher-priority detector are not flagged. They keep
/// their repaired delta to the previous frame, so a replacement before them
/// shifts them too; after a gap they are only raised to stay monotonic.
pub(crate) fn find_invalid_deltas(
    claims: &ClaimMap,
    working: &[Option<i64>],
    model: &IncrementModel,
    config: &CorrectionConfig,
) -> InvalidDeltaScan {
    let history_len = config.window_length.max(1);
    let mut scan = InvalidDeltaScan::default();
    let mut anchor: Option<(usize, i64)> = None;
    let mut history: Vec<i64> = Vec::with_capacity(history_len + 1);

    for (i, value) in working.iter().enumerate() {
        let Some(v) = *value else { continue };
        let Some((last_idx, last_v)) = anchor else {
            match leading_outlier(i, v, claims, working, model) {
                Some(span) => {
                    tracing::trace!(i, v, "first reading disagrees with its successors");
                    scan.spans.push(span);
                }
                None => anchor = Some((i, v)),
            }
            continue;
        };
        let gap = i - last_idx;
        let delta = v - last_v;

        if claims.is_claimed(i) {
            let shifted = match (gap, working[i - 1]) {
                (1, Some(before)) => last_v + (v - before),
                _ if v < last_v => last_v + model.min_valid_increment(),
                _ => v,
            };
            if shifted != v {
                tracing::trace!(i, v, shifted, "claimed frame rebased");
                scan.rebased.push((i, shifted));
            }
            let d = shifted - last_v;
            if gap == 1 && model.is_valid_delta(d) {
                push_history(&mut history, d, history_len);
            } else {
                history.clear();
            }
            anchor = Some((i, shifted));
            continue;
        }

        if gap > 1 {
            if model.is_plausible_span(delta, gap) {
                history.clear();
                anchor = Some((i, v));
            } else {
                tracing::trace!(i, gap, delta, "implausible delta over gap deferred");
                scan.spans.push(single_frame(
                    i,
                    delta,
                    model.rounded_increment() * gap as i64,
                    Correction::BadDiff(DeltaRepair::Deferred {
                        gap,
                        observed: delta,
                    }),
                ));
            }
            continue;
        }

        if model.is_valid_delta(delta) {
            push_history(&mut history, delta, history_len);
            anchor = Some((i, v));
            continue;
        }

        let step = working[i - 1]
            .map(|before| v - before)
            .filter(|&s| model.is_valid_delta(s));
        let repair = match step {
            Some(step) => Some((step, DeltaSource::ObservedStep)),
            None => match next_reading(working, i) {
                Some((j, vj)) if j == i + 1 && model.is_plausible_span(vj - last_v, 2) => {
                    let after = following_deltas(working, j, model);
                    bridging_delta(&history, vj - last_v, &after, model)
                }
                Some((j, vj)) if model.is_plausible_span(vj - last_v, j - last_idx) => {
                    tracing::trace!(i, delta, next = j, "spike before a gap deferred");
                    scan.spans.push(single_frame(
                        i,
                        delta,
                        model.rounded_increment(),
                        Correction::BadDiff(DeltaRepair::Outlier { next_idx: j }),
                    ));
                    continue;
                }
                _ => None,
            },
        };
        let (replacement, source) = repair.unwrap_or_else(|| replacement_delta(&history, model));
        tracing::trace!(i, delta, replacement, ?source, "invalid delta replaced");
        scan.spans.push(single_frame(
            i,
            delta,
            replacement,
            Correction::BadDiff(DeltaRepair::Replaced {
                delta: replacement,
                source,
            }),
        ));
        push_history(&mut history, replacement, history_len);
        anchor = Some((i, last_v + replacement));
    }
    scan
}

fn push_history(history: &mut Vec<i64>, delta: i64, cap: usize) {
    history.push(delta);
    if history.len() > cap {
        history.remove(0);
    }
}

/// Next frame after `i` with a value.
fn next_reading(working: &[Option<i64>], i: usize) -> Option<(usize, i64)> {
    working
        .iter()
        .enumerate()
        .skip(i + 1)
        .find_map(|(j, v)| v.map(|v| (j, v)))
}

/// The first reading `i` is an outlier when it is implausible against both
/// following readings while those two agree.
fn leading_outlier(
    i: usize,
    v: i64,
    claims: &ClaimMap,
    working: &[Option<i64>],
    model: &IncrementModel,
) -> Option<AnomalySpan> {
    if claims.is_claimed(i) {
        return None;
    }
    let (n1, v1) = next_reading(working, i)?;
    let (n2, v2) = next_reading(working, n1)?;
    let disagrees =
        !model.is_plausible_span(v1 - v, n1 - i) && !model.is_plausible_span(v2 - v, n2 - i);
    let successors_agree = model.is_plausible_span(v2 - v1, n2 - n1);
    (disagrees && successors_agree).then(|| {
        single_frame(
            i,
            v1 - v,
            model.rounded_increment() * (n1 - i) as i64,
            Correction::BadDiff(DeltaRepair::Outlier { next_idx: n1 }),
        )
    })
}

/// Up to `period - 1` valid raw deltas after frame `j`.
fn following_deltas(working: &[Option<i64>], j: usize, model: &IncrementModel) -> Vec<i64> {
    let p = model.expected_triplet_pattern().len();
    working[j..]
        .windows(2)
        .map_while(|w| match (w[0], w[1]) {
            (Some(a), Some(b)) if model.is_valid_delta(b - a) => Some(b - a),
            _ => None,
        })
        .take(p.saturating_sub(1))
        .collect()
}

/// Delta for a spike whose neighbours span `span` over two frames, such that
/// `span - delta` is valid as well.
///
/// A split that lines up with the pattern together with the deltas around it
/// wins when it is the only one. Otherwise the usual preference order applies.
fn bridging_delta(
    history: &[i64],
    span: i64,
    after: &[i64],
    model: &IncrementModel,
) -> Option<(i64, DeltaSource)> {
    let splits: Vec<i64> = model
        .valid_increments()
        .iter()
        .copied()
        .filter(|&d| model.is_valid_delta(span - d))
        .collect();
    let fitting: Vec<i64> = splits
        .iter()
        .copied()
        .filter(|&d| {
            let mut deltas = history.to_vec();
            deltas.extend([d, span - d]);
            deltas.extend_from_slice(after);
            model.fits_pattern(&deltas)
        })
        .collect();
    if let &[d] = fitting.as_slice() {
        return Some((d, DeltaSource::PhaseContinuation));
    }

    let mut candidates: Vec<(i64, DeltaSource)> = Vec::new();
    if let Some(next) = phase_from(history, model) {
        candidates.push((next, DeltaSource::PhaseContinuation));
    }
    if let Some(&last) = history.last() {
        candidates.push((last, DeltaSource::PrecedingDelta));
    }
    candidates.push((model.rounded_increment(), DeltaSource::ExpectedIncrement));
    candidates.extend(splits.iter().map(|&d| (d, DeltaSource::FollowingFrame)));
    candidates.into_iter().find(|(d, _)| splits.contains(d))
}

fn phase_from(history: &[i64], model: &IncrementModel) -> Option<i64> {
    let p = model.expected_triplet_pattern().len();
    if p == 0 || history.len() + 1 < p {
        return None;
    }
    model.phase_continuation(&history[history.len() + 1 - p..])
}

fn replacement_delta(history: &[i64], model: &IncrementModel) -> (i64, DeltaSource) {
    if let Some(next) = phase_from(history, model) {
        return (next, DeltaSource::PhaseContinuation);
    }
    if let Some(&last) = history.last() {
        if model.is_valid_delta(last) {
            return (last, DeltaSource::PrecedingDelta);
        }
    }
    (model.rounded_increment(), DeltaSource::ExpectedIncrement)
}

/// Evidence grows with how far the observed delta sits from the expected one.
fn single_frame(i: usize, observed: i64, expected: i64, correction: Correction) -> AnomalySpan {
    let scale = expected.abs().max(1) as f64;
    let evidence = ((observed - expected).abs() as f64 / scale).min(1.0);
    AnomalySpan {
        detector: DetectorKind::InvalidDelta,
        start: i,
        end: i + 1,
        evidence,
        correction,
    }
}
