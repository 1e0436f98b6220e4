use crate::config::CorrectionConfig;
use crate::model::IncrementModel;
use crate::types::Correction;

use super::{AnomalySpan, ClaimMap, DetectorKind};

/// Flag windows that repeat an earlier non-overlapping window.
///
/// A repeat only counts when the cumulative increment between the two window
/// starts is implausible for the model; a genuine counter cannot revisit
/// earlier values. The search looks back at most
/// `duplicate_lookback_windows * window_length` frames and prefers the most
/// recent matching window. Flagged windows do not overlap.
pub(crate) fn find_duplicate_blocks(
    raw: &[i64],
    claims: &ClaimMap,
    model: &IncrementModel,
    config: &CorrectionConfig,
) -> Vec<AnomalySpan> {
    let k = config.window_length;
    let n = raw.len();
    let mut spans = Vec::new();
    if k == 0 || n < 2 * k {
        return spans;
    }

    let window_ok = |s: usize| {
        (s..s + k).all(|i| !config.is_missing_reading(raw[i])) && claims.is_free(s, s + k)
    };
    let straddles_reset = |j: usize, i: usize| {
        config
            .expected_reset_points
            .iter()
            .any(|&r| j < r && r <= i)
    };
    let lookback = config.duplicate_lookback_frames();
    let threshold = config.duplicate_similarity_threshold - 1e-12;

    let mut i = k;
    while i + k <= n {
        if !window_ok(i) {
            i += 1;
            continue;
        }

        let earliest = i.saturating_sub(lookback);
        let mut found: Option<(usize, f64)> = None;
        for j in (earliest..=i - k).rev() {
            if !window_ok(j) {
                continue;
            }
            let matches = (0..k).filter(|&t| raw[i + t] == raw[j + t]).count();
            let similarity = matches as f64 / k as f64;
            if similarity < threshold {
                continue;
            }
            if straddles_reset(j, i) {
                tracing::trace!(i, j, "duplicate candidate straddles a reset point");
                continue;
            }
            if model.is_plausible_span(raw[i] - raw[j], i - j) {
                continue;
            }
            found = Some((j, similarity));
            break;
        }

        match found {
            Some((prior_start, similarity)) => {
                spans.push(AnomalySpan {
                    detector: DetectorKind::DuplicateBlock,
                    start: i,
                    end: i + k,
                    evidence: similarity,
                    correction: Correction::DuplicateSeq {
                        prior_start,
                        similarity,
                    },
                });
                i += k;
            }
            None => i += 1,
        }
    }
    spans
}
