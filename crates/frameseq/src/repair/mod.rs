//! Anomaly repair pass.
//!
//! Detectors run in priority order against a shared [`ClaimMap`]; each sees
//! only frames no earlier detector claimed. Duplicate blocks and leading runs
//! become unresolved placeholders, periodic misreads are rewritten in place,
//! and invalid deltas are replaced (or deferred) against the partly repaired
//! sequence.
//!
//! [`ClaimMap`]: crate::detect::ClaimMap

mod workspace;

use crate::detect::{
    find_duplicate_blocks, find_invalid_deltas, find_leading_run, find_periodic_misreads,
    AnomalySpan,
};
use crate::types::{Correction, DeltaRepair};

pub(crate) use workspace::RepairWorkspace;

/// Counters produced by the anomaly repair pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RepairStats {
    /// Frames cleared as part of a repeated block.
    pub(crate) n_duplicate_frames: usize,
    /// Frames in the leading missing run.
    pub(crate) n_leading_frames: usize,
    /// Frames rewritten to the expected delta pattern.
    pub(crate) n_pattern_frames: usize,
    /// Frames whose invalid delta was replaced.
    pub(crate) n_bad_diff_replaced: usize,
    /// Frames whose implausible delta was deferred to gap filling.
    pub(crate) n_bad_diff_deferred: usize,
    /// Claimed frames shifted after an earlier replacement.
    pub(crate) n_rebased: usize,
    /// Corrections raised to keep the sequence monotonic.
    pub(crate) n_clamped: usize,
}

/// Run all detectors over `ws` and apply their corrections.
pub(crate) fn run_repair(ws: &mut RepairWorkspace<'_>) {
    if ws.len() == 0 {
        return;
    }

    let duplicates = find_duplicate_blocks(ws.raw, &ws.claims, ws.model, ws.config);
    claim_all(ws, &duplicates);
    let leading = find_leading_run(ws.raw, &ws.claims, ws.config);
    if let Some(span) = &leading {
        ws.claims.claim(span);
    }
    let misreads = find_periodic_misreads(ws.raw, &ws.claims, ws.model, ws.config);
    claim_all(ws, &misreads);

    for span in duplicates.iter().chain(leading.iter()) {
        for i in owned_frames(ws, span) {
            ws.unresolve(i, span.correction.clone());
            match span.correction {
                Correction::LeadingZero => ws.stats.n_leading_frames += 1,
                _ => ws.stats.n_duplicate_frames += 1,
            }
        }
    }
    for span in &misreads {
        apply_misread(ws, span);
    }
    tracing::debug!(
        n_duplicate_spans = duplicates.len(),
        n_leading = ws.stats.n_leading_frames,
        n_misread_spans = misreads.len(),
        "repair: structural anomalies applied",
    );

    let scan = find_invalid_deltas(&ws.claims, &ws.working, ws.model, ws.config);
    claim_all(ws, &scan.spans);
    let mut rebased = scan.rebased.iter().peekable();
    for span in &scan.spans {
        while let Some(&(i, value)) = rebased.next_if(|&&(i, _)| i < span.start) {
            apply_rebase(ws, &misreads, i, value);
        }
        for i in owned_frames(ws, span) {
            apply_invalid_delta(ws, i, &span.correction);
        }
    }
    for &(i, value) in rebased {
        apply_rebase(ws, &misreads, i, value);
    }

    tracing::debug!(
        stats = ?ws.stats,
        n_unresolved = ws.n_unresolved(),
        "repair pass complete",
    );
}

fn claim_all(ws: &mut RepairWorkspace<'_>, spans: &[AnomalySpan]) {
    for span in spans {
        ws.claims.claim(span);
    }
}

fn owned_frames(ws: &RepairWorkspace<'_>, span: &AnomalySpan) -> Vec<usize> {
    span.frames()
        .filter(|&i| ws.claims.owner(i) == Some(span.detector))
        .collect()
}

/// Rewrite a misread window as its base value plus the expected deltas.
///
/// Only frames whose delta or value changes receive the correction.
fn apply_misread(ws: &mut RepairWorkspace<'_>, span: &AnomalySpan) {
    let Correction::Pattern446 { observed, expected } = &span.correction else {
        return;
    };
    let Some(base) = span.start.checked_sub(1).and_then(|b| ws.working[b]) else {
        return;
    };
    let mut value = base;
    for (k, i) in span.frames().enumerate() {
        value += expected[k];
        if observed[k] != expected[k] || Some(value) != ws.working[i] {
            ws.assign(i, value, span.correction.clone());
            ws.stats.n_pattern_frames += 1;
        } else {
            ws.working[i] = Some(value);
        }
    }
}

/// Move a claimed frame after an earlier replacement shifted its base.
fn apply_rebase(ws: &mut RepairWorkspace<'_>, misreads: &[AnomalySpan], i: usize, value: i64) {
    let Some(span) = misreads.iter().find(|s| s.frames().contains(&i)) else {
        return;
    };
    if let Some(old) = ws.working[i] {
        ws.details[i].push(format!("shifted from {} to follow the repaired base", old));
    }
    ws.assign(i, value, span.correction.clone());
    ws.stats.n_rebased += 1;
}

fn apply_invalid_delta(ws: &mut RepairWorkspace<'_>, i: usize, correction: &Correction) {
    match correction {
        Correction::BadDiff(DeltaRepair::Replaced { delta, .. }) => {
            match ws.previous_resolved(i) {
                Some((_, prev)) => {
                    ws.assign(i, prev + delta, correction.clone());
                    ws.stats.n_bad_diff_replaced += 1;
                }
                None => {
                    ws.unresolve(i, correction.clone());
                    ws.stats.n_bad_diff_deferred += 1;
                }
            }
        }
        other => {
            ws.unresolve(i, other.clone());
            ws.stats.n_bad_diff_deferred += 1;
        }
    }
}
