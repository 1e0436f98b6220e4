use crate::detect::ClaimMap;
use crate::model::IncrementSource;
use crate::repair::RepairWorkspace;
use crate::types::Correction;

/// `round(i * expected_increment)` for `i` in `0..n_frames`.
pub(crate) fn synthetic_values(n_frames: usize, expected_increment: f64) -> Vec<i64> {
    (0..n_frames)
        .map(|i| (i as f64 * expected_increment).round() as i64)
        .collect()
}

/// Replace the whole sequence with a synthetic arithmetic counter anchored
/// at zero, discarding any partial repair.
pub(crate) fn apply_synthetic(ws: &mut RepairWorkspace<'_>) {
    let n = ws.len();
    let expected_increment = ws.model.expected_increment();
    let correction = Correction::InterpolatedSynthetic { expected_increment };
    let details = correction.details();

    ws.working = synthetic_values(n, expected_increment)
        .into_iter()
        .map(Some)
        .collect();
    ws.corrections = vec![Some(correction); n];
    ws.details = vec![vec![details]; n];
    ws.claims = ClaimMap::new(n);

    ws.note(format!(
        "no valid readings; synthetic sequence generated at {:.3} per frame",
        expected_increment
    ));
    if ws.model.source() == IncrementSource::Unit {
        ws.note("no increment information available; unit increment assumed");
    }
}
