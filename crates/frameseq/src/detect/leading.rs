use crate::config::CorrectionConfig;
use crate::types::Correction;

use super::{AnomalySpan, ClaimMap, DetectorKind};

/// Flag the maximal prefix of missing readings.
///
/// The span is a placeholder: its values are filled by backward extrapolation
/// once the rest of the sequence is repaired.
pub(crate) fn find_leading_run(
    raw: &[i64],
    claims: &ClaimMap,
    config: &CorrectionConfig,
) -> Option<AnomalySpan> {
    let end = raw
        .iter()
        .position(|&v| !config.is_missing_reading(v))
        .unwrap_or(raw.len());
    if end == 0 || !claims.is_free(0, end) {
        return None;
    }
    Some(AnomalySpan {
        detector: DetectorKind::LeadingRun,
        start: 0,
        end,
        evidence: 1.0,
        correction: Correction::LeadingZero,
    })
}
