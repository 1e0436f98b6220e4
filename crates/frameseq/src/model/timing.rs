use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::CorrectionError;

/// Frame timing derived from the independent reference time series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTiming {
    /// Entries in the reference series.
    pub n_timestamps: usize,
    /// Finite entries.
    pub n_usable: usize,
    /// Median positive interval between consecutive usable timestamps (s).
    pub median_interval_sec: f64,
    /// `1 / median_interval_sec`.
    pub frame_rate_hz: f64,
    /// Last minus first usable timestamp (s).
    pub duration_sec: f64,
}

pub(crate) const MIN_USABLE_TIMESTAMPS: usize = 2;

/// Estimate frame rate and duration from reference timestamps.
///
/// Non-finite entries are skipped, and so are non-positive intervals
/// (repeated timestamps), so a few missing or stuck samples do not bias the
/// median.
pub fn analyze_reference(timestamps: &[f64]) -> Result<ReferenceTiming, CorrectionError> {
    let usable: Vec<f64> = timestamps.iter().copied().filter(|t| t.is_finite()).collect();
    let insufficient = || CorrectionError::InsufficientReferenceData {
        usable: usable.len(),
        needed: MIN_USABLE_TIMESTAMPS,
    };
    if usable.len() < MIN_USABLE_TIMESTAMPS {
        return Err(insufficient());
    }

    let mut intervals: Vec<f64> = usable
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|dt| *dt > 0.0)
        .collect();
    let Some(median_interval_sec) = median(&mut intervals) else {
        return Err(insufficient());
    };

    Ok(ReferenceTiming {
        n_timestamps: timestamps.len(),
        n_usable: usable.len(),
        median_interval_sec,
        frame_rate_hz: 1.0 / median_interval_sec,
        duration_sec: usable[usable.len() - 1] - usable[0],
    })
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    })
}
