//! Fill frames left unresolved after anomaly repair.
//!
//! Interior runs are linearly interpolated between their resolved neighbors.
//! Runs touching either end of the sequence are extrapolated at the slope of
//! the nearest resolved run of at least two frames. "Resolved" means
//! trustworthy after repair, so corrected frames bound a run just like raw
//! ones.

use crate::repair::RepairWorkspace;
use crate::types::Correction;

/// Counters produced by gap filling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct GapFillStats {
    pub(crate) n_runs: usize,
    pub(crate) n_interpolated: usize,
    pub(crate) n_extrapolated_leading: usize,
    pub(crate) n_extrapolated_trailing: usize,
}

/// Maximal run `[start, end)` of unresolved frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Run {
    start: usize,
    end: usize,
}

fn unresolved_runs(working: &[Option<i64>]) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;
    for (i, v) in working.iter().enumerate() {
        match (v, start) {
            (None, None) => start = Some(i),
            (Some(_), Some(s)) => {
                runs.push(Run { start: s, end: i });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(Run {
            start: s,
            end: working.len(),
        });
    }
    runs
}

/// Maximal runs of resolved frames with consecutive indices.
fn resolved_runs(working: &[Option<i64>]) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;
    for (i, v) in working.iter().enumerate() {
        match (v, start) {
            (Some(_), None) => start = Some(i),
            (None, Some(s)) => {
                runs.push(Run { start: s, end: i });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(Run {
            start: s,
            end: working.len(),
        });
    }
    runs
}

/// Slope over the first (or last) `window` frames of `run`.
fn run_slope(working: &[Option<i64>], run: Run, window: usize, from_end: bool) -> Option<f64> {
    let len = run.end - run.start;
    let m = len.min(window.max(2));
    if m < 2 {
        return None;
    }
    let (a, b) = if from_end {
        (run.end - m, run.end - 1)
    } else {
        (run.start, run.start + m - 1)
    };
    let (va, vb) = (working[a]?, working[b]?);
    Some((vb - va) as f64 / (b - a) as f64)
}

#[inline]
fn lerp_round(left: i64, right: i64, t: f64) -> i64 {
    (left as f64 + (right - left) as f64 * t).round() as i64
}

/// Resolve every unresolved frame of `ws` that has at least one resolved
/// frame in the sequence. Leaves `ws` untouched when nothing is resolved.
pub(crate) fn fill_gaps(ws: &mut RepairWorkspace<'_>) -> GapFillStats {
    let mut stats = GapFillStats::default();
    let runs = unresolved_runs(&ws.working);
    if runs.is_empty() {
        return stats;
    }
    let resolved = resolved_runs(&ws.working);
    if resolved.is_empty() {
        tracing::debug!("gap fill: no resolved frames to anchor on");
        return stats;
    }

    let n = ws.len();
    let window = ws.config.window_length;
    let fallback_slope = ws.model.expected_increment();
    let leading_slope = resolved
        .iter()
        .find(|r| r.end - r.start >= 2)
        .and_then(|&r| run_slope(&ws.working, r, window, false));
    let trailing_slope = resolved
        .iter()
        .rev()
        .find(|r| r.end - r.start >= 2)
        .and_then(|&r| run_slope(&ws.working, r, window, true));

    for run in runs {
        stats.n_runs += 1;
        let len = run.end - run.start;
        let left = run.start.checked_sub(1).and_then(|l| ws.working[l].map(|v| (l, v)));
        let right = (run.end < n)
            .then(|| ws.working[run.end].map(|v| (run.end, v)))
            .flatten();

        match (left, right) {
            (Some((l, vl)), Some((r, vr))) => {
                for i in run.start..run.end {
                    let t = (i - l) as f64 / (r - l) as f64;
                    ws.assign(
                        i,
                        lerp_round(vl, vr, t),
                        Correction::Interpolated {
                            left_idx: l,
                            right_idx: r,
                        },
                    );
                    stats.n_interpolated += 1;
                }
            }
            (None, Some((anchor_idx, anchor))) => {
                let slope = leading_slope.unwrap_or(fallback_slope);
                if leading_slope.is_none() {
                    ws.note("no resolved run of two frames; leading extrapolation used expected increment");
                }
                if len > ws.config.max_extrapolation_frames {
                    ws.note(format!(
                        "leading extrapolation run of {} frames exceeds {}",
                        len, ws.config.max_extrapolation_frames
                    ));
                }
                for i in run.start..run.end {
                    let k = (anchor_idx - i) as f64;
                    ws.assign(
                        i,
                        (anchor as f64 - slope * k).round() as i64,
                        Correction::ExtrapolatedLeading { anchor_idx, slope },
                    );
                    stats.n_extrapolated_leading += 1;
                }
            }
            (Some((anchor_idx, anchor)), None) => {
                let slope = trailing_slope.unwrap_or(fallback_slope);
                if trailing_slope.is_none() {
                    ws.note("no resolved run of two frames; trailing extrapolation used expected increment");
                }
                if len > ws.config.max_extrapolation_frames {
                    ws.note(format!(
                        "trailing extrapolation run of {} frames exceeds {}",
                        len, ws.config.max_extrapolation_frames
                    ));
                }
                for i in run.start..run.end {
                    let k = (i - anchor_idx) as f64;
                    ws.assign(
                        i,
                        (anchor as f64 + slope * k).round() as i64,
                        Correction::ExtrapolatedTrailing { anchor_idx, slope },
                    );
                    stats.n_extrapolated_trailing += 1;
                }
            }
            (None, None) => {}
        }
    }

    tracing::debug!(?stats, "gap fill complete");
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CorrectionConfig;
    use crate::model::IncrementModel;
    use crate::test_utils::{counter_sequence, uniform_timestamps};
    use crate::types::CorrectionKind;
    use approx::assert_relative_eq;

    fn model() -> IncrementModel {
        let clean = counter_sequence(100, 40, &[4, 5, 5]);
        let ts = uniform_timestamps(40, 30.0);
        IncrementModel::derive(&clean, &ts, &CorrectionConfig::default()).expect("model")
    }

    fn kinds(ws: &RepairWorkspace<'_>) -> Vec<Option<CorrectionKind>> {
        ws.corrections
            .iter()
            .map(|c| c.as_ref().map(Correction::kind))
            .collect()
    }

    #[test]
    fn run_detection() {
        let w = [None, Some(1), None, None, Some(4), None];
        assert_eq!(
            unresolved_runs(&w),
            vec![
                Run { start: 0, end: 1 },
                Run { start: 2, end: 4 },
                Run { start: 5, end: 6 }
            ]
        );
        assert_eq!(
            resolved_runs(&w),
            vec![Run { start: 1, end: 2 }, Run { start: 4, end: 5 }]
        );
    }

    #[test]
    fn interior_gap_is_interpolated() {
        let m = model();
        let cfg = CorrectionConfig::default();
        let raw = [123, 0, 0, 0, 142];
        let mut ws = RepairWorkspace::new(&raw, &m, &cfg);
        let stats = fill_gaps(&mut ws);
        assert_eq!(stats.n_interpolated, 3);
        assert_eq!(
            ws.working,
            vec![Some(123), Some(128), Some(133), Some(137), Some(142)]
        );
        assert_eq!(
            ws.corrections[2],
            Some(Correction::Interpolated {
                left_idx: 0,
                right_idx: 4
            })
        );
    }

    #[test]
    fn leading_run_extrapolates_backwards() {
        let m = model();
        let cfg = CorrectionConfig::default();
        let raw = [0, 0, 4, 8, 13, 18, 22];
        let mut ws = RepairWorkspace::new(&raw, &m, &cfg);
        let stats = fill_gaps(&mut ws);
        assert_eq!(stats.n_extrapolated_leading, 2);
        // Slope of frames 2..=4 is (13 - 4) / 2 = 4.5.
        assert_eq!(ws.working[0], Some(-5));
        assert_eq!(ws.working[1], Some(-1));
        match &ws.corrections[1] {
            Some(Correction::ExtrapolatedLeading { anchor_idx, slope }) => {
                assert_eq!(*anchor_idx, 2);
                assert_relative_eq!(*slope, 4.5);
            }
            other => panic!("unexpected correction {other:?}"),
        }
        assert!(ws.corrections[2..].iter().all(Option::is_none));
    }

    #[test]
    fn trailing_run_extrapolates_forwards() {
        let m = model();
        let cfg = CorrectionConfig::default();
        let raw = [100, 104, 109, 114, 0, 0];
        let mut ws = RepairWorkspace::new(&raw, &m, &cfg);
        fill_gaps(&mut ws);
        // Last three resolved frames: (114 - 104) / 2 = 5.
        assert_eq!(ws.working[4], Some(119));
        assert_eq!(ws.working[5], Some(124));
        assert_eq!(
            kinds(&ws)[4..],
            [
                Some(CorrectionKind::ExtrapolatedTrailing),
                Some(CorrectionKind::ExtrapolatedTrailing)
            ]
        );
    }

    #[test]
    fn long_extrapolation_adds_note() {
        let m = model();
        let cfg = CorrectionConfig {
            max_extrapolation_frames: 1,
            ..CorrectionConfig::default()
        };
        let raw = [100, 104, 109, 0, 0];
        let mut ws = RepairWorkspace::new(&raw, &m, &cfg);
        fill_gaps(&mut ws);
        assert_eq!(ws.notes.len(), 1);
        assert!(ws.notes[0].contains("trailing extrapolation run of 2 frames"));
    }

    #[test]
    fn single_resolved_frame_uses_expected_increment() {
        let m = model();
        let cfg = CorrectionConfig::default();
        let raw = [0, 0, 100, 0];
        let mut ws = RepairWorkspace::new(&raw, &m, &cfg);
        let stats = fill_gaps(&mut ws);
        assert_eq!(stats.n_runs, 2);
        // 14/3 per frame.
        assert_eq!(ws.working, vec![Some(91), Some(95), Some(100), Some(105)]);
        assert_eq!(ws.notes.len(), 2);
    }

    #[test]
    fn nothing_resolved_leaves_workspace_untouched() {
        let m = model();
        let cfg = CorrectionConfig::default();
        let raw = [0, 0, 0];
        let mut ws = RepairWorkspace::new(&raw, &m, &cfg);
        assert_eq!(fill_gaps(&mut ws), GapFillStats::default());
        assert_eq!(ws.n_unresolved(), 3);
    }
}
