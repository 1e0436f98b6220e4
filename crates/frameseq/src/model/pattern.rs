use std::collections::BTreeMap;

/// Minimum number of windows a delta-window class needs before it is trusted
/// as the periodic pattern.
const MIN_PATTERN_SUPPORT: usize = 2;

/// Periodic increment pattern inferred from observed deltas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PatternEstimate {
    /// Canonical (lexicographically smallest) rotation of the pattern.
    pub(crate) pattern: Vec<i64>,
    /// Number of observed windows (or single deltas) supporting it.
    pub(crate) support: usize,
}

/// Positive deltas between consecutive present readings, indexed by the later
/// frame. Index 0 is always `None`.
pub(crate) fn observed_deltas(
    raw: &[i64],
    is_missing: impl Fn(i64) -> bool,
    allowed: Option<&[i64]>,
) -> Vec<Option<i64>> {
    let mut out = vec![None; raw.len()];
    for i in 1..raw.len() {
        if is_missing(raw[i]) || is_missing(raw[i - 1]) {
            continue;
        }
        let d = raw[i] - raw[i - 1];
        if d <= 0 || allowed.is_some_and(|set| !set.contains(&d)) {
            continue;
        }
        out[i] = Some(d);
    }
    out
}

/// All cyclic rotations of `pattern`, rotation `k` starting at element `k`.
pub(crate) fn rotations(pattern: &[i64]) -> Vec<Vec<i64>> {
    let p = pattern.len();
    (0..p)
        .map(|k| (0..p).map(|j| pattern[(k + j) % p]).collect())
        .collect()
}

pub(crate) fn canonical_rotation(window: &[i64]) -> Vec<i64> {
    rotations(window)
        .into_iter()
        .min()
        .unwrap_or_default()
}

pub(crate) fn is_rotation_of(window: &[i64], pattern: &[i64]) -> bool {
    window.len() == pattern.len() && rotations(pattern).iter().any(|r| r == window)
}

/// Pick the most frequent window class of length `period`; fall back to the
/// modal single delta repeated `period` times when no class has enough support.
pub(crate) fn estimate_pattern(deltas: &[Option<i64>], period: usize) -> Option<PatternEstimate> {
    if period == 0 {
        return None;
    }

    let mut classes: BTreeMap<Vec<i64>, usize> = BTreeMap::new();
    let mut run: Vec<i64> = Vec::new();
    for d in deltas {
        match d {
            Some(v) => {
                run.push(*v);
                if run.len() >= period {
                    let window = &run[run.len() - period..];
                    *classes.entry(canonical_rotation(window)).or_insert(0) += 1;
                }
            }
            None => run.clear(),
        }
    }

    let mut best: Option<(&Vec<i64>, usize)> = None;
    for (class, &count) in &classes {
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((class, count));
        }
    }
    if let Some((class, support)) = best {
        if support >= MIN_PATTERN_SUPPORT {
            return Some(PatternEstimate {
                pattern: class.clone(),
                support,
            });
        }
    }

    let mut singles: BTreeMap<i64, usize> = BTreeMap::new();
    for d in deltas.iter().flatten() {
        *singles.entry(*d).or_insert(0) += 1;
    }
    let mut mode: Option<(i64, usize)> = None;
    for (&d, &count) in &singles {
        if mode.is_none_or(|(_, c)| count > c) {
            mode = Some((d, count));
        }
    }
    mode.map(|(d, support)| PatternEstimate {
        pattern: vec![d; period],
        support,
    })
}

/// Integer pattern of length `period` whose deltas average to `increment`.
pub(crate) fn distribute_increment(increment: f64, period: usize) -> Vec<i64> {
    let pattern: Vec<i64> = (0..period)
        .map(|k| {
            let hi = ((k + 1) as f64 * increment).round() as i64;
            let lo = (k as f64 * increment).round() as i64;
            hi - lo
        })
        .collect();
    canonical_rotation(&pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotations_and_canonical_form() {
        assert_eq!(
            rotations(&[4, 5, 5]),
            vec![vec![4, 5, 5], vec![5, 5, 4], vec![5, 4, 5]]
        );
        assert_eq!(canonical_rotation(&[5, 4, 5]), vec![4, 5, 5]);
        assert!(is_rotation_of(&[5, 5, 4], &[4, 5, 5]));
        assert!(!is_rotation_of(&[4, 4, 6], &[4, 5, 5]));
    }

    #[test]
    fn observed_deltas_skip_missing_and_non_positive() {
        let d = observed_deltas(&[0, 4, 9, 9, 14, 0, 20], |v| v <= 0, None);
        assert_eq!(d, vec![None, None, Some(5), None, Some(5), None, None]);
        let d = observed_deltas(&[4, 9, 46, 51], |v| v <= 0, Some(&[4, 5]));
        assert_eq!(d, vec![None, Some(5), None, Some(5)]);
    }

    #[test]
    fn dominant_window_class_wins_over_misread() {
        // 4,5,5 cycle with one 4,4,6 misread.
        let mut deltas = vec![None];
        for _ in 0..6 {
            deltas.extend([Some(4), Some(5), Some(5)]);
        }
        deltas.extend([Some(4), Some(4), Some(6)]);
        let est = estimate_pattern(&deltas, 3).expect("pattern");
        assert_eq!(est.pattern, vec![4, 5, 5]);
        assert!(est.support >= 10);
    }

    #[test]
    fn short_runs_fall_back_to_modal_delta() {
        let deltas = vec![None, Some(5), Some(5), Some(37), None, Some(5), Some(5)];
        let est = estimate_pattern(&deltas, 3).expect("pattern");
        assert_eq!(est.pattern, vec![5, 5, 5]);
        assert_eq!(est.support, 4);
        assert_eq!(estimate_pattern(&[None, None], 3), None);
    }

    #[test]
    fn distributed_increment_preserves_the_mean() {
        let p = distribute_increment(14.0 / 3.0, 3);
        assert_eq!(p, vec![4, 5, 5]);
        assert_eq!(distribute_increment(5.0, 3), vec![5, 5, 5]);
    }
}
