//! Expected counter increments.
//!
//! The counter advances in a short periodic pattern (for example `4,5,5`
//! repeating). The pattern comes from, in order of preference:
//!
//! 1. an explicit `increment_pattern` in the config,
//! 2. the most frequent delta window observed in the raw sequence,
//! 3. `counter_rate_hz / frame_rate_hz` from the reference series,
//! 4. the mean of an overridden valid-increment set,
//! 5. a unit increment (with a note).

mod pattern;
mod timing;

use serde::{Deserialize, Serialize};

use crate::config::CorrectionConfig;
use crate::error::CorrectionError;

pub(crate) use pattern::{is_rotation_of, rotations};
pub use timing::{analyze_reference, ReferenceTiming};

/// How the increment pattern was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncrementSource {
    /// `increment_pattern` from the configuration.
    Configured,
    /// Most frequent delta window of the raw sequence.
    Observed,
    /// Counter clock rate divided by the reference frame rate.
    CounterRate,
    /// Mean of the configured valid-increment set.
    ValidSetMean,
    /// Nothing usable; one count per frame assumed.
    Unit,
}

/// Expected per-frame increment, its periodic pattern and the valid-delta set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementModel {
    timing: ReferenceTiming,
    pattern: Vec<i64>,
    valid_increments: Vec<i64>,
    expected_increment: f64,
    source: IncrementSource,
    support: usize,
}

impl IncrementModel {
    /// Derive the model from the reference series and the raw counter.
    pub fn derive(
        raw: &[i64],
        reference_timestamps: &[f64],
        config: &CorrectionConfig,
    ) -> Result<Self, CorrectionError> {
        let timing = analyze_reference(reference_timestamps)?;
        let period = config.window_length.max(1);
        let valid_override = config.valid_increment_set.as_ref().map(|set| {
            let mut set = set.clone();
            set.sort_unstable();
            set.dedup();
            set
        });

        let mut support = 0usize;
        let (pattern, source, exact_increment) = if let Some(p) = &config.increment_pattern {
            (p.clone(), IncrementSource::Configured, None)
        } else {
            let deltas = pattern::observed_deltas(
                raw,
                |v| config.is_missing_reading(v),
                valid_override.as_deref(),
            );
            if let Some(est) = pattern::estimate_pattern(&deltas, period) {
                support = est.support;
                (est.pattern, IncrementSource::Observed, None)
            } else if let Some(rate) = config.counter_rate_hz {
                let inc = rate / timing.frame_rate_hz;
                (
                    pattern::distribute_increment(inc, period),
                    IncrementSource::CounterRate,
                    Some(inc),
                )
            } else if let Some(set) = &valid_override {
                let inc = set.iter().sum::<i64>() as f64 / set.len() as f64;
                (
                    pattern::distribute_increment(inc, period),
                    IncrementSource::ValidSetMean,
                    Some(inc),
                )
            } else {
                (vec![1; period], IncrementSource::Unit, None)
            }
        };

        let expected_increment = exact_increment
            .unwrap_or_else(|| pattern.iter().sum::<i64>() as f64 / pattern.len() as f64);
        let valid_increments = valid_override.unwrap_or_else(|| {
            let mut set = pattern.clone();
            set.sort_unstable();
            set.dedup();
            set
        });

        tracing::debug!(
            frame_rate_hz = timing.frame_rate_hz,
            ?pattern,
            ?valid_increments,
            expected_increment,
            ?source,
            support,
            "increment model derived",
        );

        Ok(Self {
            timing,
            pattern,
            valid_increments,
            expected_increment,
            source,
            support,
        })
    }

    /// Mean counter increment per frame.
    #[inline]
    pub fn expected_increment(&self) -> f64 {
        self.expected_increment
    }

    #[inline]
    pub fn is_valid_delta(&self, d: i64) -> bool {
        self.valid_increments.contains(&d)
    }

    /// Expected periodic delta pattern (canonical rotation).
    pub fn expected_triplet_pattern(&self) -> &[i64] {
        &self.pattern
    }

    /// Sorted set of legitimate consecutive deltas.
    pub fn valid_increments(&self) -> &[i64] {
        &self.valid_increments
    }

    pub fn min_valid_increment(&self) -> i64 {
        self.valid_increments.first().copied().unwrap_or(0)
    }

    pub fn max_valid_increment(&self) -> i64 {
        self.valid_increments.last().copied().unwrap_or(0)
    }

    /// Whether `delta` is a plausible cumulative increment over `frames` frames.
    pub fn is_plausible_span(&self, delta: i64, frames: usize) -> bool {
        match frames {
            0 => delta == 0,
            1 => self.is_valid_delta(delta),
            n => {
                let n = n as i64;
                delta >= n * self.min_valid_increment() && delta <= n * self.max_valid_increment()
            }
        }
    }

    pub fn frame_rate_hz(&self) -> f64 {
        self.timing.frame_rate_hz
    }

    pub fn duration_sec(&self) -> f64 {
        self.timing.duration_sec
    }

    pub fn timing(&self) -> &ReferenceTiming {
        &self.timing
    }

    pub fn source(&self) -> IncrementSource {
        self.source
    }

    /// Number of observed windows supporting an observed pattern.
    pub fn support(&self) -> usize {
        self.support
    }

    /// Next pattern element after `preceding`, when `preceding` (the last
    /// `period - 1` deltas) lines up with exactly one phase of the pattern.
    ///
    /// A constant pattern lines up everywhere and yields its single value.
    pub(crate) fn phase_continuation(&self, preceding: &[i64]) -> Option<i64> {
        let p = self.pattern.len();
        if p == 0 || preceding.len() + 1 != p {
            return None;
        }
        let mut next: Option<i64> = None;
        for offset in 0..p {
            if !self.aligned_at(offset, preceding) {
                continue;
            }
            let candidate = self.pattern[(offset + p - 1) % p];
            match next {
                Some(prev) if prev != candidate => return None,
                _ => next = Some(candidate),
            }
        }
        next
    }

    /// Whether `deltas` are consecutive elements of the cyclic pattern.
    pub(crate) fn fits_pattern(&self, deltas: &[i64]) -> bool {
        (0..self.pattern.len()).any(|offset| self.aligned_at(offset, deltas))
    }

    fn aligned_at(&self, offset: usize, deltas: &[i64]) -> bool {
        let p = self.pattern.len();
        deltas
            .iter()
            .enumerate()
            .all(|(k, d)| self.pattern[(offset + k) % p] == *d)
    }

    /// Rounded expected increment, never below the smallest valid delta.
    pub(crate) fn rounded_increment(&self) -> i64 {
        (self.expected_increment.round() as i64).max(self.min_valid_increment())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{counter_sequence, uniform_timestamps};
    use approx::assert_relative_eq;

    #[test]
    fn observed_pattern_and_valid_set() {
        let raw = counter_sequence(100, 40, &[4, 5, 5]);
        let ts = uniform_timestamps(40, 30.0);
        let m = IncrementModel::derive(&raw, &ts, &CorrectionConfig::default()).expect("model");
        assert_eq!(m.source(), IncrementSource::Observed);
        assert_eq!(m.expected_triplet_pattern(), &[4, 5, 5]);
        assert_eq!(m.valid_increments(), &[4, 5]);
        assert_relative_eq!(m.expected_increment(), 14.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(m.frame_rate_hz(), 30.0, epsilon = 1e-6);
        assert!(m.is_valid_delta(4) && m.is_valid_delta(5));
        assert!(!m.is_valid_delta(6) && !m.is_valid_delta(37));
    }

    #[test]
    fn configured_pattern_and_set_take_precedence() {
        let raw = counter_sequence(100, 40, &[5, 5, 5]);
        let ts = uniform_timestamps(40, 30.0);
        let cfg = CorrectionConfig {
            increment_pattern: Some(vec![4, 5, 5]),
            valid_increment_set: Some(vec![5, 4, 4]),
            ..CorrectionConfig::default()
        };
        let m = IncrementModel::derive(&raw, &ts, &cfg).expect("model");
        assert_eq!(m.source(), IncrementSource::Configured);
        assert_eq!(m.expected_triplet_pattern(), &[4, 5, 5]);
        assert_eq!(m.valid_increments(), &[4, 5]);
    }

    #[test]
    fn counter_rate_used_when_no_readings() {
        let raw = vec![0; 30];
        let ts = uniform_timestamps(30, 30.0);
        let cfg = CorrectionConfig {
            counter_rate_hz: Some(140.0),
            ..CorrectionConfig::default()
        };
        let m = IncrementModel::derive(&raw, &ts, &cfg).expect("model");
        assert_eq!(m.source(), IncrementSource::CounterRate);
        assert_relative_eq!(m.expected_increment(), 140.0 / 30.0, epsilon = 1e-6);
        assert_eq!(m.expected_triplet_pattern(), &[4, 5, 5]);
    }

    #[test]
    fn unit_increment_as_last_resort() {
        let raw = vec![0; 10];
        let ts = uniform_timestamps(10, 60.0);
        let m = IncrementModel::derive(&raw, &ts, &CorrectionConfig::default()).expect("model");
        assert_eq!(m.source(), IncrementSource::Unit);
        assert_eq!(m.expected_increment(), 1.0);
    }

    #[test]
    fn short_reference_fails() {
        let raw = counter_sequence(100, 5, &[5, 5, 5]);
        let err = IncrementModel::derive(&raw, &[0.0], &CorrectionConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            CorrectionError::InsufficientReferenceData { usable: 1, .. }
        ));
    }

    #[test]
    fn phase_continuation_follows_the_cycle() {
        let raw = counter_sequence(100, 40, &[4, 5, 5]);
        let ts = uniform_timestamps(40, 30.0);
        let m = IncrementModel::derive(&raw, &ts, &CorrectionConfig::default()).expect("model");
        assert_eq!(m.phase_continuation(&[4, 5]), Some(5));
        assert_eq!(m.phase_continuation(&[5, 5]), Some(4));
        assert_eq!(m.phase_continuation(&[5, 4]), Some(5));
        assert_eq!(m.phase_continuation(&[4, 4]), None);
        assert_eq!(m.phase_continuation(&[4]), None);
    }

    #[test]
    fn pattern_fit_accepts_any_phase() {
        let raw = counter_sequence(100, 40, &[4, 5, 5]);
        let ts = uniform_timestamps(40, 30.0);
        let m = IncrementModel::derive(&raw, &ts, &CorrectionConfig::default()).expect("model");
        assert!(m.fits_pattern(&[5, 4, 5, 5, 4]));
        assert!(m.fits_pattern(&[]));
        assert!(!m.fits_pattern(&[5, 5, 4, 5, 4]));
        assert!(!m.fits_pattern(&[4, 4]));
    }

    #[test]
    fn plausible_spans_scale_with_gap() {
        let raw = counter_sequence(100, 40, &[4, 5, 5]);
        let ts = uniform_timestamps(40, 30.0);
        let m = IncrementModel::derive(&raw, &ts, &CorrectionConfig::default()).expect("model");
        assert!(m.is_plausible_span(18, 4));
        assert!(!m.is_plausible_span(0, 4));
        assert!(!m.is_plausible_span(6, 1));
        assert!(m.is_plausible_span(0, 0));
    }
}
