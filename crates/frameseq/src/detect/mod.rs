//! Anomaly detectors and the frame ownership map.
//!
//! Detectors run in a fixed priority order:
//!
//! 1. **Duplicate block**: a window repeating an earlier window where the
//!    cumulative increment between them is implausible.
//! 2. **Leading run**: the maximal prefix of missing readings.
//! 3. **Periodic misread**: a delta window that is a near-permutation of the
//!    expected pattern (the `4,4,6` for `4,5,5` case).
//! 4. **Invalid delta**: a delta outside the valid-increment set.
//!
//! Each detector only inspects frames no earlier detector has claimed. Claims
//! live in a [`ClaimMap`] rather than being implied by mutation order, so the
//! overlap rule (higher priority wins) holds regardless of scan order.

mod duplicate;
mod invalid_delta;
mod leading;
mod misread;

use serde::{Deserialize, Serialize};

use crate::types::{Correction, CorrectionKind};

pub(crate) use duplicate::find_duplicate_blocks;
pub(crate) use invalid_delta::find_invalid_deltas;
pub(crate) use leading::find_leading_run;
pub(crate) use misread::find_periodic_misreads;

/// Anomaly detectors, declared in priority order (earlier wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    DuplicateBlock,
    LeadingRun,
    PeriodicMisread,
    InvalidDelta,
}

impl DetectorKind {
    /// Detectors in the order they run.
    pub const PRIORITY: [DetectorKind; 4] = [
        Self::DuplicateBlock,
        Self::LeadingRun,
        Self::PeriodicMisread,
        Self::InvalidDelta,
    ];

    /// Correction type this detector flags frames with.
    pub fn correction_kind(self) -> CorrectionKind {
        match self {
            Self::DuplicateBlock => CorrectionKind::DuplicateSeq,
            Self::LeadingRun => CorrectionKind::LeadingZero,
            Self::PeriodicMisread => CorrectionKind::Pattern446,
            Self::InvalidDelta => CorrectionKind::BadDiff,
        }
    }
}

/// Contiguous frame range `[start, end)` flagged by one detector.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalySpan {
    pub detector: DetectorKind,
    pub start: usize,
    pub end: usize,
    /// Detector-specific confidence in `[0, 1]`.
    pub evidence: f64,
    /// Correction (or placeholder) to apply to the span.
    pub correction: Correction,
}

impl AnomalySpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn frames(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

/// Frame index → owning detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimMap {
    owners: Vec<Option<DetectorKind>>,
}

impl ClaimMap {
    pub fn new(n_frames: usize) -> Self {
        Self {
            owners: vec![None; n_frames],
        }
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    #[inline]
    pub fn owner(&self, frame_idx: usize) -> Option<DetectorKind> {
        self.owners.get(frame_idx).copied().flatten()
    }

    #[inline]
    pub fn is_claimed(&self, frame_idx: usize) -> bool {
        self.owner(frame_idx).is_some()
    }

    /// Returns `true` when no frame of `[start, end)` is claimed.
    pub fn is_free(&self, start: usize, end: usize) -> bool {
        (start..end.min(self.owners.len())).all(|i| self.owners[i].is_none())
    }

    /// Claim the frames of `span` that are unclaimed or owned by a
    /// lower-priority detector. Returns the number of frames now owned by
    /// `span.detector`.
    pub fn claim(&mut self, span: &AnomalySpan) -> usize {
        let end = span.end.min(self.owners.len());
        let mut n = 0usize;
        for owner in &mut self.owners[span.start.min(end)..end] {
            match owner {
                Some(existing) if *existing <= span.detector => {}
                _ => {
                    *owner = Some(span.detector);
                    n += 1;
                }
            }
        }
        n
    }

    /// Frames currently owned by `detector`.
    pub fn frames_owned_by(&self, detector: DetectorKind) -> Vec<usize> {
        self.owners
            .iter()
            .enumerate()
            .filter_map(|(i, o)| (*o == Some(detector)).then_some(i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(detector: DetectorKind, start: usize, end: usize) -> AnomalySpan {
        AnomalySpan {
            detector,
            start,
            end,
            evidence: 1.0,
            correction: Correction::LeadingZero,
        }
    }

    #[test]
    fn priority_order_matches_declaration() {
        let mut sorted = DetectorKind::PRIORITY;
        sorted.sort();
        assert_eq!(sorted, DetectorKind::PRIORITY);
        assert_eq!(
            DetectorKind::PeriodicMisread.correction_kind(),
            CorrectionKind::Pattern446
        );
    }

    #[test]
    fn higher_priority_claim_survives_overlap_in_either_order() {
        let dup = span(DetectorKind::DuplicateBlock, 3, 6);
        let bad = span(DetectorKind::InvalidDelta, 5, 8);

        let mut a = ClaimMap::new(10);
        assert_eq!(a.claim(&dup), 3);
        assert_eq!(a.claim(&bad), 2);

        let mut b = ClaimMap::new(10);
        assert_eq!(b.claim(&bad), 3);
        assert_eq!(b.claim(&dup), 3);

        assert_eq!(a, b);
        assert_eq!(a.owner(5), Some(DetectorKind::DuplicateBlock));
        assert_eq!(a.owner(6), Some(DetectorKind::InvalidDelta));
        assert_eq!(a.frames_owned_by(DetectorKind::InvalidDelta), vec![6, 7]);
        assert!(a.is_free(0, 3));
        assert!(!a.is_free(2, 4));
    }

    #[test]
    fn claims_are_clipped_to_the_sequence() {
        let mut m = ClaimMap::new(4);
        assert_eq!(m.claim(&span(DetectorKind::LeadingRun, 2, 9)), 2);
        assert_eq!(m.owner(9), None);
        assert!(m.is_claimed(3));
    }
}
