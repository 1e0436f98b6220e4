//! frameseq: repair of OCR-read camera frame-counter sequences.
//!
//! A camera overlays a frame counter on every image; reading it back with OCR
//! yields a per-frame integer sequence with dropouts, repeated blocks,
//! misread digits and spikes. This crate turns that sequence into a
//! monotonic frame index plus an auditable log of every change, cross-checked
//! against an independent timestamp series.
//!
//! The correction pass runs these stages:
//!
//! 1. **Model**: frame rate from the reference timestamps, expected
//!    per-frame increment and its periodic pattern (e.g. `4,5,5`).
//! 2. **Detect**: duplicate blocks, leading missing run, periodic misreads
//!    and invalid deltas, resolved through a frame ownership map.
//! 3. **Repair**: apply each detector's correction in priority order.
//! 4. **Gap fill**: interpolate interior gaps, extrapolate boundary runs.
//! 5. **Synthetic fallback**: when nothing was read at all, reconstruct the
//!    whole counter from the expected increment.
//!
//! # Public API
//! - [`CorrectionEngine`] as the entry point
//! - [`CorrectionConfig`] for tuning
//! - [`CorrectionOutput`] and its records as results
//!
//! Detector and repair internals are not part of the public surface.

mod config;
mod detect;
mod engine;
mod error;
mod gap_fill;
mod model;
mod repair;
mod synthetic;
mod types;

#[cfg(test)]
mod test_utils;

pub use config::CorrectionConfig;
pub use detect::{AnomalySpan, ClaimMap, DetectorKind};
pub use engine::CorrectionEngine;
pub use error::{CorrectionError, InvariantKind};
pub use model::{analyze_reference, IncrementModel, IncrementSource, ReferenceTiming};
pub use types::{
    CorrectedSequence, Correction, CorrectionKind, CorrectionLogEntry, CorrectionOutput,
    DeltaRepair, DeltaSource, FrameRecord, FrameStatus, Recording, SequenceSummary,
};
