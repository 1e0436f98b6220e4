use crate::config::CorrectionConfig;
use crate::detect::ClaimMap;
use crate::model::IncrementModel;
use crate::types::Correction;

use super::RepairStats;

/// Mutable state of one repair pass over a recording.
pub(crate) struct RepairWorkspace<'a> {
    pub(crate) raw: &'a [i64],
    pub(crate) model: &'a IncrementModel,
    pub(crate) config: &'a CorrectionConfig,
    /// Current value per frame; `None` while unresolved.
    pub(crate) working: Vec<Option<i64>>,
    /// Latest correction applied per frame (placeholders included).
    pub(crate) corrections: Vec<Option<Correction>>,
    pub(crate) claims: ClaimMap,
    /// Per-frame detail fragments, joined into the log entry.
    pub(crate) details: Vec<Vec<String>>,
    /// Soft warnings for the summary.
    pub(crate) notes: Vec<String>,
    pub(crate) stats: RepairStats,
}

impl<'a> RepairWorkspace<'a> {
    pub(crate) fn new(
        raw: &'a [i64],
        model: &'a IncrementModel,
        config: &'a CorrectionConfig,
    ) -> Self {
        let n = raw.len();
        let working = raw
            .iter()
            .map(|&v| (!config.is_missing_reading(v)).then_some(v))
            .collect();
        Self {
            raw,
            model,
            config,
            working,
            corrections: vec![None; n],
            claims: ClaimMap::new(n),
            details: vec![Vec::new(); n],
            notes: Vec::new(),
            stats: RepairStats::default(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.working.len()
    }

    /// Nearest resolved frame strictly before `frame_idx`.
    pub(crate) fn previous_resolved(&self, frame_idx: usize) -> Option<(usize, i64)> {
        (0..frame_idx)
            .rev()
            .find_map(|j| self.working[j].map(|v| (j, v)))
    }

    /// Set `frame_idx` to `value` under `correction`.
    ///
    /// A value below the previous resolved frame is raised to
    /// `prev + min(valid increments)` and the clamp is noted in the details.
    pub(crate) fn assign(&mut self, frame_idx: usize, value: i64, correction: Correction) {
        let mut value = value;
        if let Some((prev_idx, prev)) = self.previous_resolved(frame_idx) {
            if value < prev {
                let clamped = prev + self.model.min_valid_increment();
                tracing::debug!(
                    frame_idx,
                    value,
                    prev_idx,
                    prev,
                    clamped,
                    "correction clamped to keep the sequence monotonic",
                );
                self.details[frame_idx].push(format!(
                    "clamped {} to {} (previous frame {} is {})",
                    value, clamped, prev_idx, prev
                ));
                self.stats.n_clamped += 1;
                value = clamped;
            }
        }
        self.details[frame_idx].push(correction.details());
        self.working[frame_idx] = Some(value);
        self.corrections[frame_idx] = Some(correction);
    }

    /// Clear `frame_idx` so gap filling assigns it later.
    pub(crate) fn unresolve(&mut self, frame_idx: usize, placeholder: Correction) {
        self.details[frame_idx].push(placeholder.details());
        self.working[frame_idx] = None;
        self.corrections[frame_idx] = Some(placeholder);
    }

    pub(crate) fn n_unresolved(&self) -> usize {
        self.working.iter().filter(|v| v.is_none()).count()
    }

    pub(crate) fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(note = %message, "correction note");
        self.notes.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{counter_sequence, uniform_timestamps};
    use crate::types::{DeltaRepair, DeltaSource};

    fn model() -> IncrementModel {
        let clean = counter_sequence(100, 40, &[4, 5, 5]);
        let ts = uniform_timestamps(40, 30.0);
        IncrementModel::derive(&clean, &ts, &CorrectionConfig::default()).expect("model")
    }

    #[test]
    fn missing_readings_start_unresolved() {
        let m = model();
        let cfg = CorrectionConfig::default();
        let raw = [0, 104, 0, 113];
        let ws = RepairWorkspace::new(&raw, &m, &cfg);
        assert_eq!(ws.working, vec![None, Some(104), None, Some(113)]);
        assert_eq!(ws.n_unresolved(), 2);
        assert_eq!(ws.previous_resolved(3), Some((1, 104)));
        assert_eq!(ws.previous_resolved(1), None);
    }

    #[test]
    fn assign_clamps_below_previous_value() {
        let m = model();
        let cfg = CorrectionConfig::default();
        let raw = [100, 104, 90];
        let mut ws = RepairWorkspace::new(&raw, &m, &cfg);
        ws.assign(
            2,
            95,
            Correction::BadDiff(DeltaRepair::Replaced {
                delta: -9,
                source: DeltaSource::ExpectedIncrement,
            }),
        );
        assert_eq!(ws.working[2], Some(108));
        assert_eq!(ws.stats.n_clamped, 1);
        assert!(ws.details[2][0].starts_with("clamped 95 to 108"));
    }

    #[test]
    fn unresolve_keeps_placeholder() {
        let m = model();
        let cfg = CorrectionConfig::default();
        let raw = [100, 104, 109];
        let mut ws = RepairWorkspace::new(&raw, &m, &cfg);
        ws.unresolve(1, Correction::LeadingZero);
        assert_eq!(ws.working[1], None);
        assert_eq!(ws.corrections[1], Some(Correction::LeadingZero));
    }

    #[derive(Clone, Default)]
    struct CapturedLog(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("log buffer").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn notes_are_logged_as_warnings() {
        let m = model();
        let cfg = CorrectionConfig::default();
        let raw = [100, 104, 109];
        let mut ws = RepairWorkspace::new(&raw, &m, &cfg);

        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || ws.note("long extrapolation"));

        let text = String::from_utf8(log.0.lock().expect("log buffer").clone()).expect("utf8");
        assert!(text.contains("WARN"), "{text}");
        assert!(text.contains("long extrapolation"), "{text}");
        assert_eq!(ws.notes, vec!["long extrapolation".to_string()]);
    }
}
