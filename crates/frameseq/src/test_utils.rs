//! Shared builders for synthetic recordings used by unit tests.

/// Clean counter of `n` frames starting at `start`, advancing by `pattern`
/// cyclically (frame `i` gets delta `pattern[(i - 1) % len]`).
pub(crate) fn counter_sequence(start: i64, n: usize, pattern: &[i64]) -> Vec<i64> {
    let mut out = Vec::with_capacity(n);
    let mut v = start;
    for i in 0..n {
        if i > 0 {
            v += pattern[(i - 1) % pattern.len()];
        }
        out.push(v);
    }
    out
}

/// `n` evenly spaced timestamps at `rate_hz`, starting at an arbitrary epoch.
pub(crate) fn uniform_timestamps(n: usize, rate_hz: f64) -> Vec<f64> {
    (0..n).map(|i| 1_000.0 + i as f64 / rate_hz).collect()
}

/// Overwrite `raw[dst..dst + len]` with a copy of `raw[src..src + len]`,
/// the way a stuck OCR readback repeats an earlier block.
pub(crate) fn repeat_block(raw: &mut [i64], src: usize, dst: usize, len: usize) {
    raw.copy_within(src..src + len, dst);
}
