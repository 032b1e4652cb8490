//! Shared helpers for the strand benchmarks.

use std::sync::atomic::{AtomicU64, Ordering};

/// Channel name unique to this process and call site, so parallel bench
/// runs never collide on a segment file.
pub fn bench_channel_name(label: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("strand_bench_{label}_{}_{n}", std::process::id())
}

/// Deterministic payload of `len` bytes.
pub fn make_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
