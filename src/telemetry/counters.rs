//! Counters published through the `metrics` facade.
//!
//! Nothing is exported unless the host application installs a recorder.

use metrics::counter;

use crate::memory::MemoryKind;

pub fn record_alloc(kind: MemoryKind, bytes: usize) {
    counter!("scratch_alloc_calls_total", "kind" => kind.as_str()).increment(1);
    counter!("scratch_alloc_bytes_total", "kind" => kind.as_str()).increment(bytes as u64);
}

pub fn record_alloc_failure(kind: MemoryKind) {
    counter!("scratch_alloc_failures_total", "kind" => kind.as_str()).increment(1);
}

pub fn record_transfer(bytes: usize) {
    counter!("scratch_transfer_calls_total").increment(1);
    counter!("scratch_transfer_bytes_total").increment(bytes as u64);
}
