//! Span helpers for scratch operations.

use tracing::{info_span, Span};

use crate::memory::MemoryKind;

/// Extension trait for recording outcomes into spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for packing spans.
pub struct ScratchSpan;

impl ScratchSpan {
    /// Span around one packing call.
    ///
    /// `status`, `error.message` and `total_bytes` start empty and are filled
    /// in once the call completes.
    pub fn pack(kind: MemoryKind, collections: usize) -> Span {
        info_span!(
            "scratch_pack",
            kind = %kind,
            collections,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            total_bytes = tracing::field::Empty,
        )
    }
}
