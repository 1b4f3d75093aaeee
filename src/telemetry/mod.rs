//! Telemetry for scratch allocation.
//!
//! Structured logging through `tracing`, span helpers, and counters through the
//! `metrics` facade. The library only emits; installing subscribers and
//! recorders is left to the host application.

mod logging;
mod counters;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use counters::{record_alloc, record_alloc_failure, record_transfer};
pub use spans::{ScratchSpan, SpanExt};
