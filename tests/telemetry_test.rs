//! Telemetry tests: log configuration, spans and counters.

use std::path::PathBuf;

use scratch_core::memory::{ArenaScratchpad, MemoryKind, ScratchpadExt};
use scratch_core::telemetry::{
    init_logging, record_alloc, record_alloc_failure, record_transfer, LogConfig, LogError,
    LogFormat, ScratchSpan, SpanExt,
};
use scratch_core::{CopyDescriptor, ScratchError};
use tracing::Span;

// =============================================================================
// LogConfig Tests
// =============================================================================

#[test]
fn log_config_custom_fields() {
    let config = LogConfig {
        format: LogFormat::Pretty,
        level: "scratch_core=debug".to_string(),
        output_path: Some(PathBuf::from("/tmp/scratch.log")),
    };
    assert_eq!(config.format, LogFormat::Pretty);
    assert_eq!(config.output_path.as_deref(), Some(std::path::Path::new("/tmp/scratch.log")));
}

#[test]
fn log_format_default_is_json() {
    assert_eq!(LogFormat::default(), LogFormat::Json);
}

// =============================================================================
// Span Tests
// =============================================================================

#[test]
fn span_records_without_subscriber() {
    let span = ScratchSpan::pack(MemoryKind::Device, 3);
    span.record_result::<(), ScratchError>(&Ok(()));
    span.record_result::<(), ScratchError>(&Err(ScratchError::InvalidAlignment(3)));
}

#[test]
fn disabled_span_accepts_results() {
    let span = Span::none();
    span.record_result::<u32, String>(&Err("boom".to_string()));
}

// =============================================================================
// Counter Tests
// =============================================================================

#[test]
fn counters_are_noops_without_recorder() {
    record_alloc(MemoryKind::Host, 128);
    record_alloc_failure(MemoryKind::Pinned);
    record_transfer(4096);
}

// =============================================================================
// Subscriber installation (global, so kept in one test)
// =============================================================================

#[test]
fn json_file_logging_captures_packing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scratch.log");
    let config = LogConfig {
        format: LogFormat::Json,
        level: "scratch_core=trace".to_string(),
        output_path: Some(path.clone()),
    };
    init_logging(&config).unwrap();

    let ints = [1i32, 2];
    let mut pad = ArenaScratchpad::with_capacities([256; 4], 64).unwrap();
    pad.pack(MemoryKind::Host, &[CopyDescriptor::from_slice(&ints)]).unwrap();

    let logged = std::fs::read_to_string(&path).unwrap();
    assert!(logged.contains("packed collections in place"));
    assert!(logged.contains("scratch_pack"));

    assert!(matches!(init_logging(&config), Err(LogError::AlreadyInitialized)));
}
