// Copyright 2024-2026 Scratch-Core Contributors
// Licensed under the Apache License, Version 2.0

//! Error types for scratch allocation, transfer and packing.
//!
//! Synchronous failures (allocation, size arithmetic) abort the operation
//! before any copy is issued. Asynchronous transfer failures only surface when
//! the stream they were enqueued on is synchronized.

use thiserror::Error;

use crate::memory::MemoryKind;
use crate::stream::Stream;

/// Errors returned by scratchpads, copy engines and the packing helpers.
#[derive(Debug, Error)]
pub enum ScratchError {
    #[error("{kind} scratch memory exhausted: requested {requested} bytes, available {available} bytes")]
    AllocationExhausted {
        kind: MemoryKind,
        requested: usize,
        available: usize,
    },

    #[error("alignment {alignment} not supported by {kind} memory (max {max})")]
    AlignmentUnsupported {
        kind: MemoryKind,
        alignment: usize,
        max: usize,
    },

    #[error("alignment must be a non-zero power of two, got {0}")]
    InvalidAlignment(usize),

    #[error("size overflow while computing {what}")]
    Overflow { what: &'static str },

    #[error("asynchronous transfer of {bytes} bytes on {stream} failed: {reason}")]
    AsyncTransferFailure {
        stream: Stream,
        bytes: usize,
        reason: String,
    },

    #[error("{0} memory is not host-accessible")]
    NotHostAccessible(MemoryKind),

    #[error("{0} memory is not device-accessible")]
    NotDeviceAccessible(MemoryKind),

    #[error("collection {index} holds `{actual}`, not `{expected}`")]
    TypeMismatch {
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("collection index {index} out of range ({len} collections)")]
    IndexOutOfRange { index: usize, len: usize },
}

impl ScratchError {
    /// Returns true if retrying with a smaller request or a different memory
    /// kind could succeed.
    pub fn is_capacity_error(&self) -> bool {
        matches!(
            self,
            Self::AllocationExhausted { .. } | Self::AlignmentUnsupported { .. }
        )
    }

    /// Returns true if this error was reported by a stream synchronization
    /// rather than by the call that enqueued the work.
    pub fn is_async(&self) -> bool {
        matches!(self, Self::AsyncTransferFailure { .. })
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = ScratchError> = std::result::Result<T, E>;
