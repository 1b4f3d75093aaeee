// Copyright 2024-2026 Scratch-Core Contributors
// Licensed under the Apache License, Version 2.0

//! Per-invocation kernel context.

use std::fmt;

use crate::memory::Scratchpad;
use crate::stream::Stream;

/// CPU-side execution parameters. Currently empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuContext;

/// GPU-side execution parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpuContext {
    /// Stream device work is ordered on.
    pub stream: Stream,
}

/// Everything a kernel receives for one invocation.
///
/// Owns nothing: the scratchpad is borrowed for the duration of the call and
/// the stream belongs to the caller.
pub struct KernelContext<'a> {
    pub cpu: CpuContext,
    pub gpu: GpuContext,
    /// Caller-provided allocator for temporary data.
    pub scratchpad: &'a mut dyn Scratchpad,
}

impl<'a> KernelContext<'a> {
    pub fn new(scratchpad: &'a mut dyn Scratchpad) -> Self {
        Self {
            cpu: CpuContext,
            gpu: GpuContext::default(),
            scratchpad,
        }
    }

    pub fn with_stream(mut self, stream: Stream) -> Self {
        self.gpu.stream = stream;
        self
    }

    pub fn stream(&self) -> Stream {
        self.gpu.stream
    }
}

impl fmt::Debug for KernelContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelContext")
            .field("cpu", &self.cpu)
            .field("gpu", &self.gpu)
            .finish_non_exhaustive()
    }
}
