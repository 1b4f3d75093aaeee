// Copyright 2024-2026 Scratch-Core Contributors
// Licensed under the Apache License, Version 2.0

//! Recording scratchpad for tests and CPU-only runs.

use std::ptr::NonNull;

use super::{ArenaScratchpad, MemoryKind, Scratchpad};
use crate::error::{Result, ScratchError};

/// One `alloc` call as seen by [`MockScratchpad`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocRecord {
    pub kind: MemoryKind,
    pub bytes: usize,
    pub alignment: usize,
}

/// Scratchpad that records every request and can be told to fail requests
/// above a byte threshold. Successful requests are served by an
/// [`ArenaScratchpad`], so the memory is real and readable from the host.
#[derive(Debug)]
pub struct MockScratchpad {
    inner: ArenaScratchpad,
    records: Vec<AllocRecord>,
    fail_above: Option<usize>,
}

impl MockScratchpad {
    /// Every kind gets `capacity` bytes with a 4 KiB base alignment.
    pub fn new(capacity: usize) -> Self {
        Self::with_arena(
            ArenaScratchpad::with_capacities([capacity; MemoryKind::COUNT], 4096)
                .expect("4096 is a power of two"),
        )
    }

    pub fn with_arena(inner: ArenaScratchpad) -> Self {
        Self {
            inner,
            records: Vec::new(),
            fail_above: None,
        }
    }

    /// Requests larger than `bytes` fail with `AllocationExhausted`.
    pub fn fail_above(mut self, bytes: usize) -> Self {
        self.fail_above = Some(bytes);
        self
    }

    /// Every request, in call order, including failed ones.
    pub fn records(&self) -> &[AllocRecord] {
        &self.records
    }

    pub fn calls(&self) -> usize {
        self.records.len()
    }

    pub fn calls_for(&self, kind: MemoryKind) -> usize {
        self.records.iter().filter(|r| r.kind == kind).count()
    }

    pub fn arena(&self) -> &ArenaScratchpad {
        &self.inner
    }

    pub fn reset(&mut self) {
        self.inner.reset();
        self.records.clear();
    }
}

impl Scratchpad for MockScratchpad {
    fn alloc(&mut self, kind: MemoryKind, bytes: usize, alignment: usize) -> Result<NonNull<u8>> {
        self.records.push(AllocRecord {
            kind,
            bytes,
            alignment,
        });
        if let Some(limit) = self.fail_above {
            if bytes > limit {
                return Err(ScratchError::AllocationExhausted {
                    kind,
                    requested: bytes,
                    available: limit,
                });
            }
        }
        self.inner.alloc(kind, bytes, alignment)
    }
}
