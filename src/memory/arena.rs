// Copyright 2024-2026 Scratch-Core Contributors
// Licensed under the Apache License, Version 2.0

//! Bump arenas and the arena-backed scratchpad.
//!
//! Every memory kind gets one fixed-capacity arena with O(1) allocation and
//! bulk reset. Device and unified arenas are host-emulated: the bytes live in
//! ordinary host memory and are only ever written through a copy engine or,
//! for unified memory, directly.

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::estimator::ScratchRequirements;
use super::{MemoryKind, Scratchpad};
use crate::config::ScratchConfig;
use crate::contiguous::{align_up, check_alignment};
use crate::error::{Result, ScratchError};
use crate::telemetry;

/// Fixed-size region for bump allocation.
/// Thread-safe via atomic bump pointer.
pub struct Arena {
    base: NonNull<u8>,
    layout: Layout,
    offset: AtomicUsize,
    capacity: usize,
}

// SAFETY: Arena uses atomic operations for thread-safe allocation.
// The compare_exchange loop ensures unique allocations per thread.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    /// Create an arena of `capacity` bytes whose base is aligned to
    /// `max_alignment`.
    pub fn new(capacity: usize, max_alignment: usize) -> Result<Self> {
        check_alignment(max_alignment)?;
        let layout = Layout::from_size_align(capacity.max(1), max_alignment)
            .map_err(|_| ScratchError::Overflow { what: "arena layout" })?;
        // SAFETY: the layout has a non-zero size.
        let raw = unsafe { alloc::alloc(layout) };
        let Some(base) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };
        Ok(Self {
            base,
            layout,
            offset: AtomicUsize::new(0),
            capacity,
        })
    }

    /// Allocate `size` bytes at `align`, which must be a power of two no
    /// larger than [`Arena::max_alignment`].
    /// Returns None if the arena is exhausted or `align` cannot be honored.
    pub fn alloc(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        // Offsets are only aligned relative to a base aligned to max_alignment.
        if !align.is_power_of_two() || align > self.max_alignment() {
            return None;
        }
        loop {
            let current = self.offset.load(Ordering::Relaxed);
            let aligned = align_up(current, align)?;
            let new_offset = aligned.checked_add(size)?;
            if new_offset > self.capacity {
                return None;
            }
            if self
                .offset
                .compare_exchange_weak(current, new_offset, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                // SAFETY: aligned <= capacity, inside (or one past) the buffer.
                return Some(unsafe { NonNull::new_unchecked(self.base.as_ptr().add(aligned)) });
            }
        }
    }

    /// Reclaim everything. Exclusive access guarantees no allocation from this
    /// arena is being handed out concurrently; pointers obtained earlier must
    /// no longer be used.
    pub fn reset(&mut self) {
        *self.offset.get_mut() = 0;
    }

    /// Bytes consumed so far, padding included.
    pub fn used(&self) -> usize {
        self.offset.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.used())
    }

    /// Largest alignment this arena can honor.
    pub fn max_alignment(&self) -> usize {
        self.layout.align()
    }

    /// Whether `ptr` points into this arena.
    pub fn contains(&self, ptr: *const u8) -> bool {
        let start = self.base.as_ptr() as usize;
        let addr = ptr as usize;
        addr >= start && addr <= start + self.capacity
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: `base` was allocated in `new` with exactly this layout.
        unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) };
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("used", &self.used())
            .field("capacity", &self.capacity)
            .field("max_alignment", &self.max_alignment())
            .finish()
    }
}

/// Per-kind allocation counters kept by [`ArenaScratchpad`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScratchpadStats {
    alloc_calls: [usize; MemoryKind::COUNT],
    bytes_requested: [usize; MemoryKind::COUNT],
    failures: [usize; MemoryKind::COUNT],
}

impl ScratchpadStats {
    pub fn alloc_calls(&self, kind: MemoryKind) -> usize {
        self.alloc_calls[kind.index()]
    }

    pub fn bytes_requested(&self, kind: MemoryKind) -> usize {
        self.bytes_requested[kind.index()]
    }

    pub fn failures(&self, kind: MemoryKind) -> usize {
        self.failures[kind.index()]
    }

    pub fn total_alloc_calls(&self) -> usize {
        self.alloc_calls.iter().sum()
    }
}

/// Scratchpad with one bump arena per memory kind.
///
/// Reusable across invocations: [`ArenaScratchpad::reset`] reclaims every
/// arena at once.
#[derive(Debug)]
pub struct ArenaScratchpad {
    arenas: [Arena; MemoryKind::COUNT],
    stats: ScratchpadStats,
}

impl ArenaScratchpad {
    pub fn new(config: &ScratchConfig) -> Result<Self> {
        Self::with_capacities(config.capacities(), config.max_alignment)
    }

    /// Capacities are indexed by [`MemoryKind::index`].
    pub fn with_capacities(capacities: [usize; MemoryKind::COUNT], max_alignment: usize) -> Result<Self> {
        let [host, pinned, device, unified] = capacities;
        Ok(Self {
            arenas: [
                Arena::new(host, max_alignment)?,
                Arena::new(pinned, max_alignment)?,
                Arena::new(device, max_alignment)?,
                Arena::new(unified, max_alignment)?,
            ],
            stats: ScratchpadStats::default(),
        })
    }

    /// Arenas sized to exactly what `requirements` recorded.
    pub fn from_requirements(requirements: &ScratchRequirements) -> Result<Self> {
        let capacities = MemoryKind::ALL.map(|kind| requirements.required(kind));
        Self::with_capacities(capacities, requirements.max_alignment())
    }

    pub fn arena(&self, kind: MemoryKind) -> &Arena {
        &self.arenas[kind.index()]
    }

    pub fn used(&self, kind: MemoryKind) -> usize {
        self.arena(kind).used()
    }

    pub fn capacity(&self, kind: MemoryKind) -> usize {
        self.arena(kind).capacity()
    }

    pub fn stats(&self) -> &ScratchpadStats {
        &self.stats
    }

    /// Reclaim all arenas. Pointers handed out before the reset dangle.
    pub fn reset(&mut self) {
        for arena in &mut self.arenas {
            arena.reset();
        }
        tracing::trace!("scratchpad reset");
    }
}

impl Scratchpad for ArenaScratchpad {
    fn alloc(&mut self, kind: MemoryKind, bytes: usize, alignment: usize) -> Result<NonNull<u8>> {
        check_alignment(alignment)?;
        let i = kind.index();
        self.stats.alloc_calls[i] += 1;
        self.stats.bytes_requested[i] = self.stats.bytes_requested[i].saturating_add(bytes);

        let arena = &self.arenas[i];
        if alignment > arena.max_alignment() {
            self.stats.failures[i] += 1;
            telemetry::record_alloc_failure(kind);
            return Err(ScratchError::AlignmentUnsupported {
                kind,
                alignment,
                max: arena.max_alignment(),
            });
        }

        match arena.alloc(bytes, alignment) {
            Some(ptr) => {
                telemetry::record_alloc(kind, bytes);
                tracing::trace!(%kind, bytes, alignment, used = arena.used(), "scratch alloc");
                Ok(ptr)
            }
            None => {
                let available = arena.available();
                self.stats.failures[i] += 1;
                telemetry::record_alloc_failure(kind);
                tracing::warn!(%kind, bytes, alignment, available, "scratch arena exhausted");
                Err(ScratchError::AllocationExhausted {
                    kind,
                    requested: bytes,
                    available,
                })
            }
        }
    }
}
