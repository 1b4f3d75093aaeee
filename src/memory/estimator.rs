// Copyright 2024-2026 Scratch-Core Contributors
// Licensed under the Apache License, Version 2.0

//! Scratch requirement estimation.
//!
//! A kernel's setup pass records what it is going to ask for, per memory kind,
//! without allocating anything. Replaying the same requests in the same order
//! against [`ArenaScratchpad::from_requirements`] always fits.
//!
//! [`ArenaScratchpad::from_requirements`]: super::ArenaScratchpad::from_requirements

use super::MemoryKind;
use crate::contiguous::{align_up, check_alignment, PackingPlan};
use crate::error::{Result, ScratchError};
use crate::tensor::{TensorListShape, TensorShape};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchRequirements {
    sizes: [usize; MemoryKind::COUNT],
    max_alignment: usize,
}

impl Default for ScratchRequirements {
    fn default() -> Self {
        Self {
            sizes: [0; MemoryKind::COUNT],
            max_alignment: 1,
        }
    }
}

impl ScratchRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a raw request.
    pub fn add_bytes(&mut self, kind: MemoryKind, bytes: usize, alignment: usize) -> Result<&mut Self> {
        check_alignment(alignment)?;
        let slot = &mut self.sizes[kind.index()];
        *slot = align_up(*slot, alignment)
            .and_then(|start| start.checked_add(bytes))
            .ok_or(ScratchError::Overflow { what: "scratch requirements" })?;
        self.max_alignment = self.max_alignment.max(alignment);
        Ok(self)
    }

    /// Record `count` values of `T` at natural alignment.
    pub fn add<T>(&mut self, kind: MemoryKind, count: usize) -> Result<&mut Self> {
        let bytes = count
            .checked_mul(std::mem::size_of::<T>())
            .ok_or(ScratchError::Overflow { what: "scratch requirements" })?;
        self.add_bytes(kind, bytes, std::mem::align_of::<T>())
    }

    pub fn add_tensor<T>(&mut self, kind: MemoryKind, shape: &TensorShape) -> Result<&mut Self> {
        self.add::<T>(kind, shape.volume()?)
    }

    pub fn add_tensor_list<T>(&mut self, kind: MemoryKind, shape: &TensorListShape) -> Result<&mut Self> {
        self.add::<T>(kind, shape.num_elements()?)
    }

    /// Record a packing call into `kind`. Device packing also needs a host
    /// staging image of the same size, requested after the device block.
    pub fn add_packing(&mut self, kind: MemoryKind, plan: &PackingPlan) -> Result<&mut Self> {
        self.add_bytes(kind, plan.total_bytes(), plan.alignment())?;
        if kind == MemoryKind::Device {
            self.add_bytes(MemoryKind::Host, plan.total_bytes(), plan.alignment())?;
        }
        Ok(self)
    }

    /// Bytes needed in `kind`, alignment padding included.
    pub fn required(&self, kind: MemoryKind) -> usize {
        self.sizes[kind.index()]
    }

    /// Largest alignment recorded for any kind.
    pub fn max_alignment(&self) -> usize {
        self.max_alignment
    }

    /// Combine with requirements recorded elsewhere, as if appended.
    pub fn merge(&mut self, other: &ScratchRequirements) -> Result<&mut Self> {
        for kind in MemoryKind::ALL {
            self.add_bytes(kind, other.required(kind), other.max_alignment)?;
        }
        Ok(self)
    }
}
