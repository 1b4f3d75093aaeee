// Copyright 2024-2026 Scratch-Core Contributors
// Licensed under the Apache License, Version 2.0

//! Shapes and non-owning tensor views over scratch memory.
//!
//! Views are plain pointer + shape pairs. They do not keep the backing
//! allocation alive; validity ends when the scratchpad that produced the
//! pointer is reset or dropped.

use std::ptr::NonNull;

use crate::error::{Result, ScratchError};
use crate::memory::{MemoryKind, StorageAccess};

/// Dense tensor shape: an ordered list of extents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TensorShape {
    dims: Vec<usize>,
}

impl TensorShape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self { dims: dims.into() }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements. A zero-dimensional shape has volume 1.
    pub fn volume(&self) -> Result<usize> {
        self.dims.iter().try_fold(1usize, |acc, &d| {
            acc.checked_mul(d)
                .ok_or(ScratchError::Overflow { what: "tensor volume" })
        })
    }
}

impl From<Vec<usize>> for TensorShape {
    fn from(dims: Vec<usize>) -> Self {
        Self { dims }
    }
}

impl From<&[usize]> for TensorShape {
    fn from(dims: &[usize]) -> Self {
        Self { dims: dims.to_vec() }
    }
}

impl<const N: usize> From<[usize; N]> for TensorShape {
    fn from(dims: [usize; N]) -> Self {
        Self { dims: dims.to_vec() }
    }
}

/// Shapes of the items of a tensor list, in list order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TensorListShape {
    shapes: Vec<TensorShape>,
}

impl TensorListShape {
    pub fn new(shapes: Vec<TensorShape>) -> Self {
        Self { shapes }
    }

    pub fn num_samples(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn shape(&self, index: usize) -> Option<&TensorShape> {
        self.shapes.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TensorShape> {
        self.shapes.iter()
    }

    /// Total element count across all items.
    pub fn num_elements(&self) -> Result<usize> {
        self.shapes.iter().try_fold(0usize, |acc, s| {
            acc.checked_add(s.volume()?)
                .ok_or(ScratchError::Overflow { what: "tensor list volume" })
        })
    }

    /// Element offset of each item: the cumulative volume of the items
    /// before it.
    pub fn offsets(&self) -> Result<Vec<usize>> {
        let mut offsets = Vec::with_capacity(self.shapes.len());
        let mut cursor = 0usize;
        for shape in &self.shapes {
            offsets.push(cursor);
            cursor = cursor
                .checked_add(shape.volume()?)
                .ok_or(ScratchError::Overflow { what: "tensor list volume" })?;
        }
        Ok(offsets)
    }
}

impl From<Vec<TensorShape>> for TensorListShape {
    fn from(shapes: Vec<TensorShape>) -> Self {
        Self { shapes }
    }
}

impl From<&[TensorShape]> for TensorListShape {
    fn from(shapes: &[TensorShape]) -> Self {
        Self {
            shapes: shapes.to_vec(),
        }
    }
}

impl FromIterator<TensorShape> for TensorListShape {
    fn from_iter<I: IntoIterator<Item = TensorShape>>(iter: I) -> Self {
        Self {
            shapes: iter.into_iter().collect(),
        }
    }
}

/// Pointer + shape pair tagged with the memory kind it was allocated in.
#[derive(Debug)]
pub struct TensorView<T> {
    data: NonNull<T>,
    shape: TensorShape,
    kind: MemoryKind,
}

impl<T> TensorView<T> {
    pub fn new(data: NonNull<T>, shape: TensorShape, kind: MemoryKind) -> Self {
        Self { data, shape, kind }
    }

    pub fn data(&self) -> NonNull<T> {
        self.data
    }

    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    pub fn access(&self) -> StorageAccess {
        self.kind.access()
    }

    pub fn num_elements(&self) -> Result<usize> {
        self.shape.volume()
    }

    /// Data pointer for device work; fails for host-only kinds.
    pub fn device_data(&self) -> Result<NonNull<T>> {
        if !self.kind.is_device_accessible() {
            return Err(ScratchError::NotDeviceAccessible(self.kind));
        }
        Ok(self.data)
    }

    /// Host view of the elements.
    ///
    /// # Safety
    ///
    /// The backing allocation must still be live and every element must have
    /// been initialized.
    pub unsafe fn as_slice(&self) -> Result<&[T]> {
        if !self.kind.is_host_accessible() {
            return Err(ScratchError::NotHostAccessible(self.kind));
        }
        Ok(std::slice::from_raw_parts(self.data.as_ptr(), self.shape.volume()?))
    }

    /// Mutable host view of the elements.
    ///
    /// # Safety
    ///
    /// The backing allocation must still be live and not aliased elsewhere.
    pub unsafe fn as_mut_slice(&mut self) -> Result<&mut [T]> {
        if !self.kind.is_host_accessible() {
            return Err(ScratchError::NotHostAccessible(self.kind));
        }
        Ok(std::slice::from_raw_parts_mut(self.data.as_ptr(), self.shape.volume()?))
    }
}

impl<T> Clone for TensorView<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data,
            shape: self.shape.clone(),
            kind: self.kind,
        }
    }
}

/// One flat buffer shared by every item of a tensor list.
#[derive(Debug)]
pub struct TensorListView<T> {
    data: NonNull<T>,
    shape: TensorListShape,
    offsets: Vec<usize>,
    kind: MemoryKind,
}

impl<T> TensorListView<T> {
    pub fn new(data: NonNull<T>, shape: TensorListShape, kind: MemoryKind) -> Result<Self> {
        let offsets = shape.offsets()?;
        Ok(Self {
            data,
            shape,
            offsets,
            kind,
        })
    }

    pub fn data(&self) -> NonNull<T> {
        self.data
    }

    pub fn shape(&self) -> &TensorListShape {
        &self.shape
    }

    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    pub fn num_samples(&self) -> usize {
        self.shape.num_samples()
    }

    /// Element offset of item `index` within the flat buffer.
    pub fn offset(&self, index: usize) -> Option<usize> {
        self.offsets.get(index).copied()
    }

    /// Start of item `index`.
    ///
    /// `new` accepts any buffer, so the address is computed without assuming
    /// it lies inside one allocation.
    pub fn tensor_data(&self, index: usize) -> Option<NonNull<T>> {
        let offset = self.offset(index)?;
        NonNull::new(self.data.as_ptr().wrapping_add(offset))
    }

    /// View of item `index`.
    pub fn tensor_view(&self, index: usize) -> Option<TensorView<T>> {
        let data = self.tensor_data(index)?;
        let shape = self.shape.shape(index)?.clone();
        Some(TensorView::new(data, shape, self.kind))
    }
}
