// Copyright 2024-2026 Scratch-Core Contributors
// Licensed under the Apache License, Version 2.0

//! The scratchpad capability and everything built on top of it.
//!
//! A backing allocator only implements [`Scratchpad::alloc`]. Typed buffers,
//! tensors, tensor lists, single-collection transfers and contiguous packing
//! all come from [`ScratchpadExt`], which is implemented for every
//! scratchpad, including `dyn Scratchpad`.
//!
//! `alloc` takes `&mut self`: one scratchpad serves one invocation at a time,
//! and sharing it across threads requires the caller to serialize access.

use std::ptr::NonNull;

use bytemuck::Pod;

use super::{MemoryKind, StorageAccess};
use crate::contiguous::{self, ContiguousBlock, CopyDescriptor, PackTuple};
use crate::error::{Result, ScratchError};
use crate::stream::{CopyEngine, Stream};
use crate::telemetry;
use crate::tensor::{TensorListShape, TensorListView, TensorShape, TensorView};

/// Interface for kernels to obtain short-lived working memory.
pub trait Scratchpad {
    /// Allocate `bytes` bytes of `kind` memory aligned to `alignment`.
    ///
    /// `alignment` must be a power of two. The memory is uninitialized.
    fn alloc(&mut self, kind: MemoryKind, bytes: usize, alignment: usize) -> Result<NonNull<u8>>;
}

impl<S: Scratchpad + ?Sized> Scratchpad for &mut S {
    fn alloc(&mut self, kind: MemoryKind, bytes: usize, alignment: usize) -> Result<NonNull<u8>> {
        (**self).alloc(kind, bytes, alignment)
    }
}

impl<S: Scratchpad + ?Sized> Scratchpad for Box<S> {
    fn alloc(&mut self, kind: MemoryKind, bytes: usize, alignment: usize) -> Result<NonNull<u8>> {
        (**self).alloc(kind, bytes, alignment)
    }
}

/// Operations derived from [`Scratchpad::alloc`].
pub trait ScratchpadExt: Scratchpad {
    /// Storage for `count` values of `T`, at `T`'s natural alignment.
    fn allocate<T>(&mut self, kind: MemoryKind, count: usize) -> Result<NonNull<T>> {
        self.allocate_aligned::<T>(kind, count, std::mem::align_of::<T>())
    }

    /// Storage for `count` values of `T` at an explicit alignment.
    fn allocate_aligned<T>(
        &mut self,
        kind: MemoryKind,
        count: usize,
        alignment: usize,
    ) -> Result<NonNull<T>> {
        let bytes = count
            .checked_mul(std::mem::size_of::<T>())
            .ok_or(ScratchError::Overflow { what: "typed allocation size" })?;
        Ok(self.alloc(kind, bytes, alignment)?.cast())
    }

    /// Uninitialized tensor of `shape`.
    fn alloc_tensor<T>(&mut self, kind: MemoryKind, shape: impl Into<TensorShape>) -> Result<TensorView<T>> {
        let shape = shape.into();
        let data = self.allocate::<T>(kind, shape.volume()?)?;
        Ok(TensorView::new(data, shape, kind))
    }

    /// Uninitialized tensor list; one allocation backs every item.
    fn alloc_tensor_list<T>(
        &mut self,
        kind: MemoryKind,
        shape: impl Into<TensorListShape>,
    ) -> Result<TensorListView<T>> {
        let shape = shape.into();
        let data = self.allocate::<T>(kind, shape.num_elements()?)?;
        TensorListView::new(data, shape, kind)
    }

    /// Copy `src` into freshly allocated memory of a host-accessible `kind`.
    /// The copy is complete when this returns.
    fn copy_to<T: Pod>(&mut self, kind: MemoryKind, src: &[T]) -> Result<NonNull<T>> {
        if !kind.is_host_accessible() {
            return Err(ScratchError::NotHostAccessible(kind));
        }
        let dst = self.allocate::<T>(kind, src.len())?;
        // SAFETY: `dst` is host-addressable, freshly allocated for `src.len()`
        // values and cannot overlap a borrowed slice.
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), src.len()) };
        tracing::trace!(%kind, bytes = std::mem::size_of_val(src), "copied collection");
        Ok(dst)
    }

    fn to_host<T: Pod>(&mut self, src: &[T]) -> Result<NonNull<T>> {
        self.copy_to(MemoryKind::Host, src)
    }

    fn to_pinned<T: Pod>(&mut self, src: &[T]) -> Result<NonNull<T>> {
        self.copy_to(MemoryKind::Pinned, src)
    }

    fn to_unified<T: Pod>(&mut self, src: &[T]) -> Result<NonNull<T>> {
        self.copy_to(MemoryKind::Unified, src)
    }

    /// Copy `src` into device memory, ordered on `stream`.
    ///
    /// The transfer is enqueued, not completed: synchronize `stream` before
    /// depending on the result from the host.
    ///
    /// # Safety
    ///
    /// The transfer writes into this scratchpad after the call returns. It
    /// must not be reset or dropped until `stream` has been synchronized on
    /// `engine`.
    unsafe fn to_device<T, E>(&mut self, engine: &E, stream: Stream, src: &[T]) -> Result<NonNull<T>>
    where
        T: Pod,
        E: CopyEngine + ?Sized,
    {
        let dst = self.allocate::<T>(MemoryKind::Device, src.len())?;
        let bytes: &[u8] = bytemuck::cast_slice(src);
        // SAFETY: `dst` was allocated for exactly `bytes.len()` bytes of device
        // memory; the caller keeps it alive until `stream` is synchronized.
        engine.copy_to_device_async(dst.cast(), bytes, stream)?;
        telemetry::record_transfer(bytes.len());
        Ok(dst)
    }

    /// Pack runtime descriptors into one allocation of `kind`.
    ///
    /// Host-accessible kinds are filled in place; `Device` requires an engine
    /// and goes through [`ScratchpadExt::pack_device`].
    fn pack(&mut self, kind: MemoryKind, descriptors: &[CopyDescriptor<'_>]) -> Result<ContiguousBlock> {
        contiguous::pack_host(self, kind, descriptors)
    }

    /// Pack runtime descriptors into one device allocation with a single
    /// transfer on `stream`.
    ///
    /// # Safety
    ///
    /// Same contract as [`contiguous::pack_device`]: keep this scratchpad
    /// alive and unreset until `stream` has been synchronized.
    unsafe fn pack_device<E>(
        &mut self,
        engine: &E,
        stream: Stream,
        descriptors: &[CopyDescriptor<'_>],
    ) -> Result<ContiguousBlock>
    where
        E: CopyEngine + ?Sized,
    {
        contiguous::pack_device(self, engine, stream, descriptors)
    }

    /// Pack a tuple of slices into one host allocation, returning one typed
    /// pointer per slice.
    fn to_contiguous_host<'a, P>(&mut self, collections: P) -> Result<P::Pointers>
    where
        P: PackTuple<'a>,
    {
        let block = contiguous::pack_host(self, MemoryKind::Host, &collections.descriptors())?;
        Ok(P::pointers(&block))
    }

    /// Pack a tuple of slices into one device allocation with a single
    /// transfer on `stream`.
    ///
    /// # Safety
    ///
    /// Same contract as [`ScratchpadExt::pack_device`].
    unsafe fn to_contiguous_device<'a, P, E>(
        &mut self,
        engine: &E,
        stream: Stream,
        collections: P,
    ) -> Result<P::Pointers>
    where
        P: PackTuple<'a>,
        E: CopyEngine + ?Sized,
    {
        let block = contiguous::pack_device(self, engine, stream, &collections.descriptors())?;
        Ok(P::pointers(&block))
    }

    /// Pack a tuple of slices into `kind`, choosing the copy path from the
    /// kind's access: host-accessible kinds are filled in place and leave
    /// `stream` untouched, `Device` is staged and sent with one transfer.
    ///
    /// # Safety
    ///
    /// For `Device` the contract of [`ScratchpadExt::pack_device`] applies.
    unsafe fn to_contiguous<'a, P, E>(
        &mut self,
        kind: MemoryKind,
        engine: &E,
        stream: Stream,
        collections: P,
    ) -> Result<P::Pointers>
    where
        P: PackTuple<'a>,
        E: CopyEngine + ?Sized,
    {
        let descriptors = collections.descriptors();
        let block = match kind.access() {
            StorageAccess::Host | StorageAccess::Both => contiguous::pack_host(self, kind, &descriptors)?,
            StorageAccess::Device => contiguous::pack_device(self, engine, stream, &descriptors)?,
        };
        Ok(P::pointers(&block))
    }
}

impl<S: Scratchpad + ?Sized> ScratchpadExt for S {}

#[cfg(test)]
#[path = "scratchpad_tests.rs"]
mod tests;
