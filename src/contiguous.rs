// Copyright 2024-2026 Scratch-Core Contributors
// Licensed under the Apache License, Version 2.0

//! Packing several collections into one scratch allocation.
//!
//! Each collection is described by a [`CopyDescriptor`]: its byte size, its
//! alignment and a type-erased fill callback. A [`PackingPlan`] walks the
//! descriptors in order and places each one at the first offset at or after
//! the previous end that satisfies its own alignment. The destination is then
//! obtained with a single `alloc` call.
//!
//! Host-accessible destinations are filled in place. Device destinations are
//! assembled in one host staging allocation and shipped with a single
//! asynchronous transfer.

use std::any::{type_name, TypeId};
use std::ops::Range;
use std::ptr::NonNull;

use bytemuck::Pod;
use tracing::Span;

use crate::error::{Result, ScratchError};
use crate::memory::{MemoryKind, Scratchpad};
use crate::stream::{CopyEngine, Stream};
use crate::telemetry::{self, ScratchSpan, SpanExt};

/// Round `value` up to the next multiple of `alignment` (a power of two).
pub(crate) fn align_up(value: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());
    value
        .checked_add(alignment - 1)
        .map(|v| v & !(alignment - 1))
}

pub(crate) fn check_alignment(alignment: usize) -> Result<()> {
    if alignment.is_power_of_two() {
        Ok(())
    } else {
        Err(ScratchError::InvalidAlignment(alignment))
    }
}

type FillFn<'a> = Box<dyn Fn(&mut [u8]) + 'a>;

/// One collection to be packed.
pub struct CopyDescriptor<'a> {
    len: usize,
    size: usize,
    alignment: usize,
    type_id: TypeId,
    type_name: &'static str,
    fill: FillFn<'a>,
}

impl<'a> CopyDescriptor<'a> {
    /// Describe a slice of plain-old-data elements.
    pub fn from_slice<T: Pod>(src: &'a [T]) -> Self {
        Self {
            len: src.len(),
            size: std::mem::size_of_val(src),
            alignment: std::mem::align_of::<T>(),
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            fill: Box::new(move |dst: &mut [u8]| dst.copy_from_slice(bytemuck::cast_slice(src))),
        }
    }

    /// Describe `len` elements produced by `fill` directly into the
    /// destination sub-range.
    pub fn from_fn<T, F>(len: usize, fill: F) -> Result<Self>
    where
        T: Pod,
        F: Fn(&mut [T]) + 'a,
    {
        let size = len
            .checked_mul(std::mem::size_of::<T>())
            .ok_or(ScratchError::Overflow { what: "collection size" })?;
        Ok(Self {
            len,
            size,
            alignment: std::mem::align_of::<T>(),
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            fill: Box::new(move |dst: &mut [u8]| fill(bytemuck::cast_slice_mut(dst))),
        })
    }

    /// Raise the alignment of this collection's sub-range.
    pub fn with_alignment(mut self, alignment: usize) -> Result<Self> {
        check_alignment(alignment)?;
        self.alignment = self.alignment.max(alignment);
        Ok(self)
    }

    /// Element count.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte size of the collection.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl std::fmt::Debug for CopyDescriptor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyDescriptor")
            .field("len", &self.len)
            .field("size", &self.size)
            .field("alignment", &self.alignment)
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Offsets of each collection inside one packed allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackingPlan {
    offsets: Vec<usize>,
    sizes: Vec<usize>,
    total: usize,
    alignment: usize,
}

impl PackingPlan {
    /// Alignment of the allocation when there is nothing to pack.
    pub const DEFAULT_ALIGNMENT: usize = 1;

    /// Lay out `(size, alignment)` pairs in order.
    pub fn new<I>(layout: I) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        let iter = layout.into_iter();
        let (lower, _) = iter.size_hint();
        let mut offsets = Vec::with_capacity(lower);
        let mut sizes = Vec::with_capacity(lower);
        let mut cursor = 0usize;
        let mut alignment = Self::DEFAULT_ALIGNMENT;

        for (size, align) in iter {
            check_alignment(align)?;
            let offset =
                align_up(cursor, align).ok_or(ScratchError::Overflow { what: "packing cursor" })?;
            offsets.push(offset);
            sizes.push(size);
            alignment = alignment.max(align);
            // Empty collections take an aligned address but leave the cursor alone.
            if size > 0 {
                cursor = offset
                    .checked_add(size)
                    .ok_or(ScratchError::Overflow { what: "packing cursor" })?;
            }
        }

        Ok(Self {
            offsets,
            sizes,
            total: cursor,
            alignment,
        })
    }

    pub fn for_descriptors(descriptors: &[CopyDescriptor<'_>]) -> Result<Self> {
        Self::new(descriptors.iter().map(|d| (d.size, d.alignment)))
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn offset(&self, index: usize) -> Option<usize> {
        self.offsets.get(index).copied()
    }

    /// Byte range of collection `index`.
    pub fn range(&self, index: usize) -> Option<Range<usize>> {
        let start = self.offset(index)?;
        Some(start..start + self.sizes[index])
    }

    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.offsets
            .iter()
            .zip(&self.sizes)
            .map(|(&start, &size)| start..start + size)
    }

    /// Bytes spanned by the packed image, padding included.
    pub fn total_bytes(&self) -> usize {
        self.total
    }

    /// Largest alignment requested by any collection.
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    fn fill(&self, descriptors: &[CopyDescriptor<'_>], image: &mut [u8]) {
        // Empty slots have nothing to write and may sit past the end of the image.
        for (range, descriptor) in self.ranges().zip(descriptors).filter(|(r, _)| !r.is_empty()) {
            (descriptor.fill)(&mut image[range]);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    len: usize,
    type_id: TypeId,
    type_name: &'static str,
}

/// Result of a packing call: the destination base plus typed access to each
/// packed collection.
#[derive(Debug)]
pub struct ContiguousBlock {
    base: NonNull<u8>,
    kind: MemoryKind,
    plan: PackingPlan,
    slots: Vec<Slot>,
}

impl ContiguousBlock {
    fn new(base: NonNull<u8>, kind: MemoryKind, plan: PackingPlan, descriptors: &[CopyDescriptor<'_>]) -> Self {
        let slots = descriptors
            .iter()
            .map(|d| Slot {
                len: d.len,
                type_id: d.type_id,
                type_name: d.type_name,
            })
            .collect();
        Self {
            base,
            kind,
            plan,
            slots,
        }
    }

    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    pub fn plan(&self) -> &PackingPlan {
        &self.plan
    }

    pub fn total_bytes(&self) -> usize {
        self.plan.total_bytes()
    }

    /// Number of packed collections.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Element count of collection `index`.
    pub fn collection_len(&self, index: usize) -> Option<usize> {
        self.slots.get(index).map(|s| s.len)
    }

    pub(crate) fn pointer_unchecked<T>(&self, index: usize) -> NonNull<T> {
        let offset = self.plan.offsets[index];
        // Offsets of trailing empty slots can land past the allocation, so
        // the address is computed without claiming it is in bounds.
        NonNull::new(self.base.as_ptr().wrapping_add(offset))
            .unwrap_or(NonNull::dangling())
            .cast()
    }

    /// Typed pointer to collection `index`.
    pub fn get<T: 'static>(&self, index: usize) -> Result<NonNull<T>> {
        let slot = self.slots.get(index).ok_or(ScratchError::IndexOutOfRange {
            index,
            len: self.slots.len(),
        })?;
        if slot.type_id != TypeId::of::<T>() {
            return Err(ScratchError::TypeMismatch {
                index,
                expected: type_name::<T>(),
                actual: slot.type_name,
            });
        }
        Ok(self.pointer_unchecked(index))
    }

    /// Typed pointer to collection `index` for use by device work.
    pub fn device_get<T: 'static>(&self, index: usize) -> Result<NonNull<T>> {
        if !self.kind.is_device_accessible() {
            return Err(ScratchError::NotDeviceAccessible(self.kind));
        }
        self.get(index)
    }

    /// Host view of collection `index`.
    ///
    /// # Safety
    ///
    /// The backing allocation must still be live. For device-accessible
    /// unified memory, all work writing to it must have completed.
    pub unsafe fn slice<T: Pod>(&self, index: usize) -> Result<&[T]> {
        if !self.kind.is_host_accessible() {
            return Err(ScratchError::NotHostAccessible(self.kind));
        }
        let ptr = self.get::<T>(index)?;
        Ok(std::slice::from_raw_parts(ptr.as_ptr(), self.slots[index].len))
    }
}

/// Pack `descriptors` into one allocation of a host-accessible `kind`.
///
/// One `alloc` call, then one in-place copy per collection.
pub fn pack_host<S>(
    scratchpad: &mut S,
    kind: MemoryKind,
    descriptors: &[CopyDescriptor<'_>],
) -> Result<ContiguousBlock>
where
    S: Scratchpad + ?Sized,
{
    let span = ScratchSpan::pack(kind, descriptors.len());
    let _enter = span.enter();
    let result = fill_in_place(scratchpad, kind, descriptors);
    record_outcome(&span, &result);
    result
}

/// Pack `descriptors` into one device allocation.
///
/// The image is assembled in one host staging allocation and sent with a
/// single transfer on `stream`. The transfer is only enqueued: synchronize
/// `stream` before relying on the device contents. A transfer failure reported
/// at that point covers the whole block.
///
/// # Safety
///
/// The transfer writes into `scratchpad` after this call returns. The
/// scratchpad must not be reset or dropped until `stream` has been
/// synchronized on `engine`.
pub unsafe fn pack_device<S, E>(
    scratchpad: &mut S,
    engine: &E,
    stream: Stream,
    descriptors: &[CopyDescriptor<'_>],
) -> Result<ContiguousBlock>
where
    S: Scratchpad + ?Sized,
    E: CopyEngine + ?Sized,
{
    let span = ScratchSpan::pack(MemoryKind::Device, descriptors.len());
    let _enter = span.enter();
    let result = stage_and_transfer(scratchpad, engine, stream, descriptors);
    record_outcome(&span, &result);
    result
}

fn record_outcome(span: &Span, result: &Result<ContiguousBlock>) {
    if let Ok(block) = result {
        span.record("total_bytes", block.total_bytes());
    }
    span.record_result(result);
}

fn fill_in_place<S>(
    scratchpad: &mut S,
    kind: MemoryKind,
    descriptors: &[CopyDescriptor<'_>],
) -> Result<ContiguousBlock>
where
    S: Scratchpad + ?Sized,
{
    if !kind.is_host_accessible() {
        return Err(ScratchError::NotHostAccessible(kind));
    }
    let plan = PackingPlan::for_descriptors(descriptors)?;
    let base = scratchpad.alloc(kind, plan.total_bytes(), plan.alignment())?;

    // SAFETY: `base` is host-addressable and valid for `total_bytes` bytes;
    // the scratchpad hands out no overlapping live allocations.
    let image = unsafe { std::slice::from_raw_parts_mut(base.as_ptr(), plan.total_bytes()) };
    plan.fill(descriptors, image);

    tracing::debug!(
        %kind,
        collections = descriptors.len(),
        total_bytes = plan.total_bytes(),
        alignment = plan.alignment(),
        "packed collections in place"
    );
    Ok(ContiguousBlock::new(base, kind, plan, descriptors))
}

fn stage_and_transfer<S, E>(
    scratchpad: &mut S,
    engine: &E,
    stream: Stream,
    descriptors: &[CopyDescriptor<'_>],
) -> Result<ContiguousBlock>
where
    S: Scratchpad + ?Sized,
    E: CopyEngine + ?Sized,
{
    let plan = PackingPlan::for_descriptors(descriptors)?;
    let device = scratchpad.alloc(MemoryKind::Device, plan.total_bytes(), plan.alignment())?;
    let staging = scratchpad.alloc(MemoryKind::Host, plan.total_bytes(), plan.alignment())?;

    // SAFETY: `staging` is host memory valid for `total_bytes` bytes.
    let image = unsafe { std::slice::from_raw_parts_mut(staging.as_ptr(), plan.total_bytes()) };
    plan.fill(descriptors, image);

    // SAFETY: `device` was just allocated for `total_bytes` bytes; callers of
    // `pack_device` keep the scratchpad alive until `stream` is synchronized.
    unsafe { engine.copy_to_device_async(device, image, stream)? };
    telemetry::record_transfer(plan.total_bytes());

    tracing::debug!(
        %stream,
        collections = descriptors.len(),
        total_bytes = plan.total_bytes(),
        alignment = plan.alignment(),
        "staged collections and enqueued one device transfer"
    );
    Ok(ContiguousBlock::new(device, MemoryKind::Device, plan, descriptors))
}

/// Tuples of slices that can be packed in one call, yielding one typed
/// pointer per element of the tuple.
pub trait PackTuple<'a> {
    type Pointers;

    fn descriptors(&self) -> Vec<CopyDescriptor<'a>>;

    fn pointers(block: &ContiguousBlock) -> Self::Pointers;
}

macro_rules! impl_pack_tuple {
    ($($ty:ident : $idx:tt),+) => {
        impl<'a, $($ty: Pod),+> PackTuple<'a> for ($(&'a [$ty],)+) {
            type Pointers = ($(NonNull<$ty>,)+);

            fn descriptors(&self) -> Vec<CopyDescriptor<'a>> {
                vec![$(CopyDescriptor::from_slice(self.$idx)),+]
            }

            fn pointers(block: &ContiguousBlock) -> Self::Pointers {
                ($(block.pointer_unchecked::<$ty>($idx),)+)
            }
        }
    };
}

impl_pack_tuple!(A: 0);
impl_pack_tuple!(A: 0, B: 1);
impl_pack_tuple!(A: 0, B: 1, C: 2);
impl_pack_tuple!(A: 0, B: 1, C: 2, D: 3);
impl_pack_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4);
impl_pack_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

#[cfg(test)]
#[path = "contiguous_tests.rs"]
mod tests;
