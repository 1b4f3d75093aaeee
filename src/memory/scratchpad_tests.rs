//! Tests for the derived scratchpad operations.

use super::*;
use crate::memory::{ArenaScratchpad, MockScratchpad};
use crate::stream::EmulatedCopyEngine;
use crate::tensor::TensorShape;

fn scratch() -> ArenaScratchpad {
    ArenaScratchpad::with_capacities([4096; MemoryKind::COUNT], 256).unwrap()
}

#[test]
fn typed_allocation_uses_natural_alignment() {
    let mut pad = MockScratchpad::new(1024);
    pad.alloc(MemoryKind::Host, 1, 1).unwrap();
    let p = pad.allocate::<f64>(MemoryKind::Host, 4).unwrap();
    assert_eq!(p.as_ptr() as usize % std::mem::align_of::<f64>(), 0);
    let record = pad.records()[1];
    assert_eq!(record.bytes, 32);
    assert_eq!(record.alignment, std::mem::align_of::<f64>());
}

#[test]
fn explicit_alignment_is_honored() {
    let mut pad = scratch();
    pad.alloc(MemoryKind::Pinned, 3, 1).unwrap();
    let p = pad.allocate_aligned::<u8>(MemoryKind::Pinned, 10, 128).unwrap();
    assert_eq!(p.as_ptr() as usize % 128, 0);
}

#[test]
fn typed_allocation_size_overflow() {
    let mut pad = MockScratchpad::new(64);
    let err = pad.allocate::<u64>(MemoryKind::Host, usize::MAX).unwrap_err();
    assert!(matches!(err, ScratchError::Overflow { .. }));
    assert_eq!(pad.calls(), 0);
}

#[test]
fn tensor_allocation_covers_volume() {
    let mut pad = MockScratchpad::new(1024);
    let mut view = pad.alloc_tensor::<f32>(MemoryKind::Unified, [2, 3, 4]).unwrap();
    assert_eq!(pad.records()[0].bytes, 24 * 4);
    assert_eq!(view.num_elements().unwrap(), 24);

    let values = unsafe { view.as_mut_slice() }.unwrap();
    values.fill(1.0);
    assert_eq!(unsafe { view.as_slice() }.unwrap().iter().sum::<f32>(), 24.0);
}

#[test]
fn device_tensor_is_not_host_viewable() {
    let mut pad = scratch();
    let view = pad.alloc_tensor::<u32>(MemoryKind::Device, vec![8]).unwrap();
    assert_eq!(view.access(), StorageAccess::Device);
    assert!(matches!(
        unsafe { view.as_slice() },
        Err(ScratchError::NotHostAccessible(MemoryKind::Device))
    ));
    assert_eq!(view.device_data().unwrap(), view.data());
}

#[test]
fn pinned_tensor_has_no_device_pointer() {
    let mut pad = scratch();
    let view = pad.alloc_tensor::<u8>(MemoryKind::Pinned, [4]).unwrap();
    assert!(matches!(
        view.device_data(),
        Err(ScratchError::NotDeviceAccessible(MemoryKind::Pinned))
    ));
}

#[test]
fn tensor_list_is_one_allocation() {
    let mut pad = MockScratchpad::new(1024);
    let shapes = vec![TensorShape::from([2, 2]), TensorShape::from([3]), TensorShape::from([1, 5])];
    let list = pad.alloc_tensor_list::<u16>(MemoryKind::Host, shapes).unwrap();

    assert_eq!(pad.calls(), 1);
    assert_eq!(pad.records()[0].bytes, 12 * 2);
    assert_eq!(list.num_samples(), 3);
    assert_eq!(list.offset(1), Some(4));
    assert_eq!(list.offset(2), Some(7));

    let base = list.data().as_ptr() as usize;
    let third = list.tensor_data(2).unwrap().as_ptr() as usize;
    assert_eq!(third - base, 7 * 2);
    assert_eq!(list.tensor_view(2).unwrap().shape().dims(), &[1, 5]);
    assert!(list.tensor_view(3).is_none());
}

#[test]
fn host_kind_copies_read_back() {
    let data = [3i64, -1, 4, -1, 5];
    let mut pad = scratch();
    for p in [pad.to_host(&data), pad.to_pinned(&data), pad.to_unified(&data)] {
        let p = p.unwrap();
        assert_eq!(unsafe { std::slice::from_raw_parts(p.as_ptr(), data.len()) }, &data);
    }
    assert_eq!(pad.stats().alloc_calls(MemoryKind::Host), 1);
    assert_eq!(pad.stats().alloc_calls(MemoryKind::Pinned), 1);
    assert_eq!(pad.stats().alloc_calls(MemoryKind::Unified), 1);
}

#[test]
fn copy_to_device_kind_needs_engine() {
    let mut pad = MockScratchpad::new(64);
    let err = pad.copy_to(MemoryKind::Device, &[1u8, 2]).unwrap_err();
    assert!(matches!(err, ScratchError::NotHostAccessible(MemoryKind::Device)));
    assert_eq!(pad.calls(), 0);
}

#[test]
fn empty_copy_still_allocates() {
    let mut pad = MockScratchpad::new(64);
    let empty: [u32; 0] = [];
    pad.to_host(&empty).unwrap();
    assert_eq!(pad.records()[0].bytes, 0);
}

#[test]
fn device_copy_lands_after_synchronize() {
    let data = [0xdead_beefu32, 7, 42];
    let mut pad = scratch();
    let engine = EmulatedCopyEngine::new();
    let stream = Stream::from_raw(3);

    let p = unsafe { pad.to_device(&engine, stream, &data) }.unwrap();
    assert_eq!(engine.transfer_calls(), 1);
    assert_eq!(engine.pending(stream), 1);

    engine.synchronize(stream).unwrap();
    assert_eq!(engine.pending(stream), 0);
    // Device arena is host-emulated.
    assert_eq!(unsafe { std::slice::from_raw_parts(p.as_ptr(), data.len()) }, &data);
}

#[test]
fn device_exhaustion_enqueues_nothing() {
    let mut pad = MockScratchpad::new(8);
    let engine = EmulatedCopyEngine::new();
    let err = unsafe { pad.to_device(&engine, Stream::DEFAULT, &[0u64; 2]) }.unwrap_err();
    assert!(err.is_capacity_error());
    assert_eq!(engine.transfer_calls(), 0);
}

#[test]
fn works_through_trait_object() {
    let mut arena = scratch();
    {
        let pad: &mut dyn Scratchpad = &mut arena;
        let (a, b) = pad.to_contiguous_host((&[1u8, 2, 3][..], &[9u32][..])).unwrap();
        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 4);
        assert_eq!(unsafe { *b.as_ptr() }, 9);
    }
    assert_eq!(arena.stats().total_alloc_calls(), 1);
}

#[test]
fn boxed_scratchpad_forwards() {
    let mut pad: Box<dyn Scratchpad> = Box::new(scratch());
    let p = pad.to_host(&[1u16, 2]).unwrap();
    assert_eq!(unsafe { *p.as_ptr().add(1) }, 2);
}

#[test]
fn tuple_packing_to_device() {
    let mut pad = MockScratchpad::new(1024);
    let engine = EmulatedCopyEngine::new();
    let stream = Stream::from_raw(4);
    let ids = [10u32, 20];
    let weights = [0.5f64];

    let (pi, pw) = unsafe { pad.to_contiguous_device(&engine, stream, (&ids[..], &weights[..])) }.unwrap();
    assert_eq!(engine.transfer_calls(), 1);
    assert_eq!(pad.calls_for(MemoryKind::Device), 1);
    engine.synchronize(stream).unwrap();

    unsafe {
        assert_eq!(std::slice::from_raw_parts(pi.as_ptr(), 2), &ids);
        assert_eq!(*pw.as_ptr(), 0.5);
    }
}

#[test]
fn pack_runtime_descriptor_list() {
    let mut pad = scratch();
    let first = [1u8; 3];
    let second = [2u16; 2];
    let descriptors: Vec<CopyDescriptor<'_>> =
        vec![CopyDescriptor::from_slice(&first), CopyDescriptor::from_slice(&second)];
    let block = pad.pack(MemoryKind::Pinned, &descriptors).unwrap();
    assert_eq!(block.kind(), MemoryKind::Pinned);
    assert_eq!(unsafe { block.slice::<u16>(1) }.unwrap(), &second);
}

#[test]
fn generic_packing_follows_storage_access() {
    let engine = EmulatedCopyEngine::new();
    let stream = Stream::from_raw(6);
    let a = [1u16, 2];
    let b = [3u32];

    for kind in MemoryKind::ALL {
        let mut pad = MockScratchpad::new(1024);
        let (pa, pb) = unsafe { pad.to_contiguous(kind, &engine, stream, (&a[..], &b[..])) }.unwrap();
        assert_eq!(pb.as_ptr() as usize - pa.as_ptr() as usize, 4);
        assert_eq!(pad.calls_for(kind), 1);
        if kind == MemoryKind::Device {
            assert_eq!(engine.pending(stream), 1);
        }
        engine.synchronize(stream).unwrap();
    }
    // Only the device destination needed a transfer.
    assert_eq!(engine.transfer_calls(), 1);
    assert_eq!(engine.pending(stream), 0);
}

#[test]
fn device_pointers_only_for_device_accessible_blocks() {
    let a = [5u32; 2];
    let mut pad = scratch();
    let engine = EmulatedCopyEngine::new();

    let host = pad.pack(MemoryKind::Host, &[CopyDescriptor::from_slice(&a)]).unwrap();
    assert!(matches!(
        host.device_get::<u32>(0),
        Err(ScratchError::NotDeviceAccessible(MemoryKind::Host))
    ));

    let unified = pad.pack(MemoryKind::Unified, &[CopyDescriptor::from_slice(&a)]).unwrap();
    assert_eq!(unified.device_get::<u32>(0).unwrap(), unified.get::<u32>(0).unwrap());

    let device = unsafe { pad.pack_device(&engine, Stream::DEFAULT, &[CopyDescriptor::from_slice(&a)]) }.unwrap();
    assert!(device.device_get::<u32>(0).is_ok());
    engine.synchronize(Stream::DEFAULT).unwrap();
}

#[test]
fn scratchpad_is_reusable_once_stream_is_synchronized() {
    let first = [1u32; 4];
    let second = [2u32; 4];
    let mut pad = scratch();
    let engine = EmulatedCopyEngine::new();
    let stream = Stream::from_raw(8);

    let p = unsafe { pad.to_device(&engine, stream, &first) }.unwrap();
    engine.synchronize(stream).unwrap();
    assert_eq!(unsafe { std::slice::from_raw_parts(p.as_ptr(), 4) }, &first);

    pad.reset();
    let q = unsafe { pad.to_device(&engine, stream, &second) }.unwrap();
    // The arena hands the same bytes out again after a reset.
    assert_eq!(p, q);
    engine.synchronize(stream).unwrap();
    assert_eq!(unsafe { std::slice::from_raw_parts(q.as_ptr(), 4) }, &second);
}

#[test]
fn dropping_engine_discards_unsynchronized_copies() {
    let mut pad = scratch();
    let stream = Stream::from_raw(2);
    let engine = EmulatedCopyEngine::new();
    let p = unsafe { pad.to_device(&engine, stream, &[0u8; 4]) }.unwrap();
    engine.synchronize(stream).unwrap();

    pad.reset();
    {
        let other = EmulatedCopyEngine::new();
        let q = unsafe { pad.to_device(&other, stream, &[9u8; 4]) }.unwrap();
        assert_eq!(p, q);
        assert_eq!(other.pending(stream), 1);
    }
    // The dropped engine never wrote into the scratchpad.
    assert_eq!(unsafe { std::slice::from_raw_parts(p.as_ptr(), 4) }, &[0u8; 4]);
}
