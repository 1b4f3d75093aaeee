//! Fuzz target for packing plans and host packing.
//!
//! Arbitrary (size, alignment) layouts must never panic. Valid layouts must
//! produce ordered, aligned, non-overlapping ranges, and packing byte buffers
//! of those sizes must read back unchanged.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use scratch_core::memory::{ArenaScratchpad, MemoryKind, ScratchpadExt};
use scratch_core::{CopyDescriptor, PackingPlan};

#[derive(Debug, Arbitrary)]
struct Collection {
    len: u16,
    align_shift: u8,
    fill: u8,
}

fuzz_target!(|input: Vec<Collection>| {
    // Raw layout, including invalid alignments and huge sizes.
    let raw = input
        .iter()
        .map(|c| ((c.len as usize) << (c.align_shift % 48), 1usize << (c.align_shift % 16)));
    let _ = PackingPlan::new(raw);

    let buffers: Vec<Vec<u8>> = input
        .iter()
        .take(32)
        .map(|c| vec![c.fill; c.len as usize % 512])
        .collect();
    let descriptors: Vec<CopyDescriptor<'_>> = buffers
        .iter()
        .zip(&input)
        .map(|(b, c)| {
            CopyDescriptor::from_slice(b.as_slice())
                .with_alignment(1 << (c.align_shift % 8))
                .expect("power of two")
        })
        .collect();

    let plan = PackingPlan::for_descriptors(&descriptors).expect("small layout");
    let mut end = 0;
    for (range, c) in plan.ranges().zip(&input) {
        assert!(range.start >= end);
        assert_eq!(range.start % (1 << (c.align_shift % 8)), 0);
        if !range.is_empty() {
            end = range.end;
        }
    }
    assert_eq!(plan.total_bytes(), end);

    let mut pad = ArenaScratchpad::with_capacities([64 * 1024; 4], 256).expect("arena");
    let block = pad.pack(MemoryKind::Host, &descriptors).expect("fits");
    for (i, buffer) in buffers.iter().enumerate() {
        let packed = unsafe { block.slice::<u8>(i) }.expect("host slice");
        assert_eq!(packed, buffer.as_slice());
    }
});
