// Copyright 2024-2026 Scratch-Core Contributors
// Licensed under the Apache License, Version 2.0

//! Execution streams and host-to-device copy engines.
//!
//! A [`Stream`] is an opaque ordering token owned by the caller. This crate
//! never creates, destroys or waits on one by itself; it only forwards the
//! token to a [`CopyEngine`] when enqueueing transfers.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{Result, ScratchError};

/// Opaque handle to an ordered queue of device work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Stream(u64);

impl Stream {
    /// The implicit stream every device context starts with.
    pub const DEFAULT: Stream = Stream(0);

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }

    pub const fn is_default(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

/// Asynchronous host-to-device transfer primitive.
///
/// Work enqueued on one stream completes in issue order. Nothing is implied
/// about ordering across streams.
pub trait CopyEngine {
    /// Enqueue a copy of `src` into `dst` on `stream` and return without
    /// waiting for it. The source bytes may be reused once this returns.
    ///
    /// Failures of the copy itself are reported by [`CopyEngine::synchronize`].
    ///
    /// # Safety
    ///
    /// `dst` must be device-addressable and valid for writes of `src.len()`
    /// bytes until the copy has completed on `stream`.
    unsafe fn copy_to_device_async(
        &self,
        dst: NonNull<u8>,
        src: &[u8],
        stream: Stream,
    ) -> Result<()>;

    /// Block until all work enqueued on `stream` has completed.
    fn synchronize(&self, stream: Stream) -> Result<()>;
}

impl<E: CopyEngine + ?Sized> CopyEngine for &E {
    unsafe fn copy_to_device_async(
        &self,
        dst: NonNull<u8>,
        src: &[u8],
        stream: Stream,
    ) -> Result<()> {
        (**self).copy_to_device_async(dst, src, stream)
    }

    fn synchronize(&self, stream: Stream) -> Result<()> {
        (**self).synchronize(stream)
    }
}

// -- Emulated engine (host-backed device memory) ------------------------------

struct PendingCopy {
    dst: *mut u8,
    data: Vec<u8>,
}

// SAFETY: the destination pointer is only written during `synchronize`, under
// the engine lock, and the caller of `copy_to_device_async` guarantees it stays
// valid until then.
unsafe impl Send for PendingCopy {}

#[derive(Default)]
struct EngineState {
    queues: HashMap<Stream, VecDeque<PendingCopy>>,
    faults: HashMap<Stream, String>,
}

/// Copy engine for host-emulated device memory.
///
/// Copies are snapshotted at enqueue time and applied, in stream order, when
/// the stream is synchronized. A fault injected with [`fail_stream`] discards
/// the pending work of that stream and is reported by the next synchronize.
///
/// [`fail_stream`]: EmulatedCopyEngine::fail_stream
#[derive(Default)]
pub struct EmulatedCopyEngine {
    state: Mutex<EngineState>,
    transfer_calls: AtomicUsize,
    bytes_enqueued: AtomicUsize,
}

impl EmulatedCopyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `copy_to_device_async` calls accepted so far.
    pub fn transfer_calls(&self) -> usize {
        self.transfer_calls.load(Ordering::Relaxed)
    }

    /// Total bytes enqueued across all streams.
    pub fn bytes_enqueued(&self) -> usize {
        self.bytes_enqueued.load(Ordering::Relaxed)
    }

    /// Copies enqueued on `stream` that have not been applied yet.
    pub fn pending(&self, stream: Stream) -> usize {
        self.state.lock().queues.get(&stream).map_or(0, VecDeque::len)
    }

    /// Make the pending work on `stream` fail at its next synchronization.
    pub fn fail_stream(&self, stream: Stream, reason: impl Into<String>) {
        self.state.lock().faults.insert(stream, reason.into());
    }
}

impl CopyEngine for EmulatedCopyEngine {
    unsafe fn copy_to_device_async(
        &self,
        dst: NonNull<u8>,
        src: &[u8],
        stream: Stream,
    ) -> Result<()> {
        self.transfer_calls.fetch_add(1, Ordering::Relaxed);
        self.bytes_enqueued.fetch_add(src.len(), Ordering::Relaxed);
        tracing::trace!(%stream, bytes = src.len(), "enqueue host-to-device copy");
        self.state
            .lock()
            .queues
            .entry(stream)
            .or_default()
            .push_back(PendingCopy {
                dst: dst.as_ptr(),
                data: src.to_vec(),
            });
        Ok(())
    }

    fn synchronize(&self, stream: Stream) -> Result<()> {
        let mut state = self.state.lock();
        let queue = state.queues.remove(&stream).unwrap_or_default();

        if let Some(reason) = state.faults.remove(&stream) {
            let bytes = queue.iter().map(|c| c.data.len()).sum();
            tracing::warn!(%stream, bytes, %reason, "stream reported transfer failure");
            return Err(ScratchError::AsyncTransferFailure {
                stream,
                bytes,
                reason,
            });
        }

        for copy in queue {
            // SAFETY: validity of `dst` for `data.len()` bytes until this
            // synchronization is the contract of `copy_to_device_async`.
            unsafe {
                std::ptr::copy_nonoverlapping(copy.data.as_ptr(), copy.dst, copy.data.len());
            }
        }
        Ok(())
    }
}

// -- CUDA engine --------------------------------------------------------------

/// Copy engine issuing `cuMemcpyHtoDAsync` on the caller's CUDA stream.
///
/// The stream token is interpreted as a raw `CUstream`; the default token is
/// the legacy default stream.
#[cfg(feature = "cuda")]
#[derive(Debug, Default)]
pub struct CudaCopyEngine;

#[cfg(feature = "cuda")]
impl CudaCopyEngine {
    fn raw_stream(stream: Stream) -> cudarc::driver::sys::CUstream {
        stream.as_raw() as usize as cudarc::driver::sys::CUstream
    }
}

#[cfg(feature = "cuda")]
impl CopyEngine for CudaCopyEngine {
    unsafe fn copy_to_device_async(
        &self,
        dst: NonNull<u8>,
        src: &[u8],
        stream: Stream,
    ) -> Result<()> {
        let device_ptr = dst.as_ptr() as usize as cudarc::driver::sys::CUdeviceptr;
        cudarc::driver::result::memcpy_htod_async(device_ptr, src, Self::raw_stream(stream))
            .map_err(|e| ScratchError::AsyncTransferFailure {
                stream,
                bytes: src.len(),
                reason: e.to_string(),
            })
    }

    fn synchronize(&self, stream: Stream) -> Result<()> {
        // SAFETY: the stream handle is owned by the caller and outlives this call.
        unsafe { cudarc::driver::result::stream::synchronize(Self::raw_stream(stream)) }.map_err(
            |e| ScratchError::AsyncTransferFailure {
                stream,
                bytes: 0,
                reason: e.to_string(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stream_is_zero() {
        assert_eq!(Stream::default(), Stream::DEFAULT);
        assert!(Stream::DEFAULT.is_default());
        assert!(!Stream::from_raw(7).is_default());
        assert_eq!(Stream::from_raw(7).to_string(), "stream#7");
    }

    #[test]
    fn copies_land_only_after_synchronize() {
        let engine = EmulatedCopyEngine::new();
        let stream = Stream::from_raw(1);
        let mut dst = [0u8; 4];
        let dst_ptr = NonNull::new(dst.as_mut_ptr()).unwrap();

        unsafe { engine.copy_to_device_async(dst_ptr, &[1, 2, 3, 4], stream) }.unwrap();
        assert_eq!(engine.pending(stream), 1);

        engine.synchronize(stream).unwrap();
        assert_eq!(engine.pending(stream), 0);
        assert_eq!(dst, [1, 2, 3, 4]);
        assert_eq!(engine.transfer_calls(), 1);
        assert_eq!(engine.bytes_enqueued(), 4);
    }

    #[test]
    fn same_stream_copies_apply_in_issue_order() {
        let engine = EmulatedCopyEngine::new();
        let stream = Stream::from_raw(2);
        let mut dst = [0u8; 2];
        let dst_ptr = NonNull::new(dst.as_mut_ptr()).unwrap();

        unsafe {
            engine.copy_to_device_async(dst_ptr, &[1, 1], stream).unwrap();
            engine.copy_to_device_async(dst_ptr, &[9, 9], stream).unwrap();
        }
        engine.synchronize(stream).unwrap();
        assert_eq!(dst, [9, 9]);
    }

    #[test]
    fn synchronizing_other_stream_leaves_work_pending() {
        let engine = EmulatedCopyEngine::new();
        let mut dst = [0u8; 1];
        let dst_ptr = NonNull::new(dst.as_mut_ptr()).unwrap();

        unsafe { engine.copy_to_device_async(dst_ptr, &[5], Stream::from_raw(1)) }.unwrap();
        engine.synchronize(Stream::from_raw(2)).unwrap();
        assert_eq!(engine.pending(Stream::from_raw(1)), 1);
        assert_eq!(dst, [0]);
    }

    #[test]
    fn injected_fault_surfaces_at_synchronize() {
        let engine = EmulatedCopyEngine::new();
        let stream = Stream::from_raw(4);
        let mut dst = [0u8; 8];
        let dst_ptr = NonNull::new(dst.as_mut_ptr()).unwrap();

        engine.fail_stream(stream, "ecc error");
        unsafe { engine.copy_to_device_async(dst_ptr, &[1; 8], stream) }.unwrap();

        let err = engine.synchronize(stream).unwrap_err();
        assert!(matches!(
            err,
            ScratchError::AsyncTransferFailure { bytes: 8, .. }
        ));
        assert_eq!(dst, [0; 8]);
        assert!(engine.synchronize(stream).is_ok());
    }
}
