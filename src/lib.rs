//! Scratch memory for compute kernels.
//!
//! Kernels get short-lived working memory from a [`Scratchpad`] across four
//! memory kinds: host, pinned host, device and unified. A backing allocator
//! implements the single [`Scratchpad::alloc`] primitive; typed buffers,
//! tensors, tensor lists, host/device transfers and contiguous packing come
//! for free through [`ScratchpadExt`].
//!
//! # Contiguous packing
//!
//! Several independently typed collections can be packed into one allocation,
//! each at its own alignment, with one `alloc` call. Device destinations are
//! staged on the host and shipped with a single asynchronous transfer on the
//! caller's [`Stream`].
//!
//! ```
//! use scratch_core::memory::{ArenaScratchpad, ScratchpadExt};
//!
//! let mut scratch = ArenaScratchpad::with_capacities([1024; 4], 64)?;
//! let ints = [1i32, 2, 3];
//! let floats = [1.5f64, 2.5];
//! let (ip, fp) = scratch.to_contiguous_host((&ints[..], &floats[..]))?;
//! assert_eq!(fp.as_ptr() as usize - ip.as_ptr() as usize, 16);
//! # Ok::<(), scratch_core::ScratchError>(())
//! ```
//!
//! # Resource model
//!
//! A scratchpad serves one invocation at a time (`alloc` takes `&mut self`)
//! and may be reused across invocations. When memory is reclaimed is up to
//! the backing allocator; [`memory::ArenaScratchpad::reset`] reclaims
//! everything at once. Streams are owned by the caller and only forwarded to
//! the [`stream::CopyEngine`].

pub mod config;
pub mod context;
pub mod contiguous;
pub mod error;
pub mod memory;
pub mod stream;
pub mod telemetry;
pub mod tensor;

pub use config::ScratchConfig;
pub use context::{CpuContext, GpuContext, KernelContext};
pub use contiguous::{pack_device, pack_host, ContiguousBlock, CopyDescriptor, PackTuple, PackingPlan};
pub use error::{Result, ScratchError};
pub use memory::{MemoryKind, Scratchpad, ScratchpadExt, StorageAccess};
pub use stream::{CopyEngine, EmulatedCopyEngine, Stream};
pub use tensor::{TensorListShape, TensorListView, TensorShape, TensorView};
