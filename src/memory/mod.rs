//! Scratch memory: memory kinds, the scratchpad capability, and the
//! allocators that implement it.

mod arena;
mod estimator;
mod kind;
mod mock;
mod scratchpad;

pub use arena::{Arena, ArenaScratchpad, ScratchpadStats};
pub use estimator::ScratchRequirements;
pub use kind::{MemoryKind, StorageAccess, UnknownMemoryKind};
pub use mock::{AllocRecord, MockScratchpad};
pub use scratchpad::{Scratchpad, ScratchpadExt};
