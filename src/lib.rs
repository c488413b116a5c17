/*!
 * vmslab
 *
 * Type-aware slab allocator over anonymous VM pages. Callers register named
 * structure families with a fixed element size, then allocate and free
 * whole multiples of that size through the family.
 */

pub mod core;
pub mod memory;
pub mod monitoring;

// Re-exports
pub use crate::core::{BlockRef, FamilyId, HeapConfig, PageId};
pub use memory::{Heap, HeapInfo, MemoryError, MemoryResult, MmapSource, PageSource, UsageReport};
pub use monitoring::init_tracing;
