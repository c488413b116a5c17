/*!
 * Memory Traits
 * Seams between the slab heap and the OS
 */

use super::source::Mapping;
use super::types::*;
use crate::core::types::Size;

/// Provider of whole, zero-filled page mappings
///
/// The heap only ever asks for lengths that are multiples of
/// [`PageSource::system_page_size`].
pub trait PageSource {
    /// Granularity of the underlying mapping facility
    fn system_page_size(&self) -> Size;

    /// Map `length` bytes of zeroed, page-aligned, read-write memory
    fn map(&mut self, length: Size) -> MemoryResult<Mapping>;

    /// Return a mapping obtained from [`PageSource::map`]
    fn unmap(&mut self, mapping: Mapping) -> MemoryResult<()>;
}

/// Read-only view of heap state for diagnostics
pub trait HeapInfo {
    /// Registered families in registration order
    fn families(&self) -> Vec<FamilyInfo>;

    /// Pages, block chains, and free-list order of one family
    fn family_snapshot(&self, name: &str) -> Option<FamilySnapshot>;

    /// Usage counters for every family
    fn usage_report(&self) -> UsageReport;

    /// Check every structural invariant, reporting the first violation
    fn verify(&self) -> MemoryResult<()>;
}
