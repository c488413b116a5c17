/*!
 * Slab Heap
 *
 * Type-aware slab allocator over anonymous VM pages.
 *
 * ## Model
 *
 * - **Families**: a name plus a fixed element size; every allocation asks a
 *   family for a whole number of elements
 * - **Pages**: one mapping of `page_units` system pages, owned by one family,
 *   tiled by a chain of header-prefixed blocks
 * - **Free list**: per family, free blocks ordered largest first; allocation
 *   always carves from the largest block
 *
 * ## Allocation
 *
 * The largest free block is split into an allocated prefix and, when at
 * least a header's worth of bytes remains, a free remainder. Remainders too
 * small for a header stay behind as an untracked gap inside the allocated
 * block and are folded back when it is freed.
 *
 * ## Reclamation
 *
 * Freed blocks absorb their gap, coalesce with free physical neighbours, and
 * return their page to the OS when the page becomes a single maximal free
 * block.
 */

mod allocator;
pub(crate) mod free_list;
mod inspect;
mod pages;
mod reclaim;

use crate::core::config::HeapConfig;
use crate::core::limits::{BLOCK_HEADER_SIZE, PAGE_HEADER_SIZE};
use crate::core::types::{FamilyId, Size};
use crate::memory::layout::max_allocatable;
use crate::memory::registry::{FamilyRegistry, PageFamily};
use crate::memory::source::MmapSource;
use crate::memory::traits::PageSource;
use crate::memory::types::{MemoryError, MemoryResult};
use pages::PageTable;
use tracing::info;

/// Smallest VM page able to hold a page header, one block header and a
/// payload of the same size
const MIN_PAGE_LEN: Size = PAGE_HEADER_SIZE + 2 * BLOCK_HEADER_SIZE;

/// Slab heap: one explicit allocator context
///
/// Not thread-safe. Wrap it in a lock to share it; every operation mutates
/// the free lists and block chains non-atomically.
pub struct Heap<S: PageSource = MmapSource> {
    source: S,
    page_len: Size,
    registry: FamilyRegistry,
    pages: PageTable,
}

impl Heap<MmapSource> {
    /// Heap over `mmap` with the default configuration
    pub fn new() -> Self {
        Self::with_config(HeapConfig::default())
    }

    pub fn with_config(config: HeapConfig) -> Self {
        Self::with_source(MmapSource::new(), config)
    }
}

impl Default for Heap<MmapSource> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: PageSource> Heap<S> {
    /// Heap over an arbitrary page source
    ///
    /// The VM page length is fixed here, from the source's page size and
    /// `config.page_units`, for the heap's lifetime.
    pub fn with_source(source: S, config: HeapConfig) -> Self {
        let config = config.normalized();
        let system_page = source.system_page_size().max(1);
        let mut units = config.page_units;
        while system_page * units < MIN_PAGE_LEN {
            units += 1;
        }
        let page_len = system_page * units;

        info!(
            system_page,
            page_units = units,
            page_len,
            max_allocatable = max_allocatable(page_len),
            "Slab heap initialized"
        );

        Self {
            registry: FamilyRegistry::new(system_page),
            pages: PageTable::new(),
            source,
            page_len,
        }
    }

    /// Register a family of `element_size`-byte structures
    pub fn register_family(&mut self, name: &str, element_size: u32) -> MemoryResult<FamilyId> {
        let max = self.max_allocatable();
        self.registry.register(name, element_size, max)
    }

    /// Register a family for `T`, named after the type
    pub fn register_type<T>(&mut self) -> MemoryResult<FamilyId> {
        let name = short_type_name::<T>();
        let size = u32::try_from(std::mem::size_of::<T>()).unwrap_or(u32::MAX);
        self.register_family(name, size)
    }

    pub fn lookup(&self, name: &str) -> Option<FamilyId> {
        self.registry.lookup(name)
    }

    /// Length of every VM page this heap maps
    pub fn page_len(&self) -> Size {
        self.page_len
    }

    /// Largest single allocation, in bytes
    pub fn max_allocatable(&self) -> Size {
        max_allocatable(self.page_len)
    }

    /// Pages currently mapped
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

impl<S: PageSource> Drop for Heap<S> {
    fn drop(&mut self) {
        self.release_all_pages();
    }
}

/// Last path segment of `T`'s type name
pub fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    let start = base.rfind("::").map_or(0, |idx| idx + 2);
    &full[start..]
}

pub(crate) fn family_mut(
    registry: &mut FamilyRegistry,
    id: FamilyId,
) -> MemoryResult<&mut PageFamily> {
    registry
        .get_mut(id)
        .ok_or_else(|| MemoryError::corrupted(0, format!("{} is not registered", id)))
}

pub(crate) fn family_ref(registry: &FamilyRegistry, id: FamilyId) -> MemoryResult<&PageFamily> {
    registry
        .get(id)
        .ok_or_else(|| MemoryError::corrupted(0, format!("{} is not registered", id)))
}
