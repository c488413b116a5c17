/*!
 * Family Registry
 *
 * Structure families live in a chain of fixed-capacity slabs held in
 * ordinary Rust memory, not on VM pages. A slab's capacity is the number of
 * nominal 40-byte records one system page would fit, so a family id splits
 * into a slab index and a slot. The chain grows a slab at a time, so the
 * number of families is unbounded, and a family's id never changes.
 */

use super::manager::free_list::FreeBlockIndex;
use super::types::{MemoryError, MemoryResult};
use crate::core::data_structures::FamilyName;
use crate::core::limits::{FAMILY_RECORD_SIZE, REGISTRY_SLAB_LINK_SIZE};
use crate::core::types::{FamilyId, PageId, Size};
use ahash::RandomState;
use std::collections::HashMap;
use tracing::{error, info};

/// A named class of fixed-size allocations sharing one pool of pages
#[derive(Debug)]
pub struct PageFamily {
    pub id: FamilyId,
    pub name: FamilyName,
    pub element_size: u32,
    /// Head of the family's page list
    pub first_page: Option<PageId>,
    /// Free blocks across all of the family's pages, largest first
    pub free_blocks: FreeBlockIndex,
}

impl PageFamily {
    fn new(id: FamilyId, name: FamilyName, element_size: u32) -> Self {
        Self {
            id,
            name,
            element_size,
            first_page: None,
            free_blocks: FreeBlockIndex::new(),
        }
    }
}

#[derive(Debug)]
struct FamilySlab {
    records: Vec<PageFamily>,
}

impl FamilySlab {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }
}

/// Registry of every family known to a heap
#[derive(Debug)]
pub struct FamilyRegistry {
    slabs: Vec<FamilySlab>,
    slab_capacity: usize,
    by_name: HashMap<FamilyName, FamilyId, RandomState>,
}

/// Slab capacity: nominal family records one page of `page_size` bytes would fit
pub const fn families_per_slab(page_size: Size) -> usize {
    let per = page_size.saturating_sub(REGISTRY_SLAB_LINK_SIZE) / FAMILY_RECORD_SIZE;
    if per == 0 {
        1
    } else {
        per
    }
}

impl FamilyRegistry {
    pub fn new(system_page_size: Size) -> Self {
        Self {
            slabs: Vec::new(),
            slab_capacity: families_per_slab(system_page_size),
            by_name: HashMap::with_hasher(RandomState::new()),
        }
    }

    /// Register a family, rejecting bad names, bad sizes, and duplicates
    ///
    /// A rejected registration leaves the registry untouched.
    pub fn register(
        &mut self,
        name: &str,
        element_size: u32,
        max_allocatable: Size,
    ) -> MemoryResult<FamilyId> {
        let validated = FamilyName::new(name).map_err(|rejection| {
            let err = MemoryError::InvalidFamilyName {
                name: name.to_string(),
                reason: rejection.as_str(),
            };
            error!(family = name, "{}", err);
            err
        })?;

        let checked = if element_size == 0 {
            Err(MemoryError::ZeroElementSize(name.to_string()))
        } else if element_size as Size > max_allocatable {
            Err(MemoryError::ElementTooLarge {
                family: name.to_string(),
                element_size,
                max: max_allocatable,
            })
        } else if self.by_name.contains_key(name) {
            Err(MemoryError::DuplicateFamily(name.to_string()))
        } else {
            Ok(())
        };
        if let Err(err) = checked {
            error!(family = name, element_size, "{}", err);
            return Err(err);
        }

        let id = FamilyId(self.len() as u32);
        if self
            .slabs
            .last()
            .map_or(true, |slab| slab.records.len() == self.slab_capacity)
        {
            self.slabs.push(FamilySlab::with_capacity(self.slab_capacity));
        }
        if let Some(slab) = self.slabs.last_mut() {
            slab.records
                .push(PageFamily::new(id, validated.clone(), element_size));
        }
        self.by_name.insert(validated, id);

        info!(family = name, element_size, %id, "Registered page family");
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<FamilyId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: FamilyId) -> Option<&PageFamily> {
        let (slab, slot) = self.locate(id);
        self.slabs.get(slab)?.records.get(slot)
    }

    pub fn get_mut(&mut self, id: FamilyId) -> Option<&mut PageFamily> {
        let (slab, slot) = self.locate(id);
        self.slabs.get_mut(slab)?.records.get_mut(slot)
    }

    #[inline]
    fn locate(&self, id: FamilyId) -> (usize, usize) {
        (id.index() / self.slab_capacity, id.index() % self.slab_capacity)
    }

    /// Families in registration order
    pub fn iter(&self) -> impl Iterator<Item = &PageFamily> {
        self.slabs.iter().flat_map(|slab| slab.records.iter())
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[cfg(test)]
    fn slab_count(&self) -> usize {
        self.slabs.len()
    }

    #[cfg(test)]
    fn slab_capacity(&self) -> usize {
        self.slab_capacity
    }
}
