/*!
 * Page Lifecycle
 * Page table, page acquisition, and page release
 */

use super::{family_mut, family_ref, Heap};
use crate::core::types::{BlockRef, FamilyId, Offset, PageId, Size};
use crate::memory::layout::{BlockHeader, PageHeader, FIRST_BLOCK_OFFSET};
use crate::memory::source::Mapping;
use crate::memory::traits::PageSource;
use crate::memory::types::{MemoryError, MemoryResult};
use std::collections::BTreeMap;
use tracing::{error, info};

/// One OS-backed page owned by a family
#[derive(Debug)]
pub(crate) struct VmPage {
    pub family: FamilyId,
    pub prev: Option<PageId>,
    pub next: Option<PageId>,
    pub mapping: Mapping,
}

/// Slot table of live pages with an address index for pointer lookup
#[derive(Debug, Default)]
pub(crate) struct PageTable {
    slots: Vec<Option<VmPage>>,
    vacant: Vec<PageId>,
    by_address: BTreeMap<usize, PageId>,
}

impl PageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next [`PageTable::insert`] will use
    pub fn vacant_id(&self) -> PageId {
        self.vacant
            .last()
            .copied()
            .unwrap_or(PageId(self.slots.len() as u64))
    }

    /// Store `page` under the id returned by [`PageTable::vacant_id`]
    pub fn insert(&mut self, page: VmPage) -> PageId {
        let id = match self.vacant.pop() {
            Some(id) => id,
            None => {
                self.slots.push(None);
                PageId(self.slots.len() as u64 - 1)
            }
        };
        self.by_address.insert(page.mapping.base(), id);
        self.slots[id.index()] = Some(page);
        id
    }

    pub fn remove(&mut self, id: PageId) -> Option<VmPage> {
        let page = self.slots.get_mut(id.index())?.take()?;
        self.by_address.remove(&page.mapping.base());
        self.vacant.push(id);
        Some(page)
    }

    pub fn get(&self, id: PageId) -> Option<&VmPage> {
        self.slots.get(id.index())?.as_ref()
    }

    pub fn get_mut(&mut self, id: PageId) -> Option<&mut VmPage> {
        self.slots.get_mut(id.index())?.as_mut()
    }

    /// Page whose mapping contains `address`
    pub fn find(&self, address: usize) -> Option<PageId> {
        let (_, id) = self.by_address.range(..=address).next_back()?;
        self.get(*id)
            .filter(|page| page.mapping.contains(address))
            .map(|_| *id)
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn ids(&self) -> Vec<PageId> {
        self.by_address.values().copied().collect()
    }

    pub fn mapping(&self, id: PageId) -> MemoryResult<&Mapping> {
        self.get(id)
            .map(|page| &page.mapping)
            .ok_or_else(|| MemoryError::corrupted(0, format!("{} is not mapped", id)))
    }

    pub fn mapping_mut(&mut self, id: PageId) -> MemoryResult<&mut Mapping> {
        self.get_mut(id)
            .map(|page| &mut page.mapping)
            .ok_or_else(|| MemoryError::corrupted(0, format!("{} is not mapped", id)))
    }

    /// Read a header, enforcing membership-iff-free
    pub fn read_block(&self, block: BlockRef) -> MemoryResult<BlockHeader> {
        BlockHeader::read_checked(self.mapping(block.page)?, block.offset)
    }

    pub fn write_block(&mut self, page: PageId, header: &BlockHeader) -> MemoryResult<()> {
        header.write(self.mapping_mut(page)?)
    }

    /// Repoint the physical back-link of the block at `offset`
    pub fn set_prev(&mut self, page: PageId, offset: Offset, prev: Offset) -> MemoryResult<()> {
        let mapping = self.mapping_mut(page)?;
        let mut header = BlockHeader::read_checked(mapping, offset)?;
        header.prev = Some(prev);
        header.write(mapping)
    }
}

impl<S: PageSource> Heap<S> {
    /// Map a fresh page for `family` and index its single spanning free block
    ///
    /// The page goes to the head of the family's page list. A mapping whose
    /// headers cannot be written is handed back to the source.
    pub(super) fn acquire_page(&mut self, family: FamilyId) -> MemoryResult<BlockRef> {
        family_ref(&self.registry, family)?;
        let page_len = self.page_len;
        let mut mapping = self.source.map(page_len).map_err(|err| {
            error!(%family, page_len, "VM page allocation failed: {}", err);
            err
        })?;

        let id = self.pages.vacant_id();
        let mut block = BlockHeader::spanning(page_len);
        let stamped = Self::stamp_page(&mut mapping, family, id, &block);
        if let Err(err) = stamped {
            self.discard_page(family, mapping, &err);
            return Err(err);
        }

        let owner = family_mut(&mut self.registry, family)?;
        let block_ref = BlockRef::new(id, FIRST_BLOCK_OFFSET);
        let ticket = owner.free_blocks.insert(block_ref, block.payload_size);
        block.free_ticket = Some(ticket);
        if let Err(err) = block.write(&mut mapping) {
            owner.free_blocks.remove(block_ref, block.payload_size, ticket);
            self.discard_page(family, mapping, &err);
            return Err(err);
        }

        let old_head = owner.first_page.replace(id);
        let base = mapping.base();
        let inserted = self.pages.insert(VmPage {
            family,
            prev: None,
            next: old_head,
            mapping,
        });
        debug_assert_eq!(inserted, id);
        if let Some(head) = old_head.and_then(|head| self.pages.get_mut(head)) {
            head.prev = Some(id);
        }

        info!(
            family = %owner.name,
            page = %id,
            address = format_args!("0x{:x}", base),
            capacity = block.payload_size,
            "Acquired VM page"
        );
        Ok(block_ref)
    }

    /// Zero a fresh mapping and write its page header and spanning block
    fn stamp_page(
        mapping: &mut Mapping,
        family: FamilyId,
        page: PageId,
        block: &BlockHeader,
    ) -> MemoryResult<()> {
        let length = mapping.len();
        mapping.zero(0, length);
        PageHeader { family, page }.write(mapping)?;
        block.write(mapping)
    }

    /// Return a mapping that never became a page
    fn discard_page(&mut self, family: FamilyId, mapping: Mapping, cause: &MemoryError) {
        error!(%family, "Discarding unwritable VM page: {}", cause);
        if let Err(err) = self.source.unmap(mapping) {
            error!(%family, "Could not return VM page to the OS, leaking it: {}", err);
        }
    }

    /// Unlink an empty page from its family and return it to the OS
    ///
    /// A failed unmap is logged and the mapping leaked; the heap forgets the
    /// page either way.
    pub(super) fn release_page(&mut self, id: PageId) -> MemoryResult<()> {
        let page = self
            .pages
            .remove(id)
            .ok_or_else(|| MemoryError::corrupted(0, format!("release of unmapped {}", id)))?;

        if let Some(next) = page.next.and_then(|next| self.pages.get_mut(next)) {
            next.prev = page.prev;
        }
        match page.prev {
            Some(prev) => {
                if let Some(prev) = self.pages.get_mut(prev) {
                    prev.next = page.next;
                }
            }
            None => family_mut(&mut self.registry, page.family)?.first_page = page.next,
        }

        let base = page.mapping.base();
        let length: Size = page.mapping.len();
        match self.source.unmap(page.mapping) {
            Ok(()) => info!(
                family = %page.family,
                page = %id,
                address = format_args!("0x{:x}", base),
                "Released empty VM page"
            ),
            Err(err) => error!(
                family = %page.family,
                page = %id,
                length,
                "Could not return VM page to the OS, leaking it: {}",
                err
            ),
        }
        Ok(())
    }

    /// Return every page to the source, used on drop
    pub(super) fn release_all_pages(&mut self) {
        for id in self.pages.ids() {
            if let Some(page) = self.pages.remove(id) {
                if let Err(err) = self.source.unmap(page.mapping) {
                    error!(page = %id, "Could not unmap page during teardown: {}", err);
                }
            }
        }
    }
}
