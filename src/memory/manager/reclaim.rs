/*!
 * Block Reclaimer
 * Freeing, gap reconciliation, coalescing, and page reclamation
 */

use super::{family_mut, Heap};
use crate::core::limits::{BLOCK_HEADER_SIZE, PAGE_HEADER_SIZE};
use crate::core::types::{BlockRef, Size};
use crate::memory::layout::{max_allocatable, BlockHeader, FIRST_BLOCK_OFFSET};
use crate::memory::traits::PageSource;
use crate::memory::types::{MemoryError, MemoryResult};
use std::ptr::NonNull;
use tracing::{debug, error};

const HEADER: u32 = BLOCK_HEADER_SIZE as u32;

/// Mark an absorbed header free and detached so a stale pointer to it is
/// reported as a double free
fn tombstone(mut header: BlockHeader) -> BlockHeader {
    header.is_free = true;
    header.free_ticket = None;
    header
}

impl<S: PageSource> Heap<S> {
    /// Return a block obtained from [`Heap::allocate`]
    ///
    /// Fatal-class errors: a pointer this heap never returned
    /// ([`MemoryError::InvalidPointer`]), a block already free
    /// ([`MemoryError::DoubleFree`]), or a header failing its consistency
    /// checks ([`MemoryError::Corrupted`]).
    pub fn free(&mut self, ptr: NonNull<u8>) -> MemoryResult<()> {
        self.free_block(ptr).map_err(|err| {
            error!(address = format_args!("{:p}", ptr), "{}", err);
            err
        })
    }

    fn free_block(&mut self, ptr: NonNull<u8>) -> MemoryResult<()> {
        let address = ptr.as_ptr() as usize;
        let page_id = self
            .pages
            .find(address)
            .ok_or(MemoryError::InvalidPointer(address))?;
        let page = self
            .pages
            .get(page_id)
            .ok_or(MemoryError::InvalidPointer(address))?;
        let family = page.family;
        let page_len = page.mapping.len();

        let payload_offset = address - page.mapping.base();
        if payload_offset < PAGE_HEADER_SIZE + BLOCK_HEADER_SIZE {
            return Err(MemoryError::InvalidPointer(address));
        }
        let offset = (payload_offset - BLOCK_HEADER_SIZE) as u32;
        let mut block = BlockHeader::read_raw(&page.mapping, offset)
            .map_err(|_| MemoryError::InvalidPointer(address))?;

        if block.is_free {
            return Err(MemoryError::DoubleFree(address));
        }
        if !block.membership_consistent() {
            return Err(MemoryError::corrupted(
                address,
                "allocated block still linked into the free list",
            ));
        }

        block.is_free = true;

        // Fold back any hard-fragmentation gap left by the split.
        let boundary = block.next.map_or(page_len, |next| next as Size);
        let gap = boundary.checked_sub(block.end_offset()).ok_or_else(|| {
            MemoryError::corrupted(address, "block overlaps its physical successor")
        })?;
        if gap > 0 {
            debug!(block = %BlockRef::new(page_id, offset), gap, "Recovered fragmentation gap");
            block.payload_size += gap as u32;
        }

        let owner = family_mut(&mut self.registry, family)?;

        if let Some(next_offset) = block.next {
            let next = self.pages.read_block(BlockRef::new(page_id, next_offset))?;
            if next.is_free {
                let ticket = next.free_ticket.unwrap_or(0);
                if !owner.free_blocks.remove(
                    BlockRef::new(page_id, next_offset),
                    next.payload_size,
                    ticket,
                ) {
                    return Err(MemoryError::corrupted(
                        address,
                        "free successor missing from free list",
                    ));
                }
                block.payload_size += HEADER + next.payload_size;
                block.next = next.next;
                if let Some(after) = next.next {
                    self.pages.set_prev(page_id, after, offset)?;
                }
                self.pages.write_block(page_id, &tombstone(next))?;
                debug!(page = %page_id, into = offset, absorbed = next_offset, "Coalesced forward");
            }
        }

        let mut survivor = block;
        if let Some(prev_offset) = block.prev {
            let mut prev = self.pages.read_block(BlockRef::new(page_id, prev_offset))?;
            if prev.is_free {
                let ticket = prev.free_ticket.unwrap_or(0);
                if !owner.free_blocks.remove(
                    BlockRef::new(page_id, prev_offset),
                    prev.payload_size,
                    ticket,
                ) {
                    return Err(MemoryError::corrupted(
                        address,
                        "free predecessor missing from free list",
                    ));
                }
                prev.free_ticket = None;
                prev.payload_size += HEADER + block.payload_size;
                prev.next = block.next;
                if let Some(after) = block.next {
                    self.pages.set_prev(page_id, after, prev_offset)?;
                }
                self.pages.write_block(page_id, &tombstone(block))?;
                debug!(page = %page_id, into = prev_offset, absorbed = offset, "Coalesced backward");
                survivor = prev;
            }
        }

        if survivor.prev.is_none() && survivor.next.is_none() {
            if survivor.offset != FIRST_BLOCK_OFFSET
                || survivor.payload_size as Size != max_allocatable(page_len)
            {
                return Err(MemoryError::corrupted(
                    address,
                    "sole block on page does not span its usable capacity",
                ));
            }
            return self.release_page(page_id);
        }

        survivor.free_ticket = Some(owner.free_blocks.insert(
            BlockRef::new(page_id, survivor.offset),
            survivor.payload_size,
        ));
        self.pages.write_block(page_id, &survivor)?;
        debug!(
            block = %BlockRef::new(page_id, survivor.offset),
            payload = survivor.payload_size,
            "Freed block"
        );
        Ok(())
    }
}
