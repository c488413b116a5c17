/*!
 * Block Allocator
 * Biggest-fit selection and block splitting
 */

use super::{family_mut, family_ref, Heap};
use crate::core::limits::BLOCK_HEADER_SIZE;
use crate::core::types::{BlockRef, FamilyId, Size};
use crate::memory::layout::BlockHeader;
use crate::memory::traits::PageSource;
use crate::memory::types::{MemoryError, MemoryResult};
use std::ptr::NonNull;
use tracing::{debug, warn};

const HEADER: u32 = BLOCK_HEADER_SIZE as u32;

/// How a split disposed of the bytes left over after the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SplitOutcome {
    /// Request consumed the block exactly
    Exact,
    /// Leftover too small for a header, kept as an untracked gap
    HardFragment { gap: u32 },
    /// Leftover carved into a free block too small for one element
    SoftFragment { payload: u32 },
    /// Leftover carved into a free block usable by the family
    Full { payload: u32 },
}

impl<S: PageSource> Heap<S> {
    /// Allocate `units` zeroed elements from the family `name`
    ///
    /// Failures are logged and returned: an unknown family, zero units, a
    /// request larger than one page can hold, or a failed page mapping.
    pub fn allocate(&mut self, name: &str, units: u32) -> MemoryResult<NonNull<u8>> {
        let Some(family) = self.registry.lookup(name) else {
            let err = MemoryError::UnknownFamily(name.to_string());
            warn!(family = name, units, "{}", err);
            return Err(err);
        };
        if units == 0 {
            let err = MemoryError::ZeroUnits {
                family: name.to_string(),
            };
            warn!(family = name, "{}", err);
            return Err(err);
        }

        let element_size = family_ref(&self.registry, family)?.element_size;
        let max = self.max_allocatable();
        let requested = (units as Size).checked_mul(element_size as Size);
        let requested = match requested {
            Some(bytes) if bytes <= max => bytes as u32,
            _ => {
                let err = MemoryError::RequestTooLarge {
                    family: name.to_string(),
                    requested: requested.unwrap_or(Size::MAX),
                    max,
                };
                warn!(family = name, units, element_size, "{}", err);
                return Err(err);
            }
        };

        let block = self.allocate_block(family, requested)?;

        let mapping = self.pages.mapping_mut(block.page)?;
        let payload_offset = block.offset as Size + BLOCK_HEADER_SIZE;
        if !mapping.zero(payload_offset, requested as Size) {
            return Err(MemoryError::corrupted(
                mapping.base() + payload_offset,
                "payload out of page bounds",
            ));
        }
        let ptr = mapping.ptr_at(payload_offset).ok_or_else(|| {
            MemoryError::corrupted(mapping.base() + payload_offset, "payload out of page bounds")
        })?;

        debug!(
            family = name,
            units,
            bytes = requested,
            block = %block,
            address = format_args!("{:p}", ptr),
            "Allocated block"
        );
        Ok(ptr)
    }

    /// Carve `requested` bytes out of the family's largest free block,
    /// mapping a new page when that block is missing or too small
    pub(super) fn allocate_block(
        &mut self,
        family: FamilyId,
        requested: u32,
    ) -> MemoryResult<BlockRef> {
        let largest = family_ref(&self.registry, family)?.free_blocks.largest();
        let target = match largest {
            Some((block, size)) if size >= requested => block,
            _ => self.acquire_page(family)?,
        };
        self.split_free_block(family, target, requested)?;
        Ok(target)
    }

    /// Turn the free block at `target` into an allocated block of exactly
    /// `requested` bytes, carving any usable remainder into a new free block
    pub(super) fn split_free_block(
        &mut self,
        family: FamilyId,
        target: BlockRef,
        requested: u32,
    ) -> MemoryResult<SplitOutcome> {
        let mut block = self.pages.read_block(target)?;
        let address = self.pages.mapping(target.page)?.base() + target.offset as usize;
        let ticket = match block.free_ticket {
            Some(ticket) if block.is_free => ticket,
            _ => return Err(MemoryError::corrupted(address, "split target is not free")),
        };
        if block.payload_size < requested {
            return Err(MemoryError::corrupted(address, "split target smaller than request"));
        }

        let owner = family_mut(&mut self.registry, family)?;
        let element_size = owner.element_size;
        if !owner.free_blocks.remove(target, block.payload_size, ticket) {
            return Err(MemoryError::corrupted(address, "free block missing from free list"));
        }

        let remaining = block.payload_size - requested;
        block.is_free = false;
        block.free_ticket = None;
        block.payload_size = requested;

        let outcome = if remaining == 0 {
            SplitOutcome::Exact
        } else if remaining < HEADER {
            SplitOutcome::HardFragment { gap: remaining }
        } else {
            let payload = remaining - HEADER;
            let offset = target.offset + HEADER + requested;
            let mut fragment = BlockHeader {
                is_free: true,
                payload_size: payload,
                offset,
                prev: Some(block.offset),
                next: block.next,
                free_ticket: None,
            };
            if let Some(next) = block.next {
                self.pages.set_prev(target.page, next, offset)?;
            }
            block.next = Some(offset);
            fragment.free_ticket =
                Some(owner.free_blocks.insert(BlockRef::new(target.page, offset), payload));
            self.pages.write_block(target.page, &fragment)?;

            if payload < element_size {
                SplitOutcome::SoftFragment { payload }
            } else {
                SplitOutcome::Full { payload }
            }
        };
        self.pages.write_block(target.page, &block)?;

        debug!(block = %target, requested, ?outcome, "Split free block");
        Ok(outcome)
    }
}
