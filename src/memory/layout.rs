/*!
 * In-Page Layout
 *
 * Byte format of page and block headers. Every page starts with a
 * [`PageHeader`]; the rest of the page is tiled by blocks, each a
 * [`BlockHeader`] followed by its payload. Links between blocks are header
 * offsets from the page base, and offset 0 (occupied by the page header)
 * doubles as "no link".
 *
 * ```text
 * 0        32       64                 64+p     ...
 * | page   | block  | payload (p bytes) | block  | payload | gap? |
 * | header | header |                   | header |         |      |
 * ```
 */

use super::source::Mapping;
use super::types::{MemoryError, MemoryResult};
use crate::core::limits::{BLOCK_HEADER_SIZE, PAGE_HEADER_SIZE, PAGE_MAGIC};
use crate::core::types::{FamilyId, Offset, PageId, Size};

/// Offset of the first block header in every page
pub const FIRST_BLOCK_OFFSET: Offset = PAGE_HEADER_SIZE as Offset;

/// Bytes of a page available to block headers and payloads
#[inline]
pub const fn usable_capacity(page_len: Size) -> Size {
    page_len - PAGE_HEADER_SIZE
}

/// Largest payload a single block can carry in a page of `page_len` bytes
#[inline]
pub const fn max_allocatable(page_len: Size) -> Size {
    usable_capacity(page_len) - BLOCK_HEADER_SIZE
}

/// Header plus payload
#[inline]
pub const fn extent(payload: u32) -> Size {
    BLOCK_HEADER_SIZE + payload as Size
}

#[inline]
fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(raw)
}

#[inline]
fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}

#[inline]
fn link(raw: u32) -> Option<Offset> {
    (raw != 0).then_some(raw)
}

/// Fixed header at offset 0 of every page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub family: FamilyId,
    pub page: PageId,
}

impl PageHeader {
    pub fn encode(&self) -> [u8; PAGE_HEADER_SIZE] {
        let mut out = [0u8; PAGE_HEADER_SIZE];
        out[0..4].copy_from_slice(&PAGE_MAGIC.to_le_bytes());
        out[4..8].copy_from_slice(&self.family.0.to_le_bytes());
        out[8..16].copy_from_slice(&self.page.0.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < PAGE_HEADER_SIZE || read_u32(bytes, 0) != PAGE_MAGIC {
            return None;
        }
        Some(Self {
            family: FamilyId(read_u32(bytes, 4)),
            page: PageId(read_u64(bytes, 8)),
        })
    }

    pub fn read(mapping: &Mapping) -> MemoryResult<Self> {
        mapping
            .bytes(0, PAGE_HEADER_SIZE)
            .and_then(Self::decode)
            .ok_or_else(|| MemoryError::corrupted(mapping.base(), "page header magic mismatch"))
    }

    pub fn write(&self, mapping: &mut Mapping) -> MemoryResult<()> {
        let base = mapping.base();
        mapping
            .bytes_mut(0, PAGE_HEADER_SIZE)
            .ok_or_else(|| MemoryError::corrupted(base, "page shorter than its header"))?
            .copy_from_slice(&self.encode());
        Ok(())
    }
}

/// Metadata immediately preceding every block payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub is_free: bool,
    /// Bytes available to the caller, excluding this header
    pub payload_size: u32,
    /// Offset of this header from the page base
    pub offset: Offset,
    /// Physically preceding header
    pub prev: Option<Offset>,
    /// Physically following header
    pub next: Option<Offset>,
    /// Free-list membership ticket, present iff the block is free
    pub free_ticket: Option<u64>,
}

impl BlockHeader {
    /// A free, unlinked block covering the whole usable region of a page
    pub fn spanning(page_len: Size) -> Self {
        Self {
            is_free: true,
            payload_size: max_allocatable(page_len) as u32,
            offset: FIRST_BLOCK_OFFSET,
            prev: None,
            next: None,
            free_ticket: None,
        }
    }

    /// Offset of the first payload byte
    #[inline]
    pub fn payload_offset(&self) -> Size {
        self.offset as Size + BLOCK_HEADER_SIZE
    }

    /// Offset one past the block's declared extent
    #[inline]
    pub fn end_offset(&self) -> Size {
        self.offset as Size + extent(self.payload_size)
    }

    /// Free flag agrees with free-list membership
    #[inline]
    pub fn membership_consistent(&self) -> bool {
        self.is_free == self.free_ticket.is_some()
    }

    pub fn encode(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut out = [0u8; BLOCK_HEADER_SIZE];
        out[0] = self.is_free as u8;
        out[4..8].copy_from_slice(&self.payload_size.to_le_bytes());
        out[8..12].copy_from_slice(&self.offset.to_le_bytes());
        out[12..16].copy_from_slice(&self.prev.unwrap_or(0).to_le_bytes());
        out[16..20].copy_from_slice(&self.next.unwrap_or(0).to_le_bytes());
        out[24..32].copy_from_slice(&self.free_ticket.unwrap_or(0).to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < BLOCK_HEADER_SIZE || bytes[0] > 1 {
            return None;
        }
        let ticket = read_u64(bytes, 24);
        Some(Self {
            is_free: bytes[0] == 1,
            payload_size: read_u32(bytes, 4),
            offset: read_u32(bytes, 8),
            prev: link(read_u32(bytes, 12)),
            next: link(read_u32(bytes, 16)),
            free_ticket: (ticket != 0).then_some(ticket),
        })
    }

    /// Decode the header at `offset`, checking it is where it claims to be
    ///
    /// Does not check free-list membership; see [`BlockHeader::read_checked`].
    pub fn read_raw(mapping: &Mapping, offset: Offset) -> MemoryResult<Self> {
        let address = mapping.base() + offset as usize;
        if (offset as Size) < PAGE_HEADER_SIZE {
            return Err(MemoryError::corrupted(address, "block header overlaps page header"));
        }
        let header = mapping
            .bytes(offset as usize, BLOCK_HEADER_SIZE)
            .and_then(Self::decode)
            .ok_or_else(|| MemoryError::corrupted(address, "unreadable block header"))?;
        if header.offset != offset {
            return Err(MemoryError::corrupted(
                address,
                format!("header records offset 0x{:x}", header.offset),
            ));
        }
        if header.end_offset() > mapping.len() {
            return Err(MemoryError::corrupted(address, "block extends past page end"));
        }
        Ok(header)
    }

    /// [`BlockHeader::read_raw`] plus the membership-iff-free check
    pub fn read_checked(mapping: &Mapping, offset: Offset) -> MemoryResult<Self> {
        let header = Self::read_raw(mapping, offset)?;
        if !header.membership_consistent() {
            return Err(MemoryError::corrupted(
                mapping.base() + offset as usize,
                format!(
                    "free flag {} disagrees with free-list link {:?}",
                    header.is_free, header.free_ticket
                ),
            ));
        }
        Ok(header)
    }

    pub fn write(&self, mapping: &mut Mapping) -> MemoryResult<()> {
        let address = mapping.base() + self.offset as usize;
        mapping
            .bytes_mut(self.offset as usize, BLOCK_HEADER_SIZE)
            .ok_or_else(|| MemoryError::corrupted(address, "block header out of page bounds"))?
            .copy_from_slice(&self.encode());
        Ok(())
    }
}
