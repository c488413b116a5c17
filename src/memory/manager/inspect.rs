/*!
 * Heap Introspection
 * Snapshots, usage reports, and structural verification
 */

use super::pages::PageTable;
use super::Heap;
use crate::core::limits::BLOCK_HEADER_SIZE;
use crate::core::types::{BlockRef, PageId, Size};
use crate::memory::layout::{BlockHeader, PageHeader, FIRST_BLOCK_OFFSET};
use crate::memory::registry::PageFamily;
use crate::memory::traits::{HeapInfo, PageSource};
use crate::memory::types::*;
use std::fmt;
use tracing::warn;

/// Address-ordered walk of one page's block chain
fn walk_blocks(pages: &PageTable, page: PageId) -> MemoryResult<Vec<BlockSnapshot>> {
    let mapping = pages.mapping(page)?;
    let mut blocks = Vec::new();
    let mut cursor = Some(FIRST_BLOCK_OFFSET);
    while let Some(offset) = cursor {
        let header = BlockHeader::read_checked(mapping, offset)?;
        let boundary = header.next.map_or(mapping.len(), |next| next as Size);
        let gap = boundary.checked_sub(header.end_offset()).ok_or_else(|| {
            MemoryError::corrupted(mapping.base() + offset as usize, "overlapping blocks")
        })?;
        blocks.push(BlockSnapshot {
            offset,
            payload_size: header.payload_size,
            is_free: header.is_free,
            gap: gap as u32,
        });
        cursor = header.next;
    }
    Ok(blocks)
}

/// Pages of a family in list order
fn family_pages(pages: &PageTable, family: &PageFamily) -> Vec<PageId> {
    let mut ids = Vec::new();
    let mut cursor = family.first_page;
    while let Some(id) = cursor {
        // A cycle would otherwise loop forever.
        if ids.len() > pages.len() {
            break;
        }
        ids.push(id);
        cursor = pages.get(id).and_then(|page| page.next);
    }
    ids
}

impl<S: PageSource> Heap<S> {
    fn snapshot_family(&self, family: &PageFamily) -> FamilySnapshot {
        let pages = family_pages(&self.pages, family)
            .into_iter()
            .filter_map(|id| {
                let mapping = self.pages.mapping(id).ok()?;
                let blocks = walk_blocks(&self.pages, id).unwrap_or_else(|err| {
                    warn!(page = %id, "Block walk stopped: {}", err);
                    Vec::new()
                });
                Some(PageSnapshot {
                    page: id,
                    base: mapping.base(),
                    length: mapping.len(),
                    blocks,
                })
            })
            .collect();

        FamilySnapshot {
            id: family.id,
            name: family.name.to_string(),
            element_size: family.element_size,
            pages,
            free_list: family.free_blocks.iter().map(|(_, size, _)| size).collect(),
        }
    }

    /// Usage for families whose name equals `filter`, or all when `None`
    pub fn usage_report_for(&self, filter: Option<&str>) -> UsageReport {
        let families = self
            .registry
            .iter()
            .filter(|family| filter.map_or(true, |name| family.name.as_str() == name))
            .map(|family| {
                let snapshot = self.snapshot_family(family);
                let mut usage = FamilyUsage {
                    name: snapshot.name.clone(),
                    element_size: snapshot.element_size,
                    pages: snapshot.pages.len(),
                    ..Default::default()
                };
                for block in snapshot.pages.iter().flat_map(|page| page.blocks.iter()) {
                    usage.total_blocks += 1;
                    usage.gap_bytes += block.gap as Size;
                    if block.is_free {
                        usage.free_blocks += 1;
                        usage.free_bytes += block.payload_size as Size;
                    } else {
                        usage.allocated_blocks += 1;
                        usage.allocated_bytes += block.payload_size as Size;
                    }
                }
                usage
            })
            .collect();

        UsageReport {
            page_length: self.page_len,
            families,
        }
    }

    fn verify_family(&self, family: &PageFamily) -> MemoryResult<()> {
        let page_ids = family_pages(&self.pages, family);
        let mut prev_page: Option<PageId> = None;
        let mut free_seen = 0usize;
        let mut free_bytes = 0usize;

        for &id in &page_ids {
            let page = self
                .pages
                .get(id)
                .ok_or_else(|| MemoryError::corrupted(0, format!("{} listed but unmapped", id)))?;
            let base = page.mapping.base();
            let fail = |detail: String| MemoryError::corrupted(base, format!("{}: {}", id, detail));

            if page.family != family.id || page.prev != prev_page {
                return Err(fail("page list links or owner disagree".into()));
            }
            let stamped = PageHeader::read(&page.mapping)?;
            if stamped.family != family.id || stamped.page != id {
                return Err(fail(format!("page header names {} {}", stamped.family, stamped.page)));
            }

            let mut tiled = 0usize;
            let mut prev_block: Option<BlockHeader> = None;
            let mut allocated = 0usize;
            let mut cursor = Some(FIRST_BLOCK_OFFSET);
            while let Some(offset) = cursor {
                let header = self.pages.read_block(BlockRef::new(id, offset))?;
                if header.prev != prev_block.map(|b| b.offset) {
                    return Err(fail(format!("block 0x{:x} has a stale back-link", offset)));
                }
                if let Some(prev) = prev_block {
                    if prev.is_free && header.is_free {
                        return Err(fail(format!("adjacent free blocks at 0x{:x}", offset)));
                    }
                }
                let boundary = header.next.map_or(page.mapping.len(), |next| next as Size);
                let gap = boundary
                    .checked_sub(header.end_offset())
                    .ok_or_else(|| fail(format!("block 0x{:x} overlaps its successor", offset)))?;
                if gap > 0 && (header.is_free || gap >= BLOCK_HEADER_SIZE) {
                    return Err(fail(format!("block 0x{:x} hides a {} byte gap", offset, gap)));
                }
                if let Some(ticket) = header.free_ticket {
                    let block = BlockRef::new(id, offset);
                    if !family.free_blocks.contains(block, header.payload_size, ticket) {
                        return Err(fail(format!("free block 0x{:x} not in free list", offset)));
                    }
                    free_seen += 1;
                    free_bytes += header.payload_size as Size;
                } else {
                    allocated += 1;
                }
                tiled += BLOCK_HEADER_SIZE + header.payload_size as Size + gap;
                prev_block = Some(header);
                cursor = header.next;
            }

            if tiled != page.mapping.len() - FIRST_BLOCK_OFFSET as Size {
                return Err(fail(format!("blocks tile {} bytes", tiled)));
            }
            if allocated == 0 {
                return Err(fail("empty page was not released".into()));
            }
            prev_page = Some(id);
        }

        if free_seen != family.free_blocks.len()
            || free_bytes != family.free_blocks.total_free_bytes()
        {
            return Err(MemoryError::corrupted(
                0,
                format!(
                    "family '{}' indexes {} free blocks ({} bytes), pages hold {} ({} bytes)",
                    family.name,
                    family.free_blocks.len(),
                    family.free_blocks.total_free_bytes(),
                    free_seen,
                    free_bytes
                ),
            ));
        }
        Ok(())
    }
}

impl<S: PageSource> HeapInfo for Heap<S> {
    fn families(&self) -> Vec<FamilyInfo> {
        self.registry
            .iter()
            .map(|family| FamilyInfo {
                id: family.id,
                name: family.name.to_string(),
                element_size: family.element_size,
            })
            .collect()
    }

    fn family_snapshot(&self, name: &str) -> Option<FamilySnapshot> {
        let id = self.registry.lookup(name)?;
        self.registry.get(id).map(|family| self.snapshot_family(family))
    }

    fn usage_report(&self) -> UsageReport {
        self.usage_report_for(None)
    }

    fn verify(&self) -> MemoryResult<()> {
        let mut listed = 0usize;
        for family in self.registry.iter() {
            self.verify_family(family)?;
            listed += family_pages(&self.pages, family).len();
        }
        if listed != self.pages.len() {
            return Err(MemoryError::corrupted(
                0,
                format!("{} pages mapped, {} reachable from families", self.pages.len(), listed),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for UsageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<32} {:>6} {:>6} {:>7} {:>6} {:>6} {:>10} {:>10} {:>6}",
            "family", "size", "pages", "blocks", "free", "used", "used B", "free B", "gap B"
        )?;
        for usage in &self.families {
            writeln!(
                f,
                "{:<32} {:>6} {:>6} {:>7} {:>6} {:>6} {:>10} {:>10} {:>6}",
                usage.name,
                usage.element_size,
                usage.pages,
                usage.total_blocks,
                usage.free_blocks,
                usage.allocated_blocks,
                usage.allocated_bytes,
                usage.free_bytes,
                usage.gap_bytes
            )?;
        }
        write!(
            f,
            "pages mapped: {} ({} bytes, {} bytes each)",
            self.total_pages(),
            self.mapped_bytes(),
            self.page_length
        )
    }
}

impl fmt::Display for FamilySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({} bytes per element)", self.name, self.element_size)?;
        for page in &self.pages {
            writeln!(f, "  {} @ 0x{:x}", page.page, page.base)?;
            for block in &page.blocks {
                write!(
                    f,
                    "    0x{:04x} {:<9} {:>6} bytes",
                    block.offset,
                    if block.is_free { "FREE" } else { "ALLOCATED" },
                    block.payload_size
                )?;
                if block.gap > 0 {
                    write!(f, " (+{} gap)", block.gap)?;
                }
                writeln!(f)?;
            }
        }
        write!(f, "  free list: {:?}", self.free_list)
    }
}
