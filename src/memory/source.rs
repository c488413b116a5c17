/*!
 * Page Source
 * Anonymous OS mappings handed out in whole pages
 */

use super::traits::PageSource;
use super::types::{MemoryError, MemoryResult};
use crate::core::limits::FALLBACK_PAGE_SIZE;
use crate::core::types::Size;
use nix::sys::mman::{mmap_anonymous, munmap, MapFlags, ProtFlags};
use nix::unistd::{sysconf, SysconfVar};
use std::ffi::c_void;
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use tracing::{debug, warn};

/// One live page mapping
///
/// All access to the mapped bytes goes through bounds-checked helpers; an
/// out-of-range request yields `None` instead of touching foreign memory.
#[derive(Debug)]
pub struct Mapping {
    base: NonNull<u8>,
    length: Size,
}

impl Mapping {
    /// Wrap a raw mapping
    ///
    /// # Safety
    ///
    /// `base` must point to `length` bytes that are readable, writable, and not
    /// otherwise accessed through Rust references for the life of the mapping.
    pub unsafe fn from_raw_parts(base: NonNull<u8>, length: Size) -> Self {
        Self { base, length }
    }

    /// Give up ownership, returning the raw base and length
    pub fn into_raw_parts(self) -> (NonNull<u8>, Size) {
        (self.base, self.length)
    }

    #[inline]
    pub fn base(&self) -> usize {
        self.base.as_ptr() as usize
    }

    #[inline]
    pub fn len(&self) -> Size {
        self.length
    }

    #[inline]
    pub fn contains(&self, address: usize) -> bool {
        (self.base()..self.base() + self.length).contains(&address)
    }

    #[inline]
    fn in_bounds(&self, offset: usize, len: usize) -> bool {
        offset
            .checked_add(len)
            .is_some_and(|end| end <= self.length)
    }

    /// Pointer to `offset`, which may equal the mapping length
    pub fn ptr_at(&self, offset: usize) -> Option<NonNull<u8>> {
        if offset > self.length {
            return None;
        }
        // SAFETY: offset is within (or one past) the mapping.
        NonNull::new(unsafe { self.base.as_ptr().add(offset) })
    }

    pub fn bytes(&self, offset: usize, len: usize) -> Option<&[u8]> {
        if !self.in_bounds(offset, len) {
            return None;
        }
        // SAFETY: range checked against the mapping length above.
        Some(unsafe { std::slice::from_raw_parts(self.base.as_ptr().add(offset), len) })
    }

    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> Option<&mut [u8]> {
        if !self.in_bounds(offset, len) {
            return None;
        }
        // SAFETY: range checked, and `&mut self` prevents overlapping views.
        Some(unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr().add(offset), len) })
    }

    /// Zero `len` bytes at `offset`, returning false when out of range
    pub fn zero(&mut self, offset: usize, len: usize) -> bool {
        match self.bytes_mut(offset, len) {
            Some(bytes) => {
                bytes.fill(0);
                true
            }
            None => false,
        }
    }
}

/// Query the OS page size, falling back to 4KB when unavailable
pub fn system_page_size() -> Size {
    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(size)) if size > 0 => size as Size,
        other => {
            warn!(
                result = ?other,
                fallback = FALLBACK_PAGE_SIZE,
                "sysconf(PAGE_SIZE) unavailable, using fallback"
            );
            FALLBACK_PAGE_SIZE
        }
    }
}

/// Page source backed by `mmap(MAP_ANONYMOUS | MAP_PRIVATE)`
#[derive(Debug, Clone)]
pub struct MmapSource {
    page_size: Size,
}

impl MmapSource {
    pub fn new() -> Self {
        Self {
            page_size: system_page_size(),
        }
    }
}

impl Default for MmapSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PageSource for MmapSource {
    fn system_page_size(&self) -> Size {
        self.page_size
    }

    fn map(&mut self, length: Size) -> MemoryResult<Mapping> {
        let len = NonZeroUsize::new(length).ok_or_else(|| MemoryError::MapFailed {
            length,
            reason: "zero-length mapping".into(),
        })?;

        // SAFETY: a fresh anonymous mapping aliases nothing.
        let ptr = unsafe {
            mmap_anonymous(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_PRIVATE,
            )
        }
        .map_err(|errno| MemoryError::MapFailed {
            length,
            reason: errno.desc().to_string(),
        })?;

        debug!(address = ptr.as_ptr() as usize, length, "Mapped anonymous pages");
        // SAFETY: the kernel handed us `length` fresh read-write bytes.
        Ok(unsafe { Mapping::from_raw_parts(ptr.cast::<u8>(), length) })
    }

    fn unmap(&mut self, mapping: Mapping) -> MemoryResult<()> {
        let (base, length) = mapping.into_raw_parts();
        // SAFETY: the mapping was produced by `map` and is consumed here.
        unsafe { munmap(base.cast::<c_void>(), length) }.map_err(|errno| {
            MemoryError::UnmapFailed {
                address: base.as_ptr() as usize,
                length,
                reason: errno.desc().to_string(),
            }
        })?;
        debug!(address = base.as_ptr() as usize, length, "Unmapped pages");
        Ok(())
    }
}
