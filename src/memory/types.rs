/*!
 * Memory Types
 * Error, snapshot, and report types for the slab heap
 */

use crate::core::types::{FamilyId, Offset, PageId, Size};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Memory operation result
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Memory errors
///
/// Variants split into two classes, see [`MemoryError::is_fatal`]. Recoverable
/// errors describe a request the heap could not satisfy; fatal-class errors
/// describe misuse or a broken invariant, and the host decides whether to
/// abort, log, or propagate.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum MemoryError {
    #[error("Family '{0}' is not registered")]
    #[diagnostic(
        code(memory::unknown_family),
        help("Register the family with register_family before allocating from it.")
    )]
    UnknownFamily(String),

    #[error("Zero units requested from family '{family}'")]
    #[diagnostic(code(memory::zero_units))]
    ZeroUnits { family: String },

    #[error("Request of {requested} bytes from family '{family}' exceeds the {max} bytes one page can hold")]
    #[diagnostic(
        code(memory::request_too_large),
        help("Use a larger page_units setting or split the request.")
    )]
    RequestTooLarge {
        family: String,
        requested: Size,
        max: Size,
    },

    #[error("Mapping {length} bytes failed: {reason}")]
    #[diagnostic(code(memory::map_failed), help("The OS refused a new anonymous mapping."))]
    MapFailed { length: Size, reason: String },

    #[error("Unmapping {length} bytes at 0x{address:x} failed: {reason}")]
    #[diagnostic(code(memory::unmap_failed))]
    UnmapFailed {
        address: usize,
        length: Size,
        reason: String,
    },

    #[error("Family '{0}' is already registered")]
    #[diagnostic(
        code(memory::duplicate_family),
        help("Family names are unique for the lifetime of a heap.")
    )]
    DuplicateFamily(String),

    #[error("Element size {element_size} of family '{family}' exceeds the {max} bytes one page can hold")]
    #[diagnostic(code(memory::element_too_large))]
    ElementTooLarge {
        family: String,
        element_size: u32,
        max: Size,
    },

    #[error("Family '{0}' has a zero element size")]
    #[diagnostic(code(memory::zero_element_size))]
    ZeroElementSize(String),

    #[error("Invalid family name '{name}': {reason}")]
    #[diagnostic(code(memory::invalid_family_name))]
    InvalidFamilyName { name: String, reason: &'static str },

    #[error("Double free of block at 0x{0:x}")]
    #[diagnostic(
        code(memory::double_free),
        help("The block header is already marked free.")
    )]
    DoubleFree(usize),

    #[error("Pointer 0x{0:x} was not returned by this heap")]
    #[diagnostic(code(memory::invalid_pointer))]
    InvalidPointer(usize),

    #[error("Heap corruption detected at 0x{address:x}: {detail}")]
    #[diagnostic(code(memory::corrupted))]
    Corrupted { address: usize, detail: String },
}

impl MemoryError {
    /// Misuse or broken invariant, as opposed to an unsatisfiable request
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MemoryError::DuplicateFamily(_)
                | MemoryError::ElementTooLarge { .. }
                | MemoryError::ZeroElementSize(_)
                | MemoryError::InvalidFamilyName { .. }
                | MemoryError::DoubleFree(_)
                | MemoryError::InvalidPointer(_)
                | MemoryError::Corrupted { .. }
        )
    }

    pub(crate) fn corrupted(address: usize, detail: impl Into<String>) -> Self {
        MemoryError::Corrupted {
            address,
            detail: detail.into(),
        }
    }
}

/// One block as seen by introspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSnapshot {
    /// Header offset from page base
    pub offset: Offset,
    pub payload_size: u32,
    pub is_free: bool,
    /// Untracked bytes between this block's extent and the next header
    pub gap: u32,
}

/// One page and its address-ordered block chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub page: PageId,
    pub base: usize,
    pub length: Size,
    pub blocks: Vec<BlockSnapshot>,
}

/// A family, its pages, and its free-list order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilySnapshot {
    pub id: FamilyId,
    pub name: String,
    pub element_size: u32,
    /// Pages in list order (most recently acquired first)
    pub pages: Vec<PageSnapshot>,
    /// Free payload sizes in free-list order (largest first)
    pub free_list: Vec<u32>,
}

/// Registered family summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyInfo {
    pub id: FamilyId,
    pub name: String,
    pub element_size: u32,
}

/// Per-family usage counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyUsage {
    pub name: String,
    pub element_size: u32,
    pub pages: usize,
    pub total_blocks: usize,
    pub free_blocks: usize,
    pub allocated_blocks: usize,
    /// Payload bytes handed to the application
    pub allocated_bytes: Size,
    /// Payload bytes tracked as free
    pub free_bytes: Size,
    /// Bytes hidden in hard-fragmentation gaps
    pub gap_bytes: Size,
}

/// Heap-wide usage report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    pub page_length: Size,
    pub families: Vec<FamilyUsage>,
}

impl UsageReport {
    pub fn total_pages(&self) -> usize {
        self.families.iter().map(|f| f.pages).sum()
    }

    /// Bytes currently mapped from the OS for family pages
    pub fn mapped_bytes(&self) -> Size {
        self.total_pages() * self.page_length
    }

    pub fn family(&self, name: &str) -> Option<&FamilyUsage> {
        self.families.iter().find(|f| f.name == name)
    }
}
