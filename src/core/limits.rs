/*!
 * System Limits and Constants
 *
 * Centralized location for layout sizes, registry limits, and defaults.
 * Organized by domain for maintainability and discoverability.
 *
 * - Layout constants are part of the in-page byte format, marked with [LAYOUT]
 * - Registry constants bound the family table, marked with [REGISTRY]
 */

// =============================================================================
// PAGE LAYOUT
// =============================================================================

/// Size of the fixed header at the start of every VM page (32 bytes)
/// [LAYOUT] Holds magic, owning family id and page id
pub const PAGE_HEADER_SIZE: usize = 32;

/// Size of a block header preceding every caller-visible region (32 bytes)
/// [LAYOUT] Freeing a pointer reads the header exactly this many bytes before it
pub const BLOCK_HEADER_SIZE: usize = 32;

/// Magic stamped at offset 0 of every page ("VMPG")
/// [LAYOUT]
pub const PAGE_MAGIC: u32 = 0x564D_5047;

/// Fallback page size when the OS refuses to report one
pub const FALLBACK_PAGE_SIZE: usize = 4096;

// =============================================================================
// REGISTRY LIMITS
// =============================================================================

/// Maximum family name length in bytes
/// [REGISTRY]
pub const MAX_FAMILY_NAME: usize = 32;

/// Nominal bytes per family record (name + size + link)
/// [REGISTRY] Sizing unit only: records are ordinary Rust values, this just
/// fixes how many share a slab
pub const FAMILY_RECORD_SIZE: usize = MAX_FAMILY_NAME + 4 + 4;

/// Nominal per-slab overhead subtracted before dividing a page into records
/// [REGISTRY]
pub const REGISTRY_SLAB_LINK_SIZE: usize = 8;

// =============================================================================
// CONFIGURATION DEFAULTS
// =============================================================================

/// System pages per VM page
pub const DEFAULT_PAGE_UNITS: usize = 1;

/// Upper bound for `page_units`, keeps every in-page offset inside `u32`
pub const MAX_PAGE_UNITS: usize = 1024;

/// Environment variable overriding `page_units`
pub const ENV_PAGE_UNITS: &str = "VMSLAB_PAGE_UNITS";

/// Environment variable enabling JSON trace output
pub const ENV_TRACE_JSON: &str = "VMSLAB_TRACE_JSON";
