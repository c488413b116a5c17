/*!
 * Memory Module
 * Page source, in-page layout, family registry, and the slab heap
 */

pub mod layout;
pub mod manager;
pub mod registry;
pub mod source;
pub mod traits;
pub mod types;

// Re-export for convenience
pub use manager::{short_type_name, Heap};
pub use source::{system_page_size, Mapping, MmapSource};
pub use traits::*;
pub use types::*;
