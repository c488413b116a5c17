/*!
 * Data Structures
 *
 * Specialized data structures shared across the allocator:
 * - Family names: bounded, inline-stored strings
 */

mod family_name;

pub use family_name::{FamilyName, NameRejection};
