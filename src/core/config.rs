/*!
 * Heap Configuration
 *
 * Runtime configuration for VM page sizing
 */

use super::limits::{DEFAULT_PAGE_UNITS, ENV_PAGE_UNITS, MAX_PAGE_UNITS};
use tracing::warn;

/// Heap configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapConfig {
    /// System pages per VM page (1 reproduces one-page-per-mapping)
    pub page_units: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            page_units: DEFAULT_PAGE_UNITS,
        }
    }
}

impl HeapConfig {
    /// One system page per mapping
    pub const fn single_page() -> Self {
        Self { page_units: 1 }
    }

    /// Larger mappings for families with big elements
    pub const fn wide(page_units: usize) -> Self {
        Self { page_units }
    }

    /// Defaults overridden by `VMSLAB_PAGE_UNITS`
    ///
    /// Invalid values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(ENV_PAGE_UNITS) {
            match raw.trim().parse::<usize>() {
                Ok(units) if (1..=MAX_PAGE_UNITS).contains(&units) => config.page_units = units,
                _ => warn!(
                    value = %raw,
                    default = DEFAULT_PAGE_UNITS,
                    "Ignoring invalid {}",
                    ENV_PAGE_UNITS
                ),
            }
        }
        config
    }

    /// Clamp `page_units` into the supported range
    pub fn normalized(mut self) -> Self {
        self.page_units = self.page_units.clamp(1, MAX_PAGE_UNITS);
        self
    }
}
