/*!
 * Family Names
 * Bounded, inline-stored names for structure families
 */

use crate::core::limits::MAX_FAMILY_NAME;
use serde::{Deserialize, Serialize};
use smartstring::alias::String as SmartString;
use std::borrow::Borrow;
use std::fmt;

/// Why a candidate family name was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameRejection {
    Empty,
    TooLong,
    InteriorNul,
}

impl NameRejection {
    pub const fn as_str(self) -> &'static str {
        match self {
            NameRejection::Empty => "name is empty",
            NameRejection::TooLong => "name exceeds 32 bytes",
            NameRejection::InteriorNul => "name contains a NUL byte",
        }
    }
}

/// Name of a structure family, at most 32 bytes
///
/// Names of 23 bytes or fewer are stored inline by `smartstring`, so the
/// common case never touches the heap.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[repr(transparent)]
pub struct FamilyName {
    inner: SmartString,
}

impl FamilyName {
    /// Validate and wrap a family name
    pub fn new(name: &str) -> Result<Self, NameRejection> {
        if name.is_empty() {
            return Err(NameRejection::Empty);
        }
        if name.len() > MAX_FAMILY_NAME {
            return Err(NameRejection::TooLong);
        }
        if name.as_bytes().contains(&0) {
            return Err(NameRejection::InteriorNul);
        }
        Ok(Self {
            inner: SmartString::from(name),
        })
    }

    #[inline(always)]
    pub fn as_str(&self) -> &str {
        self.inner.as_str()
    }
}

impl fmt::Display for FamilyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Borrow<str> for FamilyName {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<String> for FamilyName {
    type Error = &'static str;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value).map_err(NameRejection::as_str)
    }
}

impl From<FamilyName> for String {
    fn from(value: FamilyName) -> Self {
        value.inner.into()
    }
}
