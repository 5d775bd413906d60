//! Source construct identifiers.

use std::fmt;

/// Identifier of the source construct (attribute definition, write, variant
/// block) a node or diagnostic was produced for.
///
/// The parser owns the mapping from origins to source text; this crate only
/// carries the id so diagnostics can be located and deduplicated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Origin(u32);

impl Origin {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "construct #{}", self.0)
    }
}
