use core::fmt;
use core::num::NonZeroU32;

/// Compact, stable identifier assigned in circuit traversal order.
///
/// - `u32` keeps memory small
/// - `NonZero` enables `Option<Id>` to be pointer-optimized
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(NonZeroU32);

impl Id {
    /// Create an Id from a 0-based index by storing index+1.
    pub fn from_index(index: u32) -> Self {
        // index+1 must be nonzero
        Self(NonZeroU32::new(index + 1).expect("index+1 is nonzero"))
    }

    /// Recover the 0-based index.
    pub fn index(self) -> u32 {
        self.0.get() - 1
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.index())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Circuit elements are handed ids in solver traversal order; controller
/// registration sorts on these so runs are reproducible.
pub type ElementId = Id;
