use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque, totally-ordered identifier for a figure or a constraint.
///
/// Wraps a `u64` rather than exposing the integer directly so that figure
/// identifiers and constraint identifiers can never be confused with raw
/// indices elsewhere in the crate. Zero is reserved for "unset" and is
/// never issued by [`IdGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identifier(u64);

impl Identifier {
    /// The reserved "unset" value. Never returned by [`IdGenerator::next_id`].
    pub const UNSET: Identifier = Identifier(0);

    /// Wrap a raw value. Exposed for descriptor round-trip and persistence
    /// boundaries outside this crate; the identifier service itself never
    /// needs this constructor.
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// The underlying integer value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// True unless this is the reserved unset value.
    pub const fn is_set(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mints strictly increasing [`Identifier`] values starting at 1, never
/// reusing one.
///
/// A [`crate::dcm::manager::DcmManager`] owns two independent generators —
/// one inside its [`crate::dcm::geometry::GeometryStore`] for figure ids,
/// one inside its [`crate::dcm::constraints::ConstraintRegistry`] for
/// constraint ids — so a figure and a constraint can carry the same raw
/// value. The two id spaces are never looked up through a shared table, so
/// this causes no ambiguity in practice.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Issue the next identifier and advance the sequence.
    pub fn next_id(&mut self) -> Identifier {
        let id = Identifier(self.next);
        self.next += 1;
        id
    }

    /// Reset the sequence back to 1. Used by `clear()` on the owning store.
    pub fn reset(&mut self) {
        self.next = 1;
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_one() {
        let mut gen = IdGenerator::new();
        assert_eq!(gen.next_id().raw(), 1);
        assert_eq!(gen.next_id().raw(), 2);
    }

    #[test]
    fn unset_is_zero_and_never_issued() {
        assert_eq!(Identifier::UNSET.raw(), 0);
        assert!(!Identifier::UNSET.is_set());
        let mut gen = IdGenerator::new();
        for _ in 0..100 {
            assert!(gen.next_id().is_set());
        }
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut gen = IdGenerator::new();
        gen.next_id();
        gen.next_id();
        gen.reset();
        assert_eq!(gen.next_id().raw(), 1);
    }

    #[test]
    fn totally_ordered_and_hashable() {
        use std::collections::HashSet;
        let a = Identifier::from_raw(1);
        let b = Identifier::from_raw(2);
        assert!(a < b);
        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(set.len(), 2);
    }
}
