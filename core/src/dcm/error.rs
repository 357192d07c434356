use thiserror::Error;

use super::constraints::ConstraintKind;
use super::geometry::FigureKind;
use super::id::Identifier;

/// All failures the manager facade and its collaborators can report.
///
/// Every public, fallible operation in [`crate::dcm`] returns
/// [`DcmResult`]; there is no panicking path for a caller-triggered error
/// condition. Only genuinely-impossible internal invariant violations use
/// `debug_assert!`/`unreachable!`, and those are called out at their call
/// site rather than folded into this enum.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DcmError {
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("identifier {0} not found")]
    NotFound(Identifier),

    #[error("identifier {id} resolves to {actual:?}, expected {expected:?}")]
    TypeMismatch {
        id: Identifier,
        expected: FigureKind,
        actual: FigureKind,
    },

    #[error("cannot remove {0}: other figures depend on it")]
    DependencyExists(Identifier),

    #[error("constraint {0} has no parameter to update")]
    NoParameter(Identifier),

    #[error("{0:?} is not supported through the unified constraint interface")]
    UnsupportedConstraint(ConstraintKind),

    #[error("solve() in LOCAL mode requires a component id")]
    ModeMismatch,
}

/// Result alias used throughout [`crate::dcm`].
pub type DcmResult<T> = Result<T, DcmError>;
