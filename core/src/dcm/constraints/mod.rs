//! Constraint kinds, descriptors and the constraint pipeline: a
//! [`function::ConstraintFunction`] per active constraint, assembled into a
//! [`system::ConstraintFunctionSystem`] by the [`registry::ConstraintRegistry`].

pub mod function;
pub mod registry;
pub mod system;

pub use function::ConstraintFunction;
pub use registry::ConstraintRegistry;
pub use system::{ConstraintFunctionSystem, SystemStatus};

use serde::{Deserialize, Serialize};

use super::error::{DcmError, DcmResult};
use super::id::Identifier;

/// One of the thirteen constraint kinds a requirement can be. `LineInCircle`
/// is enumerated for descriptor round-trip and `getType` completeness, but
/// is never constructible into a [`ConstraintFunction`] — see
/// `SPEC_FULL.md` §9, "Open questions / unclear source behavior".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    PointPointDist,
    PointOnPoint,
    PointLineDist,
    PointOnLine,
    LineCircleDist,
    LineOnCircle,
    LineInCircle,
    LineLineParallel,
    LineLinePerpendicular,
    LineLineAngle,
    Vertical,
    Horizontal,
    ArcCenterOnPerpendicular,
}

impl ConstraintKind {
    /// Number of figure identifiers a descriptor of this kind must carry.
    pub fn arity(self) -> usize {
        match self {
            ConstraintKind::Vertical | ConstraintKind::Horizontal | ConstraintKind::ArcCenterOnPerpendicular => 1,
            _ => 2,
        }
    }

    /// Whether `addRequirement` requires a scalar `param` for this kind.
    pub fn requires_param(self) -> bool {
        matches!(
            self,
            ConstraintKind::PointPointDist
                | ConstraintKind::PointLineDist
                | ConstraintKind::LineCircleDist
                | ConstraintKind::LineLineAngle
        )
    }
}

/// High-level descriptor for creating or reading back a constraint through
/// the unified `addRequirement`/`getRequirement` interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDescriptor {
    pub id: Option<Identifier>,
    pub kind: ConstraintKind,
    pub object_ids: Vec<Identifier>,
    pub param: Option<f64>,
}

impl ConstraintDescriptor {
    pub fn new(kind: ConstraintKind, object_ids: Vec<Identifier>, param: Option<f64>) -> Self {
        Self { id: None, kind, object_ids, param }
    }

    /// Validate object arity and parameter presence per `SPEC_FULL.md` §6.
    pub fn validate(&self) -> DcmResult<()> {
        if self.object_ids.len() != self.kind.arity() {
            return Err(DcmError::InvalidDescriptor(format!(
                "{:?} requires exactly {} object id(s), got {}",
                self.kind,
                self.kind.arity(),
                self.object_ids.len()
            )));
        }
        if self.kind.requires_param() && self.param.is_none() {
            return Err(DcmError::InvalidDescriptor(format!("{:?} requires a parameter value", self.kind)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_table_matches_spec() {
        assert_eq!(ConstraintKind::PointPointDist.arity(), 2);
        assert_eq!(ConstraintKind::Vertical.arity(), 1);
        assert_eq!(ConstraintKind::ArcCenterOnPerpendicular.arity(), 1);
    }

    #[test]
    fn param_requirement_table_matches_spec() {
        assert!(ConstraintKind::PointPointDist.requires_param());
        assert!(ConstraintKind::LineLineAngle.requires_param());
        assert!(!ConstraintKind::PointOnPoint.requires_param());
        assert!(!ConstraintKind::Vertical.requires_param());
    }

    #[test]
    fn validate_rejects_wrong_arity() {
        let d = ConstraintDescriptor::new(ConstraintKind::Vertical, vec![Identifier::from_raw(1), Identifier::from_raw(2)], None);
        assert!(d.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_param() {
        let d = ConstraintDescriptor::new(
            ConstraintKind::PointPointDist,
            vec![Identifier::from_raw(1), Identifier::from_raw(2)],
            None,
        );
        assert!(d.validate().is_err());
    }
}
