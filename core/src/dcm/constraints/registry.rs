//! The unified constraint interface: validates descriptors, resolves them
//! into [`ConstraintFunction`]s against a [`GeometryStore`], and keeps the
//! backing [`ConstraintFunctionSystem`] in step with the live descriptor
//! set by rebuilding it from scratch on any removal or parameter update.

use tracing::trace;

use super::super::error::{DcmError, DcmResult};
use super::super::geometry::GeometryStore;
use super::super::id::{IdGenerator, Identifier};
use super::function::ConstraintFunction;
use super::system::ConstraintFunctionSystem;
use super::{ConstraintDescriptor, ConstraintKind};

fn resolve(store: &GeometryStore, descriptor: &ConstraintDescriptor) -> DcmResult<ConstraintFunction> {
    let ids = &descriptor.object_ids;
    let param = descriptor.param;
    match descriptor.kind {
        ConstraintKind::PointPointDist => Ok(ConstraintFunction::PointPointDist {
            p: ids[0],
            q: ids[1],
            distance: param.expect("validated"),
            weight: 1.0,
        }),
        ConstraintKind::PointOnPoint => Ok(ConstraintFunction::PointOnPoint { p: ids[0], q: ids[1], weight: 1.0 }),
        ConstraintKind::PointLineDist => {
            let line = store.get_line(ids[1])?;
            Ok(ConstraintFunction::PointLineDist {
                point: ids[0],
                a: line.p1,
                b: line.p2,
                distance: param.expect("validated"),
                weight: 1.0,
            })
        }
        ConstraintKind::PointOnLine => {
            let line = store.get_line(ids[1])?;
            Ok(ConstraintFunction::PointOnLine { point: ids[0], a: line.p1, b: line.p2, weight: 1.0 })
        }
        ConstraintKind::LineCircleDist => {
            let line = store.get_line(ids[0])?;
            store.get_circle(ids[1])?;
            Ok(ConstraintFunction::LineCircleDist {
                a: line.p1,
                b: line.p2,
                circle: ids[1],
                distance: param.expect("validated"),
                weight: 1.0,
            })
        }
        ConstraintKind::LineOnCircle => {
            let line = store.get_line(ids[0])?;
            store.get_circle(ids[1])?;
            Ok(ConstraintFunction::LineOnCircle { a: line.p1, b: line.p2, circle: ids[1], weight: 1.0 })
        }
        ConstraintKind::LineInCircle => Err(DcmError::UnsupportedConstraint(ConstraintKind::LineInCircle)),
        ConstraintKind::LineLineParallel => {
            store.get_line(ids[0])?;
            store.get_line(ids[1])?;
            Ok(ConstraintFunction::LineLineParallel { line_a: ids[0], line_b: ids[1], weight: 1.0 })
        }
        ConstraintKind::LineLinePerpendicular => {
            store.get_line(ids[0])?;
            store.get_line(ids[1])?;
            Ok(ConstraintFunction::LineLinePerpendicular { line_a: ids[0], line_b: ids[1], weight: 1.0 })
        }
        ConstraintKind::LineLineAngle => {
            store.get_line(ids[0])?;
            store.get_line(ids[1])?;
            Ok(ConstraintFunction::LineLineAngle {
                line_a: ids[0],
                line_b: ids[1],
                angle: param.expect("validated"),
                weight: 1.0,
            })
        }
        ConstraintKind::Vertical => {
            store.get_line(ids[0])?;
            Ok(ConstraintFunction::Vertical { line: ids[0], weight: 1.0 })
        }
        ConstraintKind::Horizontal => {
            store.get_line(ids[0])?;
            Ok(ConstraintFunction::Horizontal { line: ids[0], weight: 1.0 })
        }
        ConstraintKind::ArcCenterOnPerpendicular => {
            let arc = store.get_arc(ids[0])?;
            Ok(ConstraintFunction::ArcCenterOnPerpendicular { a: arc.p1, b: arc.p2, center: arc.center, weight: 1.0 })
        }
    }
}

/// Ordered constraint records plus the function system they resolve into.
#[derive(Debug, Clone, Default)]
pub struct ConstraintRegistry {
    id_gen: IdGenerator,
    descriptors: Vec<(Identifier, ConstraintDescriptor)>,
    system: ConstraintFunctionSystem,
}

impl ConstraintRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system(&self) -> &ConstraintFunctionSystem {
        &self.system
    }

    /// Validate, resolve, then append. Resolution happens against `store`
    /// before any mutation of `self`, so a failure here leaves the registry
    /// untouched.
    pub fn add_requirement(&mut self, store: &GeometryStore, mut descriptor: ConstraintDescriptor) -> DcmResult<Identifier> {
        descriptor.validate()?;
        let function = resolve(store, &descriptor)?;
        let id = self.id_gen.next_id();
        descriptor.id = Some(id);
        self.system.add_function(function);
        self.descriptors.push((id, descriptor));
        trace!(target: "dcm::constraints", id = id.raw(), "added requirement");
        Ok(id)
    }

    pub fn get_requirement(&self, id: Identifier) -> DcmResult<ConstraintDescriptor> {
        self.descriptors
            .iter()
            .find(|(did, _)| *did == id)
            .map(|(_, d)| d.clone())
            .ok_or(DcmError::NotFound(id))
    }

    pub fn has_requirement(&self, id: Identifier) -> bool {
        self.descriptors.iter().any(|(did, _)| *did == id)
    }

    pub fn get_all_requirements(&self) -> Vec<ConstraintDescriptor> {
        self.descriptors.iter().map(|(_, d)| d.clone()).collect()
    }

    pub fn remove_requirement(&mut self, store: &GeometryStore, id: Identifier) -> DcmResult<()> {
        let pos = self.descriptors.iter().position(|(did, _)| *did == id).ok_or(DcmError::NotFound(id))?;
        self.descriptors.remove(pos);
        self.rebuild(store)?;
        trace!(target: "dcm::constraints", id = id.raw(), "removed requirement");
        Ok(())
    }

    /// Update the scalar parameter of an existing constraint and rebuild
    /// the function system so the change takes effect on the next solve.
    pub fn update_requirement_param(&mut self, store: &GeometryStore, id: Identifier, value: f64) -> DcmResult<()> {
        let (_, descriptor) = self.descriptors.iter_mut().find(|(did, _)| *did == id).ok_or(DcmError::NotFound(id))?;
        if descriptor.param.is_none() {
            return Err(DcmError::NoParameter(id));
        }
        descriptor.param = Some(value);
        self.rebuild(store)?;
        Ok(())
    }

    /// Re-resolve every surviving descriptor against `store` into a fresh
    /// function system. Used after any removal of a constraint or of a
    /// figure it referenced.
    pub fn rebuild(&mut self, store: &GeometryStore) -> DcmResult<()> {
        let mut system = ConstraintFunctionSystem::new();
        for (_, descriptor) in &self.descriptors {
            let function = resolve(store, descriptor)?;
            system.add_function(function);
        }
        self.system = system;
        Ok(())
    }

    /// Drop every descriptor referencing a figure not present in `store`
    /// (used after a cascaded figure removal), then rebuild.
    pub fn retain_resolvable(&mut self, store: &GeometryStore) {
        self.descriptors.retain(|(_, d)| resolve(store, d).is_ok());
        let _ = self.rebuild(store);
    }

    pub fn clear(&mut self) {
        self.id_gen.reset();
        self.descriptors.clear();
        self.system.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dcm::constraints::ConstraintKind;

    #[test]
    fn add_and_fetch_requirement() {
        let mut store = GeometryStore::new();
        let p1 = store.create_point(0.0, 0.0);
        let p2 = store.create_point(3.0, 4.0);
        let mut registry = ConstraintRegistry::new();
        let id = registry
            .add_requirement(&store, ConstraintDescriptor::new(ConstraintKind::PointPointDist, vec![p1, p2], Some(5.0)))
            .unwrap();
        assert!(registry.has_requirement(id));
        assert_eq!(registry.system().functions().len(), 1);
    }

    #[test]
    fn line_in_circle_is_unsupported() {
        let mut store = GeometryStore::new();
        let a = store.create_point(0.0, 0.0);
        let b = store.create_point(1.0, 0.0);
        let line = store.create_line(a, b).unwrap();
        let center = store.create_point(0.5, 0.5);
        let circle = store.create_circle(center, 1.0).unwrap();
        let mut registry = ConstraintRegistry::new();
        let err = registry
            .add_requirement(&store, ConstraintDescriptor::new(ConstraintKind::LineInCircle, vec![line, circle], None))
            .unwrap_err();
        assert!(matches!(err, DcmError::UnsupportedConstraint(ConstraintKind::LineInCircle)));
        assert_eq!(registry.get_all_requirements().len(), 0);
    }

    #[test]
    fn remove_requirement_rebuilds_system() {
        let mut store = GeometryStore::new();
        let p1 = store.create_point(0.0, 0.0);
        let p2 = store.create_point(3.0, 4.0);
        let mut registry = ConstraintRegistry::new();
        let id = registry
            .add_requirement(&store, ConstraintDescriptor::new(ConstraintKind::PointPointDist, vec![p1, p2], Some(5.0)))
            .unwrap();
        registry.remove_requirement(&store, id).unwrap();
        assert!(!registry.has_requirement(id));
        assert_eq!(registry.system().functions().len(), 0);
    }

    #[test]
    fn update_param_without_parameter_fails() {
        let mut store = GeometryStore::new();
        let p1 = store.create_point(0.0, 0.0);
        let p2 = store.create_point(3.0, 4.0);
        let mut registry = ConstraintRegistry::new();
        let id = registry
            .add_requirement(&store, ConstraintDescriptor::new(ConstraintKind::PointOnPoint, vec![p1, p2], None))
            .unwrap();
        let err = registry.update_requirement_param(&store, id, 1.0).unwrap_err();
        assert!(matches!(err, DcmError::NoParameter(_)));
    }
}
