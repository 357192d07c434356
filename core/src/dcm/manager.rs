//! [`DcmManager`]: the single public entry point unifying the geometry
//! store, the constraint registry, and the component tracker behind one
//! façade, per `SPEC_FULL.md` §4.9.

use tracing::instrument;

use super::components::ComponentTracker;
use super::config::{DiagnoserConfig, SolverConfig};
use super::constraints::{ConstraintDescriptor, ConstraintRegistry, SystemStatus};
use super::error::{DcmError, DcmResult};
use super::geometry::{FigureDescriptor, FigureKind, GeometryStore};
use super::id::Identifier;
use super::solver::{self, SolveMode, SolveResult};

#[derive(Debug, Clone)]
pub struct DcmManager {
    store: GeometryStore,
    registry: ConstraintRegistry,
    components: ComponentTracker,
    figure_descriptors: Vec<(Identifier, FigureDescriptor)>,
    solver_config: SolverConfig,
    diagnoser_config: DiagnoserConfig,
    mode: SolveMode,
}

impl Default for DcmManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DcmManager {
    pub fn new() -> Self {
        Self::with_config(SolverConfig::default(), DiagnoserConfig::default())
    }

    pub fn with_config(solver_config: SolverConfig, diagnoser_config: DiagnoserConfig) -> Self {
        Self {
            store: GeometryStore::new(),
            registry: ConstraintRegistry::new(),
            components: ComponentTracker::new(),
            figure_descriptors: Vec::new(),
            solver_config,
            diagnoser_config,
            mode: SolveMode::Global,
        }
    }

    #[instrument(skip(self), level = "debug")]
    pub fn add_figure(&mut self, mut descriptor: FigureDescriptor) -> DcmResult<Identifier> {
        descriptor.validate()?;
        let (id, structural_refs) = match descriptor.kind {
            FigureKind::Point => {
                let id = self.store.create_point(descriptor.coords[0], descriptor.coords[1]);
                (id, Vec::new())
            }
            FigureKind::Line => {
                let (p1, p2) = self.resolve_points(&descriptor, 2)?;
                let id = self.store.create_line(p1, p2)?;
                descriptor.point_ids = vec![p1, p2];
                (id, vec![p1, p2])
            }
            FigureKind::Circle => {
                let center = self.resolve_single_point(&descriptor)?;
                let radius = descriptor.radius.expect("validated");
                let id = self.store.create_circle(center, radius)?;
                descriptor.point_ids = vec![center];
                (id, vec![center])
            }
            FigureKind::Arc => {
                let (p1, p2, center) = self.resolve_arc_points(&descriptor)?;
                let id = self.store.create_arc(p1, p2, center)?;
                descriptor.point_ids = vec![p1, p2, center];
                (id, vec![p1, p2, center])
            }
        };
        descriptor.id = Some(id);
        self.components.on_figure_created(id, &structural_refs);
        self.figure_descriptors.push((id, descriptor));
        Ok(id)
    }

    /// Registers a [`FigureDescriptor::point`] for a point created on the
    /// fly while resolving another figure's `coords`, so it shows up in
    /// `get_figure`/`get_all_figures` like any explicitly-added point.
    fn register_auxiliary_point(&mut self, id: Identifier) {
        self.components.on_figure_created(id, &[]);
        let mut descriptor = FigureDescriptor::point(0.0, 0.0);
        descriptor.id = Some(id);
        self.figure_descriptors.push((id, descriptor));
    }

    fn resolve_points(&mut self, descriptor: &FigureDescriptor, count: usize) -> DcmResult<(Identifier, Identifier)> {
        if descriptor.point_ids.len() == count {
            Ok((descriptor.point_ids[0], descriptor.point_ids[1]))
        } else {
            let p1 = self.store.create_point(descriptor.coords[0], descriptor.coords[1]);
            self.register_auxiliary_point(p1);
            let p2 = self.store.create_point(descriptor.coords[2], descriptor.coords[3]);
            self.register_auxiliary_point(p2);
            Ok((p1, p2))
        }
    }

    fn resolve_single_point(&mut self, descriptor: &FigureDescriptor) -> DcmResult<Identifier> {
        if descriptor.point_ids.len() == 1 {
            Ok(descriptor.point_ids[0])
        } else {
            let p = self.store.create_point(descriptor.coords[0], descriptor.coords[1]);
            self.register_auxiliary_point(p);
            Ok(p)
        }
    }

    fn resolve_arc_points(&mut self, descriptor: &FigureDescriptor) -> DcmResult<(Identifier, Identifier, Identifier)> {
        if descriptor.point_ids.len() == 3 {
            Ok((descriptor.point_ids[0], descriptor.point_ids[1], descriptor.point_ids[2]))
        } else {
            let p1 = self.store.create_point(descriptor.coords[0], descriptor.coords[1]);
            self.register_auxiliary_point(p1);
            let p2 = self.store.create_point(descriptor.coords[2], descriptor.coords[3]);
            self.register_auxiliary_point(p2);
            let center = self.store.create_point(descriptor.coords[4], descriptor.coords[5]);
            self.register_auxiliary_point(center);
            Ok((p1, p2, center))
        }
    }

    #[instrument(skip(self), level = "debug")]
    pub fn remove_figure(&mut self, id: Identifier, cascade: bool) -> DcmResult<()> {
        let removed = self.store.remove(id, cascade)?;
        self.figure_descriptors.retain(|(did, _)| !removed.contains(did));
        self.registry.retain_resolvable(&self.store);
        self.rebuild_components();
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    pub fn update_point(&mut self, id: Identifier, x: f64, y: f64) -> DcmResult<()> {
        self.store.update_point(id, x, y)?;
        if self.mode == SolveMode::Drag {
            let cid = self.components.component_of(id);
            self.solve(cid)?;
        }
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    pub fn update_circle(&mut self, id: Identifier, radius: f64) -> DcmResult<()> {
        self.store.update_circle_radius(id, radius)?;
        if self.mode == SolveMode::Drag {
            let cid = self.components.component_of(id);
            self.solve(cid)?;
        }
        Ok(())
    }

    pub fn get_figure(&self, id: Identifier) -> DcmResult<FigureDescriptor> {
        let (_, stored) = self.figure_descriptors.iter().find(|(did, _)| *did == id).ok_or(DcmError::NotFound(id))?;
        self.live_descriptor(stored)
    }

    pub fn has_figure(&self, id: Identifier) -> bool {
        self.store.contains(id)
    }

    pub fn get_all_figures(&self) -> Vec<FigureDescriptor> {
        self.figure_descriptors.iter().filter_map(|(_, d)| self.live_descriptor(d).ok()).collect()
    }

    /// Reconstructs `coords`/`radius` from the store's current scalar
    /// values rather than the creation-time snapshot, per `SPEC_FULL.md`
    /// §3's descriptor round-trip invariant. `point_ids`/`kind`/`id` are
    /// structural and never go stale, so those are copied verbatim.
    fn live_descriptor(&self, stored: &FigureDescriptor) -> DcmResult<FigureDescriptor> {
        let mut descriptor = stored.clone();
        match descriptor.kind {
            FigureKind::Point => {
                let p = self.store.get_point(descriptor.id.expect("stored descriptor always has an id"))?;
                descriptor.coords = vec![p.x, p.y];
            }
            FigureKind::Line => {
                let p1 = self.store.get_point(descriptor.point_ids[0])?;
                let p2 = self.store.get_point(descriptor.point_ids[1])?;
                descriptor.coords = vec![p1.x, p1.y, p2.x, p2.y];
            }
            FigureKind::Circle => {
                let circle = self.store.get_circle(descriptor.id.expect("stored descriptor always has an id"))?;
                let center = self.store.get_point(circle.center)?;
                descriptor.coords = vec![center.x, center.y];
                descriptor.radius = Some(circle.radius);
            }
            FigureKind::Arc => {
                let p1 = self.store.get_point(descriptor.point_ids[0])?;
                let p2 = self.store.get_point(descriptor.point_ids[1])?;
                let center = self.store.get_point(descriptor.point_ids[2])?;
                descriptor.coords = vec![p1.x, p1.y, p2.x, p2.y, center.x, center.y];
            }
        }
        Ok(descriptor)
    }

    #[instrument(skip(self), level = "debug")]
    pub fn add_requirement(&mut self, descriptor: ConstraintDescriptor) -> DcmResult<Identifier> {
        let object_ids = descriptor.object_ids.clone();
        let id = self.registry.add_requirement(&self.store, descriptor)?;
        self.components.on_requirement_added(&object_ids);
        Ok(id)
    }

    #[instrument(skip(self), level = "debug")]
    pub fn remove_requirement(&mut self, id: Identifier) -> DcmResult<()> {
        self.registry.remove_requirement(&self.store, id)?;
        self.rebuild_components();
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    pub fn update_requirement_param(&mut self, id: Identifier, value: f64) -> DcmResult<()> {
        self.registry.update_requirement_param(&self.store, id, value)
    }

    pub fn get_requirement(&self, id: Identifier) -> DcmResult<ConstraintDescriptor> {
        self.registry.get_requirement(id)
    }

    pub fn has_requirement(&self, id: Identifier) -> bool {
        self.registry.has_requirement(id)
    }

    pub fn get_all_requirements(&self) -> Vec<ConstraintDescriptor> {
        self.registry.get_all_requirements()
    }

    pub fn component_of(&self, figure: Identifier) -> Option<usize> {
        self.components.component_of(figure)
    }

    pub fn figures_in_component(&self, cid: usize) -> Vec<Identifier> {
        self.components.figures_in_component(cid)
    }

    pub fn requirements_in_component(&self, cid: usize) -> Vec<ConstraintDescriptor> {
        let members = self.components.figures_in_component(cid);
        self.get_all_requirements()
            .into_iter()
            .filter(|d| d.object_ids.iter().any(|id| members.contains(id)))
            .collect()
    }

    pub fn component_count(&self) -> usize {
        self.components.active_component_count()
    }

    pub fn set_solve_mode(&mut self, mode: SolveMode) {
        self.mode = mode;
    }

    pub fn get_solve_mode(&self) -> SolveMode {
        self.mode
    }

    pub fn diagnose(&mut self) -> SystemStatus {
        let mut system = self.registry.system().clone();
        system.update_jacobian(&self.store);
        system.diagnose(&self.diagnoser_config)
    }

    /// Run the configured solver.
    ///
    /// In `Global` mode `component` is ignored and the full system solves.
    /// In `Local` mode `component` is required (absence is a
    /// [`DcmError::ModeMismatch`]) and only that component's constraints
    /// are assembled into a fresh subsystem. In `Drag` mode `component`
    /// narrows the system the same way `Local` does when supplied, and the
    /// full system solves otherwise.
    #[instrument(skip(self), level = "debug")]
    pub fn solve(&mut self, component: Option<usize>) -> DcmResult<SolveResult> {
        if self.mode == SolveMode::Local && component.is_none() {
            return Err(DcmError::ModeMismatch);
        }

        let mut system = match component {
            Some(cid) => self.build_component_subsystem(cid)?,
            None => self.registry.system().clone(),
        };

        let result = solver::solve(&mut system, &mut self.store, self.mode, &self.solver_config);
        Ok(result)
    }

    fn build_component_subsystem(&self, cid: usize) -> DcmResult<super::constraints::ConstraintFunctionSystem> {
        let members = self.components.figures_in_component(cid);
        let requirements: Vec<_> =
            self.get_all_requirements().into_iter().filter(|d| d.object_ids.iter().any(|id| members.contains(id))).collect();
        let mut subsystem = ConstraintRegistry::new();
        for mut descriptor in requirements {
            descriptor.id = None;
            subsystem.add_requirement(&self.store, descriptor)?;
        }
        Ok(subsystem.system().clone())
    }

    fn rebuild_components(&mut self) {
        let figures: Vec<Identifier> = self.store.all_ids();
        let mut structural_edges = Vec::new();
        for &id in &figures {
            for dep in self.store.get_dependencies(id) {
                structural_edges.push((id, dep));
            }
        }
        let requirements = self.registry.get_all_requirements();
        let constraint_refs: Vec<Vec<Identifier>> = requirements.into_iter().map(|d| d.object_ids).collect();
        let constraint_slices: Vec<&[Identifier]> = constraint_refs.iter().map(|v| v.as_slice()).collect();
        self.components.rebuild(figures.into_iter(), structural_edges.into_iter(), constraint_slices.into_iter());
    }

    #[instrument(skip(self), level = "debug")]
    pub fn clear(&mut self) {
        self.store.clear();
        self.registry.clear();
        self.components.clear();
        self.figure_descriptors.clear();
        self.mode = SolveMode::Global;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DcmManager>();
    }

    #[test]
    fn add_figure_and_fetch_descriptor() {
        let mut manager = DcmManager::new();
        let id = manager.add_figure(FigureDescriptor::point(1.0, 2.0)).unwrap();
        let fetched = manager.get_figure(id).unwrap();
        assert_eq!(fetched.id, Some(id));
        assert_eq!(fetched.coords, vec![1.0, 2.0]);
    }

    #[test]
    fn clear_resets_everything() {
        let mut manager = DcmManager::new();
        manager.add_figure(FigureDescriptor::point(0.0, 0.0)).unwrap();
        manager.clear();
        assert!(manager.get_all_figures().is_empty());
        assert_eq!(manager.component_count(), 0);
    }
}
