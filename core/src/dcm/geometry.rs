//! Owns the geometric primitives (points, lines, circles, arcs) and
//! enforces the store's referential-integrity and address-stability
//! invariants.
//!
//! Point coordinates and circle radii are the scalar *variables* the
//! solvers mutate. Because Rust's aliasing rules rule out handing out a
//! long-lived `&mut f64` into a `Vec` that keeps growing, a "reference to a
//! scalar" here is a [`VarRef`] — a figure id plus a [`ScalarSlot`] tag —
//! resolved against the store at each `evaluate`/`gradient` call rather
//! than a raw pointer. See `SPEC_FULL.md` §3, "Rust realization of
//! 'reference into the store'".

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::error::{DcmError, DcmResult};
use super::id::{IdGenerator, Identifier};

/// Which kind of primitive a figure identifier resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FigureKind {
    Point,
    Line,
    Circle,
    Arc,
}

/// Which scalar within a figure a [`VarRef`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarSlot {
    X,
    Y,
    Radius,
}

/// A non-owning reference to a single solver-mutable scalar: an (x, y) of
/// some point, or the radius of some circle.
///
/// Constraint functions carry these instead of raw references; see the
/// module doc comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarRef {
    pub figure: Identifier,
    pub slot: ScalarSlot,
}

impl VarRef {
    pub const fn new(figure: Identifier, slot: ScalarSlot) -> Self {
        Self { figure, slot }
    }
}

/// A point primitive: the fundamental variable-carrying figure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// A line segment, structurally defined by two point identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub p1: Identifier,
    pub p2: Identifier,
}

/// A circle: a center point identifier plus an owned radius variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Identifier,
    pub radius: f64,
}

/// An arc: two endpoints and a center, all by identifier. Carries no
/// independent scalars of its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arc {
    pub p1: Identifier,
    pub p2: Identifier,
    pub center: Identifier,
}

#[derive(Debug, Clone, Copy)]
struct FigureEntry {
    kind: FigureKind,
    slot: usize,
}

/// Owns the four append-only primitive sequences and the identifier index.
///
/// Each sequence is a `Vec<Option<T>>` indexed by a slot assigned once at
/// creation and never reassigned to a different figure: `remove` tombstones
/// a slot to `None` rather than shrinking the vector, so a slot index
/// embedded in a [`VarRef`] (indirectly, via its figure [`Identifier`])
/// never needs to be aware of later insertions or removals elsewhere in the
/// store. This is the "append-only segmented storage" invariant from
/// `SPEC_FULL.md` §4.1, realized as tombstoning rather than a literal
/// segmented deque.
#[derive(Debug, Clone, Default)]
pub struct GeometryStore {
    id_gen: IdGenerator,
    points: Vec<Option<Point>>,
    lines: Vec<Option<Line>>,
    circles: Vec<Option<Circle>>,
    arcs: Vec<Option<Arc>>,
    index: HashMap<Identifier, FigureEntry>,
    /// point id -> set of composite figure ids that structurally reference it.
    dependents: HashMap<Identifier, HashSet<Identifier>>,
}

impl GeometryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_point(&mut self, x: f64, y: f64) -> Identifier {
        let id = self.id_gen.next_id();
        let slot = self.points.len();
        self.points.push(Some(Point { x, y }));
        self.index.insert(id, FigureEntry { kind: FigureKind::Point, slot });
        self.dependents.insert(id, HashSet::new());
        trace!(target: "dcm::geometry", id = id.raw(), x, y, "created point");
        id
    }

    pub fn create_line(&mut self, p1: Identifier, p2: Identifier) -> DcmResult<Identifier> {
        self.require_kind(p1, FigureKind::Point)?;
        self.require_kind(p2, FigureKind::Point)?;
        let id = self.id_gen.next_id();
        let slot = self.lines.len();
        self.lines.push(Some(Line { p1, p2 }));
        self.index.insert(id, FigureEntry { kind: FigureKind::Line, slot });
        self.add_dependency(p1, id);
        self.add_dependency(p2, id);
        trace!(target: "dcm::geometry", id = id.raw(), "created line");
        Ok(id)
    }

    pub fn create_circle(&mut self, center: Identifier, radius: f64) -> DcmResult<Identifier> {
        self.require_kind(center, FigureKind::Point)?;
        let id = self.id_gen.next_id();
        let slot = self.circles.len();
        self.circles.push(Some(Circle { center, radius }));
        self.index.insert(id, FigureEntry { kind: FigureKind::Circle, slot });
        self.add_dependency(center, id);
        trace!(target: "dcm::geometry", id = id.raw(), radius, "created circle");
        Ok(id)
    }

    pub fn create_arc(&mut self, p1: Identifier, p2: Identifier, center: Identifier) -> DcmResult<Identifier> {
        self.require_kind(p1, FigureKind::Point)?;
        self.require_kind(p2, FigureKind::Point)?;
        self.require_kind(center, FigureKind::Point)?;
        let id = self.id_gen.next_id();
        let slot = self.arcs.len();
        self.arcs.push(Some(Arc { p1, p2, center }));
        self.index.insert(id, FigureEntry { kind: FigureKind::Arc, slot });
        self.add_dependency(p1, id);
        self.add_dependency(p2, id);
        self.add_dependency(center, id);
        trace!(target: "dcm::geometry", id = id.raw(), "created arc");
        Ok(id)
    }

    fn add_dependency(&mut self, point: Identifier, dependent: Identifier) {
        self.dependents.entry(point).or_default().insert(dependent);
    }

    fn require_kind(&self, id: Identifier, kind: FigureKind) -> DcmResult<()> {
        match self.index.get(&id) {
            None => Err(DcmError::NotFound(id)),
            Some(entry) if entry.kind == kind => Ok(()),
            Some(entry) => Err(DcmError::TypeMismatch { id, expected: kind, actual: entry.kind }),
        }
    }

    pub fn get_type(&self, id: Identifier) -> Option<FigureKind> {
        self.index.get(&id).map(|e| e.kind)
    }

    pub fn contains(&self, id: Identifier) -> bool {
        self.index.contains_key(&id)
    }

    pub fn get_point(&self, id: Identifier) -> DcmResult<Point> {
        self.require_kind(id, FigureKind::Point)?;
        Ok(self.points[self.index[&id].slot].expect("indexed point slot is tombstoned"))
    }

    pub fn get_line(&self, id: Identifier) -> DcmResult<Line> {
        self.require_kind(id, FigureKind::Line)?;
        Ok(self.lines[self.index[&id].slot].expect("indexed line slot is tombstoned"))
    }

    pub fn get_circle(&self, id: Identifier) -> DcmResult<Circle> {
        self.require_kind(id, FigureKind::Circle)?;
        Ok(self.circles[self.index[&id].slot].expect("indexed circle slot is tombstoned"))
    }

    pub fn get_arc(&self, id: Identifier) -> DcmResult<Arc> {
        self.require_kind(id, FigureKind::Arc)?;
        Ok(self.arcs[self.index[&id].slot].expect("indexed arc slot is tombstoned"))
    }

    /// Resolve a [`VarRef`] to its current value.
    pub fn scalar(&self, var: VarRef) -> f64 {
        match var.slot {
            ScalarSlot::X => self.get_point(var.figure).map(|p| p.x).unwrap_or(0.0),
            ScalarSlot::Y => self.get_point(var.figure).map(|p| p.y).unwrap_or(0.0),
            ScalarSlot::Radius => self.get_circle(var.figure).map(|c| c.radius).unwrap_or(0.0),
        }
    }

    /// Write a new value through a [`VarRef`]. Used by solvers to apply a
    /// computed step; never called by constraint functions themselves.
    pub fn set_scalar(&mut self, var: VarRef, value: f64) {
        match var.slot {
            ScalarSlot::X => {
                if let Some(entry) = self.index.get(&var.figure) {
                    if entry.kind == FigureKind::Point {
                        if let Some(p) = &mut self.points[entry.slot] {
                            p.x = value;
                        }
                    }
                }
            }
            ScalarSlot::Y => {
                if let Some(entry) = self.index.get(&var.figure) {
                    if entry.kind == FigureKind::Point {
                        if let Some(p) = &mut self.points[entry.slot] {
                            p.y = value;
                        }
                    }
                }
            }
            ScalarSlot::Radius => {
                if let Some(entry) = self.index.get(&var.figure) {
                    if entry.kind == FigureKind::Circle {
                        if let Some(c) = &mut self.circles[entry.slot] {
                            c.radius = value;
                        }
                    }
                }
            }
        }
    }

    pub fn update_point(&mut self, id: Identifier, x: f64, y: f64) -> DcmResult<()> {
        self.require_kind(id, FigureKind::Point)?;
        let slot = self.index[&id].slot;
        self.points[slot] = Some(Point { x, y });
        Ok(())
    }

    pub fn update_circle_radius(&mut self, id: Identifier, radius: f64) -> DcmResult<()> {
        self.require_kind(id, FigureKind::Circle)?;
        let slot = self.index[&id].slot;
        if let Some(c) = &mut self.circles[slot] {
            c.radius = radius;
        }
        Ok(())
    }

    /// Figures that structurally reference `id`. Non-empty only for points.
    pub fn get_dependents(&self, id: Identifier) -> Vec<Identifier> {
        self.dependents
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Point identifiers that `id` structurally references.
    pub fn get_dependencies(&self, id: Identifier) -> Vec<Identifier> {
        match self.index.get(&id) {
            Some(FigureEntry { kind: FigureKind::Line, slot }) => {
                let l = self.lines[*slot].expect("tombstoned");
                vec![l.p1, l.p2]
            }
            Some(FigureEntry { kind: FigureKind::Circle, slot }) => {
                let c = self.circles[*slot].expect("tombstoned");
                vec![c.center]
            }
            Some(FigureEntry { kind: FigureKind::Arc, slot }) => {
                let a = self.arcs[*slot].expect("tombstoned");
                vec![a.p1, a.p2, a.center]
            }
            _ => Vec::new(),
        }
    }

    /// Remove a figure. With `cascade = false`, fails with
    /// [`DcmError::DependencyExists`] if anything still depends on it.
    /// With `cascade = true`, pre-computes the full transitive closure of
    /// dependents and removes them leaf-first (composites before the
    /// points they reference) so no intermediate state has a dangling
    /// reference — see `SPEC_FULL.md` §4.1, "Cascade removal algorithm".
    pub fn remove(&mut self, id: Identifier, cascade: bool) -> DcmResult<Vec<Identifier>> {
        if !self.contains(id) {
            return Err(DcmError::NotFound(id));
        }
        let direct = self.get_dependents(id);
        if !direct.is_empty() && !cascade {
            return Err(DcmError::DependencyExists(id));
        }

        let mut closure = Vec::new();
        let mut frontier = direct;
        let mut seen: HashSet<Identifier> = HashSet::new();
        while let Some(next) = frontier.pop() {
            if !seen.insert(next) {
                continue;
            }
            closure.push(next);
            frontier.extend(self.get_dependents(next));
        }
        // Remove leaves (composites pulled in by the closure) before the
        // root point itself, so no removal step ever leaves a dangling
        // reference observable by the caller.
        let mut removed = Vec::new();
        for dependent in closure.into_iter().rev() {
            self.remove_single(dependent);
            removed.push(dependent);
        }
        self.remove_single(id);
        removed.push(id);
        Ok(removed)
    }

    fn remove_single(&mut self, id: Identifier) {
        let Some(entry) = self.index.remove(&id) else { return };
        match entry.kind {
            FigureKind::Point => {
                self.points[entry.slot] = None;
                self.dependents.remove(&id);
            }
            FigureKind::Line => {
                if let Some(l) = self.lines[entry.slot].take() {
                    self.remove_dependency(l.p1, id);
                    self.remove_dependency(l.p2, id);
                }
            }
            FigureKind::Circle => {
                if let Some(c) = self.circles[entry.slot].take() {
                    self.remove_dependency(c.center, id);
                }
            }
            FigureKind::Arc => {
                if let Some(a) = self.arcs[entry.slot].take() {
                    self.remove_dependency(a.p1, id);
                    self.remove_dependency(a.p2, id);
                    self.remove_dependency(a.center, id);
                }
            }
        }
        trace!(target: "dcm::geometry", id = id.raw(), "removed figure");
    }

    fn remove_dependency(&mut self, point: Identifier, dependent: Identifier) {
        if let Some(set) = self.dependents.get_mut(&point) {
            set.remove(&dependent);
        }
    }

    pub fn clear(&mut self) {
        self.id_gen.reset();
        self.points.clear();
        self.lines.clear();
        self.circles.clear();
        self.arcs.clear();
        self.index.clear();
        self.dependents.clear();
    }

    /// All currently-live figure identifiers, point ids first then lines,
    /// circles and arcs — stable but otherwise unspecified order.
    pub fn all_ids(&self) -> Vec<Identifier> {
        self.index.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// High-level descriptor for creating or reading back a figure through the
/// unified `addFigure`/`getFigure` interface (`SPEC_FULL.md` §6).
///
/// A composite (line/circle/arc) may be described either by referencing
/// existing point identifiers (`point_ids`) or by raw coordinates
/// (`coords`), in which case the manager facade creates fresh points for
/// each coordinate pair and records their ids back into the descriptor it
/// stores for round-trip reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureDescriptor {
    pub id: Option<Identifier>,
    pub kind: FigureKind,
    #[serde(default)]
    pub point_ids: Vec<Identifier>,
    #[serde(default)]
    pub coords: Vec<f64>,
    pub radius: Option<f64>,
}

impl FigureDescriptor {
    pub fn point(x: f64, y: f64) -> Self {
        Self { id: None, kind: FigureKind::Point, point_ids: Vec::new(), coords: vec![x, y], radius: None }
    }

    pub fn line(p1: Identifier, p2: Identifier) -> Self {
        Self { id: None, kind: FigureKind::Line, point_ids: vec![p1, p2], coords: Vec::new(), radius: None }
    }

    pub fn line_coords(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { id: None, kind: FigureKind::Line, point_ids: Vec::new(), coords: vec![x1, y1, x2, y2], radius: None }
    }

    pub fn circle(center: Identifier, radius: f64) -> Self {
        Self { id: None, kind: FigureKind::Circle, point_ids: vec![center], coords: Vec::new(), radius: Some(radius) }
    }

    pub fn circle_coords(cx: f64, cy: f64, radius: f64) -> Self {
        Self { id: None, kind: FigureKind::Circle, point_ids: Vec::new(), coords: vec![cx, cy], radius: Some(radius) }
    }

    pub fn arc(p1: Identifier, p2: Identifier, center: Identifier) -> Self {
        Self { id: None, kind: FigureKind::Arc, point_ids: vec![p1, p2, center], coords: Vec::new(), radius: None }
    }

    pub fn arc_coords(x1: f64, y1: f64, x2: f64, y2: f64, cx: f64, cy: f64) -> Self {
        Self {
            id: None,
            kind: FigureKind::Arc,
            point_ids: Vec::new(),
            coords: vec![x1, y1, x2, y2, cx, cy],
            radius: None,
        }
    }

    /// Validate arity per `SPEC_FULL.md` §6's per-kind table.
    pub fn validate(&self) -> DcmResult<()> {
        match self.kind {
            FigureKind::Point => {
                if self.coords.len() == 2 {
                    Ok(())
                } else {
                    Err(DcmError::InvalidDescriptor("point requires coords of length 2".into()))
                }
            }
            FigureKind::Line => {
                if self.coords.len() == 4 || self.point_ids.len() == 2 {
                    Ok(())
                } else {
                    Err(DcmError::InvalidDescriptor(
                        "line requires coords of length 4 or exactly 2 point ids".into(),
                    ))
                }
            }
            FigureKind::Circle => {
                let has_center = self.coords.len() == 2 || self.point_ids.len() == 1;
                let has_radius = matches!(self.radius, Some(r) if r > 0.0);
                if has_center && has_radius {
                    Ok(())
                } else {
                    Err(DcmError::InvalidDescriptor(
                        "circle requires center coords or id, and a positive radius".into(),
                    ))
                }
            }
            FigureKind::Arc => {
                if self.coords.len() == 6 || self.point_ids.len() == 3 {
                    Ok(())
                } else {
                    Err(DcmError::InvalidDescriptor(
                        "arc requires coords of length 6 or exactly 3 point ids".into(),
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_fetch_point() {
        let mut store = GeometryStore::new();
        let id = store.create_point(1.0, 2.0);
        let p = store.get_point(id).unwrap();
        assert_eq!(p.x, 1.0);
        assert_eq!(p.y, 2.0);
    }

    #[test]
    fn line_requires_points() {
        let mut store = GeometryStore::new();
        let p1 = store.create_point(0.0, 0.0);
        let p2 = store.create_point(1.0, 0.0);
        let line = store.create_line(p1, p2).unwrap();
        assert_eq!(store.get_type(line), Some(FigureKind::Line));
        assert_eq!(store.get_dependencies(line), vec![p1, p2]);
    }

    #[test]
    fn type_mismatch_on_wrong_kind() {
        let mut store = GeometryStore::new();
        let p1 = store.create_point(0.0, 0.0);
        let p2 = store.create_point(1.0, 0.0);
        let line = store.create_line(p1, p2).unwrap();
        let err = store.create_line(line, p2).unwrap_err();
        assert!(matches!(err, DcmError::TypeMismatch { .. }));
    }

    #[test]
    fn not_found_on_missing_id() {
        let store = GeometryStore::new();
        let bogus = Identifier::from_raw(999);
        assert!(matches!(store.get_point(bogus), Err(DcmError::NotFound(_))));
    }

    #[test]
    fn non_cascaded_removal_blocked_by_dependents() {
        let mut store = GeometryStore::new();
        let p1 = store.create_point(0.0, 0.0);
        let p2 = store.create_point(1.0, 0.0);
        let _line = store.create_line(p1, p2).unwrap();
        let err = store.remove(p1, false).unwrap_err();
        assert!(matches!(err, DcmError::DependencyExists(_)));
        // Store is unchanged.
        assert!(store.contains(p1));
    }

    #[test]
    fn cascaded_removal_clears_dependents_and_point() {
        let mut store = GeometryStore::new();
        let p1 = store.create_point(0.0, 0.0);
        let p2 = store.create_point(1.0, 0.0);
        let line = store.create_line(p1, p2).unwrap();
        let removed = store.remove(p1, true).unwrap();
        assert!(removed.contains(&line));
        assert!(removed.contains(&p1));
        assert!(!store.contains(line));
        assert!(!store.contains(p1));
        assert!(store.contains(p2));
    }

    #[test]
    fn clear_resets_identifier_sequence() {
        let mut store = GeometryStore::new();
        store.create_point(0.0, 0.0);
        store.clear();
        let id = store.create_point(1.0, 1.0);
        assert_eq!(id.raw(), 1);
    }

    #[test]
    fn insertion_does_not_move_existing_scalars() {
        let mut store = GeometryStore::new();
        let p1 = store.create_point(5.0, 5.0);
        for i in 0..1000 {
            store.create_point(i as f64, 0.0);
        }
        assert_eq!(store.get_point(p1).unwrap(), Point { x: 5.0, y: 5.0 });
    }

    #[test]
    fn descriptor_validation_per_kind() {
        assert!(FigureDescriptor::point(1.0, 2.0).validate().is_ok());
        assert!(FigureDescriptor { kind: FigureKind::Point, coords: vec![1.0], ..FigureDescriptor::point(0.0, 0.0) }
            .validate()
            .is_err());

        assert!(FigureDescriptor::line_coords(0.0, 0.0, 1.0, 1.0).validate().is_ok());
        let bad_line = FigureDescriptor { kind: FigureKind::Line, ..FigureDescriptor::point(0.0, 0.0) };
        assert!(bad_line.validate().is_err());

        assert!(FigureDescriptor::circle_coords(0.0, 0.0, 5.0).validate().is_ok());
        assert!(FigureDescriptor::circle_coords(0.0, 0.0, -1.0).validate().is_err());

        assert!(FigureDescriptor::arc_coords(0.0, 0.0, 1.0, 0.0, 0.5, 0.5).validate().is_ok());
    }
}
