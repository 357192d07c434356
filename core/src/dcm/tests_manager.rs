//! End-to-end scenarios against the public [`DcmManager`] facade, covering
//! the concrete walkthroughs and boundary tests from `SPEC_FULL.md` §8.

use super::constraints::{ConstraintDescriptor, ConstraintKind};
use super::geometry::FigureDescriptor;
use super::manager::DcmManager;
use super::solver::SolveMode;

fn dist(manager: &DcmManager, a: super::id::Identifier, b: super::id::Identifier) -> f64 {
    let pa = manager.get_figure(a).unwrap();
    let pb = manager.get_figure(b).unwrap();
    ((pb.coords[0] - pa.coords[0]).powi(2) + (pb.coords[1] - pa.coords[1]).powi(2)).sqrt()
}

#[test]
fn two_points_settle_to_fixed_distance() {
    let mut manager = DcmManager::new();
    let p1 = manager.add_figure(FigureDescriptor::point(0.0, 0.0)).unwrap();
    let p2 = manager.add_figure(FigureDescriptor::point(3.0, 0.0)).unwrap();
    manager.add_requirement(ConstraintDescriptor::new(ConstraintKind::PointPointDist, vec![p1, p2], Some(5.0))).unwrap();

    let result = manager.solve(None).unwrap();
    assert!(result.converged);
    assert!((4.9..=5.1).contains(&dist(&manager, p1, p2)));
}

#[test]
fn horizontal_line_levels_its_endpoints() {
    let mut manager = DcmManager::new();
    let line = manager.add_figure(FigureDescriptor::line_coords(0.0, 0.0, 5.0, 3.0)).unwrap();
    manager.add_requirement(ConstraintDescriptor::new(ConstraintKind::Horizontal, vec![line], None)).unwrap();

    let result = manager.solve(None).unwrap();
    assert!(result.converged);
    let descriptor = manager.get_figure(line).unwrap();
    let p1 = descriptor.point_ids[0];
    let p2 = descriptor.point_ids[1];
    let y1 = manager.get_figure(p1).unwrap().coords[1];
    let y2 = manager.get_figure(p2).unwrap().coords[1];
    assert!((y1 - y2).abs() < 0.1);
}

#[test]
fn drag_mode_reseats_on_update_point() {
    let mut manager = DcmManager::new();
    let p1 = manager.add_figure(FigureDescriptor::point(0.0, 0.0)).unwrap();
    let p2 = manager.add_figure(FigureDescriptor::point(5.0, 0.0)).unwrap();
    manager.add_requirement(ConstraintDescriptor::new(ConstraintKind::PointPointDist, vec![p1, p2], Some(5.0))).unwrap();
    manager.set_solve_mode(SolveMode::Drag);

    manager.update_point(p1, 2.0, 0.0).unwrap();
    assert!((4.5..=5.5).contains(&dist(&manager, p1, p2)));
}

#[test]
fn disjoint_distance_constraints_form_two_components() {
    let mut manager = DcmManager::new();
    let p1 = manager.add_figure(FigureDescriptor::point(0.0, 0.0)).unwrap();
    let p2 = manager.add_figure(FigureDescriptor::point(1.0, 0.0)).unwrap();
    let p3 = manager.add_figure(FigureDescriptor::point(100.0, 100.0)).unwrap();
    let p4 = manager.add_figure(FigureDescriptor::point(103.0, 100.0)).unwrap();
    manager.add_requirement(ConstraintDescriptor::new(ConstraintKind::PointPointDist, vec![p1, p2], Some(10.0))).unwrap();
    manager.add_requirement(ConstraintDescriptor::new(ConstraintKind::PointPointDist, vec![p3, p4], Some(20.0))).unwrap();

    assert_eq!(manager.component_count(), 2);

    let p3_before = manager.get_figure(p3).unwrap();
    let p4_before = manager.get_figure(p4).unwrap();

    manager.set_solve_mode(SolveMode::Local);
    let cid = manager.component_of(p1).unwrap();
    manager.solve(Some(cid)).unwrap();

    assert!((9.5..=10.5).contains(&dist(&manager, p1, p2)));
    assert_eq!(manager.get_figure(p3).unwrap(), p3_before);
    assert_eq!(manager.get_figure(p4).unwrap(), p4_before);
}

#[test]
fn rectangle_settles_all_residuals_small() {
    let mut manager = DcmManager::new();
    let p1 = manager.add_figure(FigureDescriptor::point(0.0, 0.0)).unwrap();
    let p2 = manager.add_figure(FigureDescriptor::point(98.0, 2.0)).unwrap();
    let p3 = manager.add_figure(FigureDescriptor::point(97.0, 49.0)).unwrap();
    let p4 = manager.add_figure(FigureDescriptor::point(1.0, 51.0)).unwrap();

    let top = manager.add_figure(FigureDescriptor::line(p1, p2)).unwrap();
    let right = manager.add_figure(FigureDescriptor::line(p2, p3)).unwrap();
    let bottom = manager.add_figure(FigureDescriptor::line(p3, p4)).unwrap();
    let left = manager.add_figure(FigureDescriptor::line(p4, p1)).unwrap();

    manager.add_requirement(ConstraintDescriptor::new(ConstraintKind::Horizontal, vec![top], None)).unwrap();
    manager.add_requirement(ConstraintDescriptor::new(ConstraintKind::Horizontal, vec![bottom], None)).unwrap();
    manager.add_requirement(ConstraintDescriptor::new(ConstraintKind::Vertical, vec![left], None)).unwrap();
    manager.add_requirement(ConstraintDescriptor::new(ConstraintKind::Vertical, vec![right], None)).unwrap();
    manager.add_requirement(ConstraintDescriptor::new(ConstraintKind::PointPointDist, vec![p1, p2], Some(100.0))).unwrap();
    manager.add_requirement(ConstraintDescriptor::new(ConstraintKind::PointPointDist, vec![p2, p3], Some(50.0))).unwrap();

    assert_eq!(manager.component_count(), 1);
    let result = manager.solve(None).unwrap();
    assert!(result.converged);
    // Six active constraints: a converged residual norm well under sqrt(6)
    // means every individual residual is comfortably under 1.0.
    assert!(result.final_residual_norm <= 6f64.sqrt());
}

#[test]
fn empty_system_solves_and_diagnoses_empty() {
    let mut manager = DcmManager::new();
    let result = manager.solve(None).unwrap();
    assert!(result.converged);
    assert_eq!(manager.diagnose(), super::constraints::SystemStatus::Empty);
}

#[test]
fn degenerate_line_does_not_nan_the_solver() {
    let mut manager = DcmManager::new();
    let line = manager.add_figure(FigureDescriptor::line_coords(2.0, 2.0, 2.0, 2.0)).unwrap();
    manager.add_requirement(ConstraintDescriptor::new(ConstraintKind::Vertical, vec![line], None)).unwrap();
    let result = manager.solve(None).unwrap();
    assert!(!result.final_residual_norm.is_nan());
}

#[test]
fn non_cascaded_removal_of_referenced_point_fails_and_leaves_store_unchanged() {
    let mut manager = DcmManager::new();
    let p1 = manager.add_figure(FigureDescriptor::point(0.0, 0.0)).unwrap();
    let p2 = manager.add_figure(FigureDescriptor::point(1.0, 0.0)).unwrap();
    manager.add_figure(FigureDescriptor::line(p1, p2)).unwrap();

    let err = manager.remove_figure(p1, false).unwrap_err();
    assert!(matches!(err, super::error::DcmError::DependencyExists(_)));
    assert!(manager.has_figure(p1));
}

#[test]
fn local_solve_without_component_is_mode_mismatch() {
    let mut manager = DcmManager::new();
    manager.set_solve_mode(SolveMode::Local);
    let err = manager.solve(None).unwrap_err();
    assert!(matches!(err, super::error::DcmError::ModeMismatch));
}

#[test]
fn line_in_circle_is_rejected_through_the_unified_interface() {
    let mut manager = DcmManager::new();
    let line = manager.add_figure(FigureDescriptor::line_coords(0.0, 0.0, 1.0, 0.0)).unwrap();
    let circle = manager.add_figure(FigureDescriptor::circle_coords(0.5, 0.5, 2.0)).unwrap();
    let err = manager.add_requirement(ConstraintDescriptor::new(ConstraintKind::LineInCircle, vec![line, circle], None)).unwrap_err();
    assert!(matches!(err, super::error::DcmError::UnsupportedConstraint(ConstraintKind::LineInCircle)));
}
