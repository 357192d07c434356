//! Fixed-step gradient descent for the DRAG mode: a fast, non-exact
//! resettle run automatically after an interactive `updatePoint`/
//! `updateCircle` call, per `SPEC_FULL.md` §4.7.

use tracing::trace;

use super::super::config::SolverConfig;
use super::super::constraints::ConstraintFunctionSystem;
use super::super::geometry::GeometryStore;
use super::SolveResult;

pub fn solve_gradient_descent(system: &mut ConstraintFunctionSystem, store: &mut GeometryStore, config: &SolverConfig) -> SolveResult {
    let n = system.variables().len();
    if system.functions().is_empty() || n == 0 {
        return SolveResult { converged: true, iterations: 0, final_residual_norm: 0.0 };
    }

    for iteration in 0..config.drag_max_iterations {
        system.update_jacobian(store);
        let residuals = system.residuals(store);
        let residual_sq: f64 = residuals.iter().map(|r| r * r).sum();
        if residual_sq.sqrt() <= config.epsilon_abs {
            return SolveResult { converged: true, iterations: iteration, final_residual_norm: residual_sq.sqrt() };
        }

        let jtr = system.jtr_dense(&residuals);
        let step = &jtr * config.drag_step;

        let param_norm: f64 = system.variables().iter().map(|v| store.scalar(*v).powi(2)).sum::<f64>().sqrt();
        for (var, delta) in system.variables().iter().zip(step.iter()) {
            let current = store.scalar(*var);
            store.set_scalar(*var, current - delta);
        }

        trace!(target: "dcm::solver::drag", iteration, residual_sq, "drag step");

        if step.norm() <= config.epsilon_rel * (param_norm + config.epsilon_rel) {
            return SolveResult { converged: true, iterations: iteration + 1, final_residual_norm: residual_sq.sqrt() };
        }
    }

    let residuals = system.residuals(store);
    let residual_sq: f64 = residuals.iter().map(|r| r * r).sum();
    SolveResult {
        converged: residual_sq.sqrt() <= config.epsilon_abs,
        iterations: config.drag_max_iterations,
        final_residual_norm: residual_sq.sqrt(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dcm::constraints::ConstraintFunction;

    #[test]
    fn nudges_toward_target_distance() {
        let mut store = GeometryStore::new();
        let p1 = store.create_point(0.0, 0.0);
        let p2 = store.create_point(6.0, 0.0);
        let mut system = ConstraintFunctionSystem::new();
        system.add_function(ConstraintFunction::PointPointDist { p: p1, q: p2, distance: 5.0, weight: 1.0 });
        let config = SolverConfig::default();
        let before = {
            let a = store.get_point(p1).unwrap();
            let b = store.get_point(p2).unwrap();
            ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt()
        };
        solve_gradient_descent(&mut system, &mut store, &config);
        let after = {
            let a = store.get_point(p1).unwrap();
            let b = store.get_point(p2).unwrap();
            ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt()
        };
        assert!((after - 5.0).abs() < (before - 5.0).abs());
    }
}
