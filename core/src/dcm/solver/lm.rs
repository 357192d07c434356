//! Sparse Levenberg-Marquardt: used for both GLOBAL and LOCAL modes, the
//! only difference being which constraints `system` was assembled from.
//!
//! The damping/gain-ratio control flow follows the Gauss-Newton/LM pattern
//! in `sequoia-hope-waffle-iron`'s `crates/solver/src/solver.rs`,
//! generalized from that solver's flat `Vec<f64>` parameter buffer and
//! dense hand-rolled elimination to `nalgebra`'s sparse Jacobian and dense
//! Cholesky/SVD factorizations.

use nalgebra::DVector;
use tracing::trace;

use super::super::config::SolverConfig;
use super::super::constraints::ConstraintFunctionSystem;
use super::super::geometry::GeometryStore;
use super::SolveResult;

pub fn solve_levenberg_marquardt(system: &mut ConstraintFunctionSystem, store: &mut GeometryStore, config: &SolverConfig) -> SolveResult {
    let n = system.variables().len();
    if system.functions().is_empty() || n == 0 {
        return SolveResult { converged: true, iterations: 0, final_residual_norm: 0.0 };
    }

    let mut lambda = config.lambda_initial;
    let mut nu = config.nu_initial;

    system.update_jacobian(store);
    let mut residuals = system.residuals(store);
    let mut residual_sq: f64 = residuals.iter().map(|r| r * r).sum();

    for iteration in 0..config.max_iterations {
        if residual_sq.sqrt() <= config.epsilon_abs {
            trace!(target: "dcm::solver::lm", iteration, residual_sq, lambda, "converged on residual norm");
            return SolveResult { converged: true, iterations: iteration, final_residual_norm: residual_sq.sqrt() };
        }

        let jtj = system.jtj_dense();
        let jtr = system.jtr_dense(&residuals);
        let neg_jtr = -&jtr;

        let mut accepted = false;
        let mut delta = DVector::zeros(n);
        for _ in 0..10 {
            let mut damped = jtj.clone();
            for i in 0..n {
                damped[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
            }

            let candidate = match damped.clone().cholesky() {
                Some(chol) => Some(chol.solve(&neg_jtr)),
                None => damped.clone().svd(true, true).solve(&neg_jtr, 1e-12).ok(),
            };

            let Some(step) = candidate else {
                lambda *= nu;
                nu *= 2.0;
                continue;
            };

            let mut trial_store = store.clone();
            apply_step(system, &mut trial_store, &step);
            let trial_residuals = system_residuals_after_step(system, &trial_store);
            let trial_sq: f64 = trial_residuals.iter().map(|r| r * r).sum();

            let predicted_gain = step.dot(&(lambda * &step - &jtr));
            let rho = if predicted_gain.abs() > 1e-300 { (residual_sq - trial_sq) / predicted_gain } else { 0.0 };

            if rho > 0.0 {
                *store = trial_store;
                residuals = trial_residuals;
                residual_sq = trial_sq;
                delta = step;
                lambda *= (1.0 / 3.0_f64).max(1.0 - (2.0 * rho - 1.0).powi(3));
                nu = config.nu_initial;
                accepted = true;
                break;
            } else {
                lambda *= nu;
                nu *= 2.0;
            }
        }

        trace!(target: "dcm::solver::lm", iteration, residual_sq, lambda, accepted, "lm step");

        if !accepted {
            return SolveResult { converged: false, iterations: iteration, final_residual_norm: residual_sq.sqrt() };
        }

        let param_norm: f64 = system.variables().iter().map(|v| store.scalar(*v).powi(2)).sum::<f64>().sqrt();
        if delta.norm() <= config.epsilon_rel * (param_norm + config.epsilon_rel) {
            return SolveResult { converged: true, iterations: iteration + 1, final_residual_norm: residual_sq.sqrt() };
        }

        system.update_jacobian(store);
    }

    SolveResult { converged: residual_sq.sqrt() <= config.epsilon_abs, iterations: config.max_iterations, final_residual_norm: residual_sq.sqrt() }
}

fn apply_step(system: &ConstraintFunctionSystem, store: &mut GeometryStore, step: &DVector<f64>) {
    for (var, delta) in system.variables().iter().zip(step.iter()) {
        let current = store.scalar(*var);
        store.set_scalar(*var, current + delta);
    }
}

fn system_residuals_after_step(system: &ConstraintFunctionSystem, store: &GeometryStore) -> Vec<f64> {
    system.residuals(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dcm::constraints::ConstraintFunction;

    #[test]
    fn empty_system_converges_immediately() {
        let mut system = ConstraintFunctionSystem::new();
        let mut store = GeometryStore::new();
        let result = solve_levenberg_marquardt(&mut system, &mut store, &SolverConfig::default());
        assert!(result.converged);
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn settles_two_points_to_target_distance() {
        let mut store = GeometryStore::new();
        let p1 = store.create_point(0.0, 0.0);
        let p2 = store.create_point(3.0, 0.0);
        let mut system = ConstraintFunctionSystem::new();
        system.add_function(ConstraintFunction::PointPointDist { p: p1, q: p2, distance: 5.0, weight: 1.0 });
        let config = SolverConfig::default();
        let result = solve_levenberg_marquardt(&mut system, &mut store, &config);
        assert!(result.converged);
        let a = store.get_point(p1).unwrap();
        let b = store.get_point(p2).unwrap();
        let dist = ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt();
        assert!((dist - 5.0).abs() < 0.1, "dist = {dist}");
    }
}
