//! The three solve modes: full or per-component Levenberg-Marquardt for
//! exact resolves, and a fixed-step gradient descent for the fast,
//! non-exact reseat used while dragging.

mod drag;
mod lm;

use serde::{Deserialize, Serialize};

use super::config::SolverConfig;
use super::constraints::ConstraintFunctionSystem;
use super::geometry::GeometryStore;

/// Which solver a `solve()` call should run. `Local` and `Drag` both take
/// their target component, if any, as the separate `component` argument to
/// [`crate::dcm::manager::DcmManager::solve`] rather than carrying it here
/// — the mode only selects the algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveMode {
    Global,
    Local,
    Drag,
}

/// Outcome of a solve. `converged` is advisory per `SPEC_FULL.md` §7's
/// `SolverDiverged` entry: failing to converge is never a hard error, only
/// a caller-visible boolean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveResult {
    pub converged: bool,
    pub iterations: usize,
    pub final_residual_norm: f64,
}

/// Run the solver appropriate to `mode` against `system`, mutating the
/// scalars in `store` that `system`'s variables reference.
pub fn solve(system: &mut ConstraintFunctionSystem, store: &mut GeometryStore, mode: SolveMode, config: &SolverConfig) -> SolveResult {
    match mode {
        SolveMode::Global | SolveMode::Local => lm::solve_levenberg_marquardt(system, store, config),
        SolveMode::Drag => drag::solve_gradient_descent(system, store, config),
    }
}
