//! Numeric constants for the solver and diagnoser, gathered into one place
//! instead of inlined as magic numbers through the solve loop.

/// Tuning knobs for both Levenberg-Marquardt modes (GLOBAL/LOCAL) and the
/// fixed-step gradient descent used by DRAG.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    /// Residual-norm convergence threshold for LM.
    pub epsilon_abs: f64,
    /// Relative parameter-step convergence threshold, shared by LM and drag.
    pub epsilon_rel: f64,
    /// Hard cap on LM iterations.
    pub max_iterations: usize,
    /// Initial Levenberg-Marquardt damping factor `lambda`.
    pub lambda_initial: f64,
    /// Initial damping growth multiplier `nu`, doubled on each rejected step.
    pub nu_initial: f64,
    /// Fixed step size used by the DRAG gradient-descent mode.
    pub drag_step: f64,
    /// Hard cap on DRAG iterations.
    pub drag_max_iterations: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            epsilon_abs: 1e-8,
            epsilon_rel: 1e-8,
            max_iterations: 200,
            lambda_initial: 1e-3,
            nu_initial: 2.0,
            drag_step: 0.01,
            drag_max_iterations: 200,
        }
    }
}

/// Tuning knobs for [`crate::dcm::constraints::system::ConstraintFunctionSystem::diagnose`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiagnoserConfig {
    /// Singular values at or below this threshold are treated as zero when
    /// computing the Jacobian's numerical rank.
    pub rank_threshold: f64,
}

impl Default for DiagnoserConfig {
    fn default() -> Self {
        Self { rank_threshold: 1e-8 }
    }
}
