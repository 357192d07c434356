//! Assembles active [`ConstraintFunction`]s into a residual vector and a
//! sparse Jacobian, and diagnoses the resulting system's rank.

use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CscMatrix};

use super::super::config::DiagnoserConfig;
use super::super::geometry::{GeometryStore, VarRef};
use super::function::ConstraintFunction;

/// Result of [`ConstraintFunctionSystem::diagnose`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemStatus {
    Empty,
    WellConstrained,
    SingularSystem,
    UnderConstrained,
    OverConstrained,
    Unknown,
}

/// An ordered list of active constraint functions plus the deduplicated,
/// insertion-ordered list of scalar references they read.
#[derive(Debug, Clone, Default)]
pub struct ConstraintFunctionSystem {
    functions: Vec<ConstraintFunction>,
    variables: Vec<VarRef>,
    jacobian: Option<CscMatrix<f64>>,
}

impl ConstraintFunctionSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `f`, and append any of its variables not already present to
    /// the variable list, preserving first-appearance order.
    pub fn add_function(&mut self, f: ConstraintFunction) {
        for var in f.vars() {
            if !self.variables.contains(&var) {
                self.variables.push(var);
            }
        }
        self.functions.push(f);
    }

    pub fn functions(&self) -> &[ConstraintFunction] {
        &self.functions
    }

    pub fn variables(&self) -> &[VarRef] {
        &self.variables
    }

    pub fn clear(&mut self) {
        self.functions.clear();
        self.variables.clear();
        self.jacobian = None;
    }

    /// Dense residual vector, `r[i] = weight_i * f_i.evaluate()`.
    pub fn residuals(&self, store: &GeometryStore) -> Vec<f64> {
        self.functions.iter().map(|f| f.weight() * f.evaluate(store)).collect()
    }

    /// Rebuild the sparse Jacobian via triplet accumulation, then compress.
    /// `J[i, j] = weight_i * d(f_i)/d(var_j)`, zeros omitted.
    pub fn update_jacobian(&mut self, store: &GeometryStore) {
        let rows = self.functions.len();
        let cols = self.variables.len();
        let mut coo = CooMatrix::new(rows, cols);
        for (i, f) in self.functions.iter().enumerate() {
            let weight = f.weight();
            for (var, partial) in f.gradient(store) {
                if partial == 0.0 {
                    continue;
                }
                if let Some(j) = self.variables.iter().position(|v| *v == var) {
                    coo.push(i, j, weight * partial);
                }
            }
        }
        self.jacobian = Some(CscMatrix::from(&coo));
    }

    pub fn jacobian(&self) -> Option<&CscMatrix<f64>> {
        self.jacobian.as_ref()
    }

    /// `JᵀJ` as a dense matrix — the normal-equations matrix the LM solver
    /// damps and factors.
    pub fn jtj_dense(&self) -> DMatrix<f64> {
        let n = self.variables.len();
        let Some(j) = &self.jacobian else {
            return DMatrix::zeros(n, n);
        };
        let jt = j.transpose();
        let product = &jt * j;
        dense_from_csc(&product)
    }

    /// `Jᵀr` as a dense vector.
    pub fn jtr_dense(&self, residuals: &[f64]) -> nalgebra::DVector<f64> {
        let n = self.variables.len();
        let Some(j) = &self.jacobian else {
            return nalgebra::DVector::zeros(n);
        };
        let r = nalgebra::DVector::from_row_slice(residuals);
        let jt = j.transpose();
        &jt * r
    }

    /// Classify the current Jacobian's numerical rank per
    /// `SPEC_FULL.md` §4.8.
    pub fn diagnose(&self, config: &DiagnoserConfig) -> SystemStatus {
        let m = self.functions.len();
        let n = self.variables.len();
        if m == 0 || n == 0 {
            return SystemStatus::Empty;
        }
        let Some(j) = &self.jacobian else {
            return SystemStatus::Empty;
        };
        let dense = dense_from_csc(j);
        let svd = dense.svd(false, false);
        let rank = svd.singular_values.iter().filter(|s| **s > config.rank_threshold).count();
        let min_dim = m.min(n);
        if m == n && rank == n {
            SystemStatus::WellConstrained
        } else if rank < min_dim {
            SystemStatus::SingularSystem
        } else if m < n {
            SystemStatus::UnderConstrained
        } else if m > n {
            SystemStatus::OverConstrained
        } else {
            SystemStatus::Unknown
        }
    }
}

fn dense_from_csc(m: &CscMatrix<f64>) -> DMatrix<f64> {
    let mut dense = DMatrix::zeros(m.nrows(), m.ncols());
    for (row, col, value) in m.triplet_iter() {
        dense[(row, col)] = *value;
    }
    dense
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dcm::geometry::GeometryStore;

    #[test]
    fn empty_system_is_empty() {
        let system = ConstraintFunctionSystem::new();
        let config = DiagnoserConfig::default();
        assert_eq!(system.diagnose(&config), SystemStatus::Empty);
    }

    #[test]
    fn variable_list_is_deduplicated() {
        let mut store = GeometryStore::new();
        let p1 = store.create_point(0.0, 0.0);
        let p2 = store.create_point(3.0, 4.0);
        let mut system = ConstraintFunctionSystem::new();
        system.add_function(ConstraintFunction::PointPointDist { p: p1, q: p2, distance: 5.0, weight: 1.0 });
        system.add_function(ConstraintFunction::PointOnPoint { p: p1, q: p2, weight: 1.0 });
        assert_eq!(system.variables().len(), 4);
    }

    #[test]
    fn well_constrained_single_distance() {
        let mut store = GeometryStore::new();
        let p1 = store.create_point(0.0, 0.0);
        let p2 = store.create_point(3.0, 4.0);
        let mut system = ConstraintFunctionSystem::new();
        // Pin p1's two scalars plus the one distance residual: 3 residuals, 3 free vars out of 4.
        system.add_function(ConstraintFunction::PointPointDist { p: p1, q: p2, distance: 5.0, weight: 1.0 });
        system.update_jacobian(&store);
        let status = system.diagnose(&DiagnoserConfig::default());
        assert_eq!(status, SystemStatus::UnderConstrained);
    }
}
