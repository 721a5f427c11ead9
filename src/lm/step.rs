//! Step calculation for the Levenberg-Marquardt algorithm.
//!
//! The step `h` solves the damped normal equations `(A + μI) h = −g`,
//! where `A = JᵀJ` and `g = Jᵀr`.

use ndarray::{Array1, Array2};

use crate::error::SolverError;
use crate::utils::{
    nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra,
};

/// Handles step calculation for the Levenberg-Marquardt algorithm.
pub struct LmStep;

impl LmStep {
    /// Solves `(A + μI) h = −g`.
    ///
    /// The system is symmetric positive definite whenever `μ > 0` and the
    /// entries are finite, so a Cholesky factorisation is tried first. If it
    /// fails an LU factorisation is used instead.
    ///
    /// # Arguments
    ///
    /// * `hessian` - The approximate Hessian `A = JᵀJ`
    /// * `gradient` - The gradient `g = Jᵀr`
    /// * `mu` - The damping parameter
    /// * `iteration` - Current iteration, used for error reporting
    ///
    /// # Returns
    ///
    /// * The step `h`, or [`SolverError::SingularSystem`] if neither factorisation succeeds
    pub fn solve(
        hessian: &Array2<f64>,
        gradient: &Array1<f64>,
        mu: f64,
        iteration: usize,
    ) -> Result<Array1<f64>, SolverError> {
        let mut damped = hessian.clone();
        damped.diag_mut().mapv_inplace(|d| d + mu);

        let a = ndarray_to_nalgebra(&damped);
        let rhs = -ndarray_vec_to_nalgebra(gradient);

        if let Some(cholesky) = a.clone().cholesky() {
            return Ok(nalgebra_vec_to_ndarray(&cholesky.solve(&rhs)));
        }

        log::warn!(
            "Cholesky factorisation failed at iteration {} (mu = {:e}), falling back to LU",
            iteration,
            mu
        );
        match a.lu().solve(&rhs) {
            Some(step) => Ok(nalgebra_vec_to_ndarray(&step)),
            None => Err(SolverError::SingularSystem {
                iteration,
                damping: mu,
            }),
        }
    }

    /// Reduction of the cost predicted by the linear model, `½ hᵀ(μh − g)`.
    pub fn predicted_reduction(step: &Array1<f64>, gradient: &Array1<f64>, mu: f64) -> f64 {
        0.5 * step.dot(&(step * mu - gradient))
    }
}
