//! Solver working state and Nielsen's damping schedule.
//!
//! Everything the iteration needs is carried explicitly: [`FitState`] holds
//! the parameters and damping, [`Linearization`] the residuals and derived
//! normal-equation terms at the current parameters. Both are owned by a
//! single solver call.

use ndarray::{Array1, Array2};

use crate::error::Result;
use crate::problem::Problem;

/// Residuals, Jacobian, `A = JᵀJ` and `g = Jᵀr` at one parameter vector.
#[derive(Debug, Clone)]
pub struct Linearization {
    /// Residual vector `r(p)`
    pub residuals: Array1<f64>,

    /// Jacobian of the residuals `J(p)`
    pub jacobian: Array2<f64>,

    /// Approximate Hessian `JᵀJ`
    pub hessian: Array2<f64>,

    /// Gradient `Jᵀr`
    pub gradient: Array1<f64>,
}

impl Linearization {
    /// Evaluate residuals and Jacobian at `params`.
    pub fn at<P: Problem>(problem: &P, params: &Array1<f64>) -> Result<Self> {
        let residuals = problem.residuals(params)?;
        Self::with_residuals(problem, params, residuals)
    }

    /// Like [`Linearization::at`], reusing residuals already computed at `params`.
    pub fn with_residuals<P: Problem>(
        problem: &P,
        params: &Array1<f64>,
        residuals: Array1<f64>,
    ) -> Result<Self> {
        let jacobian = problem.jacobian(params)?;
        let hessian = jacobian.t().dot(&jacobian);
        let gradient = jacobian.t().dot(&residuals);
        Ok(Self {
            residuals,
            jacobian,
            hessian,
            gradient,
        })
    }

    /// Sum of squared residuals, `rᵀr`.
    pub fn sum_of_squares(&self) -> f64 {
        self.residuals.dot(&self.residuals)
    }

    /// Infinity norm of the gradient; NaN if any component is NaN.
    pub fn gradient_norm(&self) -> f64 {
        inf_norm(&self.gradient)
    }
}

/// Infinity norm that propagates NaN instead of skipping it.
pub fn inf_norm(v: &Array1<f64>) -> f64 {
    v.iter().fold(0.0_f64, |acc, &x| {
        if acc.is_nan() || x.is_nan() {
            f64::NAN
        } else {
            acc.max(x.abs())
        }
    })
}

/// Mutable state of one Levenberg-Marquardt run.
#[derive(Debug, Clone, PartialEq)]
pub struct FitState {
    /// Current parameter vector `p`
    pub params: Array1<f64>,

    /// Parameters before the most recent proposed step
    pub previous: Array1<f64>,

    /// Damping `μ`
    pub mu: f64,

    /// Damping growth factor `ν`
    pub nu: f64,

    /// Iteration counter `k`
    pub iterations: usize,
}

impl FitState {
    /// Start from `params` with initial damping `mu`.
    pub fn new(params: Array1<f64>, mu: f64) -> Self {
        Self {
            previous: params.clone(),
            params,
            mu,
            nu: 2.0,
            iterations: 0,
        }
    }

    /// Tentatively move to `p + step`, remembering `p`.
    pub fn propose(&mut self, step: &Array1<f64>) {
        self.previous.assign(&self.params);
        self.params += step;
    }

    /// Length of the proposed step, `‖p_new − p_prev‖₂`.
    pub fn step_length(&self) -> f64 {
        (&self.params - &self.previous)
            .iter()
            .map(|d| d * d)
            .sum::<f64>()
            .sqrt()
    }

    /// Keep the proposed step and shrink the damping according to `rho`.
    pub fn accept(&mut self, rho: f64) {
        self.mu *= shrink_factor(rho);
        self.nu = 2.0;
    }

    /// Discard the proposed step and grow the damping.
    pub fn reject(&mut self) {
        self.params.assign(&self.previous);
        self.mu *= self.nu;
        self.nu *= 2.0;
    }
}

/// Initial damping: `scale · max(diag(A))`.
pub fn initial_damping(hessian: &Array2<f64>, scale: f64) -> f64 {
    scale * hessian.diag().iter().fold(f64::NEG_INFINITY, |acc, &d| acc.max(d))
}

/// Gain ratio `ρ = ΔF / ΔL`. NaN inputs yield NaN, which never counts as an improvement.
pub fn gain_ratio(actual_reduction: f64, predicted_reduction: f64) -> f64 {
    actual_reduction / predicted_reduction
}

/// Nielsen's damping reduction factor `max(1/3, 1 − (2ρ − 1)³)`.
pub fn shrink_factor(rho: f64) -> f64 {
    (1.0_f64 / 3.0).max(1.0 - (2.0 * rho - 1.0).powi(3))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_propose_and_reject_restore_params() {
        let mut state = FitState::new(array![1.0, 2.0], 0.5);
        state.propose(&array![0.5, -1.0]);
        assert_eq!(state.params, array![1.5, 1.0]);
        assert_relative_eq!(state.step_length(), 1.25_f64.sqrt());

        state.reject();
        assert_eq!(state.params, array![1.0, 2.0]);
        assert_relative_eq!(state.mu, 1.0);
        assert_relative_eq!(state.nu, 4.0);

        state.propose(&array![0.1, 0.1]);
        state.reject();
        assert_relative_eq!(state.mu, 4.0);
        assert_relative_eq!(state.nu, 8.0);
    }

    #[test]
    fn test_accept_shrinks_damping_and_resets_growth() {
        let mut state = FitState::new(array![1.0], 3.0);
        state.nu = 16.0;
        state.propose(&array![1.0]);
        // rho = 1 gives the maximal reduction to a third
        state.accept(1.0);
        assert_eq!(state.params, array![2.0]);
        assert_relative_eq!(state.mu, 1.0);
        assert_relative_eq!(state.nu, 2.0);
    }

    #[test]
    fn test_shrink_factor() {
        assert_relative_eq!(shrink_factor(0.5), 1.0);
        assert_relative_eq!(shrink_factor(1.0), 1.0 / 3.0);
        assert_relative_eq!(shrink_factor(0.25), 1.125);
    }

    #[test]
    fn test_nan_gain_ratio_is_not_an_improvement() {
        let rho = gain_ratio(f64::NAN, 1.0);
        assert!(!(rho > 0.0));
        let rho = gain_ratio(1.0, f64::NAN);
        assert!(!(rho > 0.0));
    }

    #[test]
    fn test_inf_norm() {
        assert_relative_eq!(inf_norm(&array![1.0, -3.0, 2.0]), 3.0);
        assert!(inf_norm(&array![1.0, f64::NAN]).is_nan());
        assert_eq!(inf_norm(&Array1::zeros(0)), 0.0);
    }

    #[test]
    fn test_initial_damping() {
        let a = array![[4.0, 1.0], [1.0, 9.0]];
        assert_relative_eq!(initial_damping(&a, 1e-3), 9e-3);
    }
}
