//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! This module contains the core iteration: damped Gauss-Newton steps with
//! Nielsen's damping update. Steps whose gain ratio is not positive are
//! rejected, which also covers NaN and infinite intermediate values.

use ndarray::Array1;
use std::fmt;

use crate::dataset::Dataset;
use crate::error::{CurveFitError, Result};
use crate::model::CompiledModel;
use crate::problem::{CurveProblem, Problem};

use super::config::SolverConfig;
use super::convergence::Termination;
use super::state::{gain_ratio, initial_damping, FitState, Linearization};
use super::step::LmStep;

/// Result of the Levenberg-Marquardt optimization.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Optimized parameter values
    pub params: Array1<f64>,

    /// Residuals at the returned parameters
    pub residuals: Array1<f64>,

    /// Half the sum of squared residuals at the returned parameters
    pub cost: f64,

    /// Number of iterations performed
    pub iterations: usize,

    /// Why the iteration stopped
    pub termination: Termination,
}

impl fmt::Display for LmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Termination: {}", self.termination)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Parameters: {:?}", self.params.to_vec())?;
        Ok(())
    }
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    /// Configuration options
    config: SolverConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Levenberg-Marquardt optimizer with the given configuration.
    pub fn with_config(config: SolverConfig) -> Self {
        Self { config }
    }

    /// The optimizer's configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Minimize the sum of squared residuals for the given problem.
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem to solve
    /// * `initial_params` - Initial guess for the parameter values
    ///
    /// # Returns
    ///
    /// * `Result<LmResult>` - The result of the optimization. Numerical
    ///   trouble inside the residuals or Jacobian never fails the call; only
    ///   an unsolvable damped system does.
    pub fn minimize<P: Problem>(&self, problem: &P, initial_params: &Array1<f64>) -> Result<LmResult> {
        let n_params = problem.parameter_count();
        if initial_params.len() != n_params {
            return Err(CurveFitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n_params,
                initial_params.len()
            )));
        }

        let mut lin = Linearization::at(problem, initial_params)?;
        let mu = initial_damping(&lin.hessian, self.config.initial_damping_scale);
        let mut state = FitState::new(initial_params.clone(), mu);

        log::debug!(
            "starting LM: {} parameters, {} residuals, mu = {:e}",
            n_params,
            problem.residual_count(),
            mu
        );

        let termination = loop {
            let gradient_norm = lin.gradient_norm();
            if gradient_norm.is_nan() {
                log::warn!(
                    "gradient is not finite after {} iterations, stopping",
                    state.iterations
                );
                break Termination::NonFiniteGradient;
            }
            if gradient_norm < self.config.gradient_tolerance {
                break Termination::GradientTolerance;
            }
            if state.iterations >= self.config.max_iterations {
                break Termination::MaxIterations;
            }

            state.iterations += 1;
            let step = LmStep::solve(&lin.hessian, &lin.gradient, state.mu, state.iterations)?;
            state.propose(&step);

            if state.step_length() <= self.config.step_tolerance {
                let residuals = problem.residuals(&state.params)?;
                log::debug!("step length below tolerance at iteration {}", state.iterations);
                return Ok(LmResult {
                    cost: 0.5 * residuals.dot(&residuals),
                    params: state.params,
                    residuals,
                    iterations: state.iterations,
                    termination: Termination::StepTolerance,
                });
            }

            let new_residuals = problem.residuals(&state.params)?;
            let actual = 0.5 * (lin.sum_of_squares() - new_residuals.dot(&new_residuals));
            let predicted = LmStep::predicted_reduction(&step, &lin.gradient, state.mu);
            let rho = gain_ratio(actual, predicted);

            if rho > 0.0 {
                state.accept(rho);
                lin = Linearization::with_residuals(problem, &state.params, new_residuals)?;
                log::trace!(
                    "iteration {}: accepted, rho = {:.4}, cost = {:e}, mu = {:e}",
                    state.iterations,
                    rho,
                    0.5 * lin.sum_of_squares(),
                    state.mu
                );
            } else {
                state.reject();
                log::trace!(
                    "iteration {}: rejected, rho = {}, mu = {:e}",
                    state.iterations,
                    rho,
                    state.mu
                );
            }
        };

        log::debug!(
            "LM finished after {} iterations: {}",
            state.iterations,
            termination
        );

        Ok(LmResult {
            cost: 0.5 * lin.sum_of_squares(),
            params: state.params,
            residuals: lin.residuals,
            iterations: state.iterations,
            termination,
        })
    }
}

/// Fit a compiled model to data with the default solver settings.
///
/// `initial` must have one entry per model parameter.
pub fn fit(model: &CompiledModel, data: &Dataset, initial: &[f64]) -> Result<LmResult> {
    let problem = CurveProblem::new(model, data);
    LevenbergMarquardt::new().minimize(&problem, &Array1::from_vec(initial.to_vec()))
}
