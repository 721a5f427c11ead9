//! Configuration options for the Levenberg-Marquardt solver.
//!
//! The defaults are the solver's contract constants: iteration counts and
//! fitted values reported by the solver are only reproducible with them.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Configuration options for the Levenberg-Marquardt solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Maximum number of iterations. Default: 200
    pub max_iterations: usize,

    /// Stop once the infinity norm of the gradient falls below this. Default: 1e-15
    pub gradient_tolerance: f64,

    /// Stop in place once a proposed step is no longer than this. Default: 1e-20
    pub step_tolerance: f64,

    /// Initial damping is this times the largest diagonal entry of `JᵀJ`. Default: 1e-3
    pub initial_damping_scale: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            gradient_tolerance: 1e-15,
            step_tolerance: 1e-20,
            initial_damping_scale: 1e-3,
        }
    }
}

impl SolverConfig {
    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the tolerance for the gradient norm.
    pub fn with_gradient_tolerance(mut self, tolerance: f64) -> Self {
        self.gradient_tolerance = tolerance;
        self
    }

    /// Set the tolerance for the step length.
    pub fn with_step_tolerance(mut self, tolerance: f64) -> Self {
        self.step_tolerance = tolerance;
        self
    }

    /// Set the scale of the initial damping.
    pub fn with_initial_damping_scale(mut self, scale: f64) -> Self {
        self.initial_damping_scale = scale;
        self
    }

    /// Load a configuration from JSON; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
