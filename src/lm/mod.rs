//! Levenberg-Marquardt algorithm implementation.
//!
//! This module provides the nonlinear least-squares solver used for curve
//! fitting: damped normal equations solved by Cholesky factorisation, with
//! Nielsen's schedule for the damping parameter.

pub mod algorithm;
pub mod config;
pub mod convergence;
pub mod state;
pub mod step;

// Re-export key types
pub use algorithm::{fit, LevenbergMarquardt, LmResult};
pub use config::SolverConfig;
pub use convergence::Termination;
pub use state::{FitState, Linearization};
pub use step::LmStep;
