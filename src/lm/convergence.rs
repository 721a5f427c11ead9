//! Termination reasons for the solver loop.

use serde::Serialize;
use std::fmt;

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The gradient's infinity norm fell below the tolerance.
    GradientTolerance,

    /// The gradient contains NaN, so no step direction exists. The last
    /// accepted parameters are returned unchanged.
    NonFiniteGradient,

    /// A proposed step was numerically negligible; its endpoint is returned.
    StepTolerance,

    /// The iteration cap was reached.
    MaxIterations,
}

impl Termination {
    /// Returns true if the solver stopped at a stationary point.
    pub fn is_converged(&self) -> bool {
        matches!(self, Termination::GradientTolerance | Termination::StepTolerance)
    }

    /// Returns a description of the termination reason.
    pub fn description(&self) -> &'static str {
        match self {
            Termination::GradientTolerance => "Converged: small gradient",
            Termination::NonFiniteGradient => "Terminated: gradient is not finite",
            Termination::StepTolerance => "Converged: negligible step",
            Termination::MaxIterations => "Terminated: maximum iterations reached",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
