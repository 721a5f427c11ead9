//! Request-level fitting API.
//!
//! [`CurveFit`] bundles a compiled model with solver settings and turns a
//! dataset plus initial guess into a [`FitReport`]. Independent requests can
//! be solved in parallel with [`fit_batch`].

use ndarray::Array1;
use rayon::prelude::*;
use serde::Serialize;

use crate::dataset::Dataset;
use crate::error::{CurveFitError, Result};
use crate::lm::{LevenbergMarquardt, SolverConfig, Termination};
use crate::model::{compile, BuiltinModel, CompiledModel};
use crate::problem::CurveProblem;

/// Spacing of resampled x values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisScale {
    /// Evenly spaced samples
    #[default]
    Linear,
    /// Samples evenly spaced in `log10(x)`; requires positive x
    Log,
}

/// Outcome of a single fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitReport {
    /// Number of solver iterations
    pub iterations: usize,

    /// Fitted parameters, `params[i]` belongs to `param{i}`
    pub params: Vec<f64>,

    /// Why the solver stopped
    pub termination: Termination,

    /// Half the sum of squared residuals at `params`
    pub cost: f64,

    /// Coefficient of determination, absent when the observations are constant
    pub r_squared: Option<f64>,
}

impl FitReport {
    /// Serialize the report as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A compiled model ready to be fitted.
#[derive(Debug, Clone)]
pub struct CurveFit {
    model: CompiledModel,
    config: SolverConfig,
}

impl CurveFit {
    /// Compile a model expression.
    pub fn new(expression: &str) -> Result<Self> {
        Ok(Self::from_compiled(compile(expression)?))
    }

    /// Compile one of the built-in model families.
    pub fn builtin(model: BuiltinModel) -> Result<Self> {
        Ok(Self::from_compiled(model.compile()?))
    }

    /// Wrap an already compiled model.
    pub fn from_compiled(model: CompiledModel) -> Self {
        Self {
            model,
            config: SolverConfig::default(),
        }
    }

    /// Replace the solver configuration.
    pub fn with_config(mut self, config: SolverConfig) -> Self {
        self.config = config;
        self
    }

    /// The compiled model.
    pub fn model(&self) -> &CompiledModel {
        &self.model
    }

    /// The solver configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Fit the model to `data` starting from `initial`.
    pub fn fit(&self, data: &Dataset, initial: &[f64]) -> Result<FitReport> {
        if initial.len() != self.model.arity() {
            return Err(CurveFitError::DimensionMismatch(format!(
                "model has {} parameters but {} initial values were given",
                self.model.arity(),
                initial.len()
            )));
        }

        let problem = CurveProblem::new(&self.model, data);
        let result = LevenbergMarquardt::with_config(self.config)
            .minimize(&problem, &Array1::from_vec(initial.to_vec()))?;

        log::debug!(
            "fitted '{}' to {} points in {} iterations ({})",
            self.model.model().source(),
            data.len(),
            result.iterations,
            result.termination
        );

        Ok(FitReport {
            iterations: result.iterations,
            r_squared: r_squared(data, &result.residuals),
            params: result.params.to_vec(),
            termination: result.termination,
            cost: result.cost,
        })
    }

    /// Evaluate the fitted curve at `points` x values spanning the data's x range.
    ///
    /// Returns the resampled x values and the model values there.
    pub fn sample_curve(
        &self,
        report: &FitReport,
        data: &Dataset,
        points: usize,
        scale: AxisScale,
    ) -> Result<(Array1<f64>, Array1<f64>)> {
        if points < 2 {
            return Err(CurveFitError::InvalidInput(format!(
                "at least 2 sample points are required, got {}",
                points
            )));
        }

        let (lo, hi) = data.x_range();
        let x = match scale {
            AxisScale::Linear => Array1::linspace(lo, hi, points),
            AxisScale::Log => {
                if lo <= 0.0 {
                    return Err(CurveFitError::InvalidInput(format!(
                        "log-spaced sampling needs positive x, smallest is {}",
                        lo
                    )));
                }
                Array1::logspace(10.0, lo.log10(), hi.log10(), points)
            }
        };
        let y = self.model.eval(x.view(), &report.params)?;
        Ok((x, y))
    }
}

/// `1 - SS_res / SS_tot`, or `None` when the observations have no spread.
fn r_squared(data: &Dataset, residuals: &Array1<f64>) -> Option<f64> {
    let y = data.y();
    let mean = y.sum() / y.len() as f64;
    let ss_tot: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return None;
    }
    Some(1.0 - residuals.dot(residuals) / ss_tot)
}

/// One independent fit: model text, observations and initial guess.
#[derive(Debug, Clone)]
pub struct FitRequest {
    /// Model expression text
    pub expression: String,

    /// Observations
    pub data: Dataset,

    /// Initial parameter guess
    pub initial: Vec<f64>,
}

impl FitRequest {
    /// Create a request.
    pub fn new(expression: impl Into<String>, data: Dataset, initial: Vec<f64>) -> Self {
        Self {
            expression: expression.into(),
            data,
            initial,
        }
    }
}

/// Solve independent requests in parallel.
///
/// Each request compiles its own model and runs its own solver; the results
/// come back in request order.
pub fn fit_batch(requests: &[FitRequest], config: SolverConfig) -> Vec<Result<FitReport>> {
    requests
        .par_iter()
        .map(|request| -> Result<FitReport> {
            CurveFit::new(&request.expression)?
                .with_config(config)
                .fit(&request.data, &request.initial)
        })
        .collect()
}
