//! Problem definition trait and the curve-fitting implementation.
//!
//! This module defines the `Problem` trait, which represents a nonlinear
//! least squares problem to be solved with the Levenberg-Marquardt algorithm,
//! and [`CurveProblem`], which binds a compiled model to a dataset.

use ndarray::{Array1, Array2};

use crate::dataset::Dataset;
use crate::error::Result;
use crate::model::CompiledModel;

/// A trait representing a nonlinear least squares problem.
///
/// This trait defines the interface for problems that can be solved using
/// the Levenberg-Marquardt algorithm.
pub trait Problem {
    /// Evaluate the residuals at the given parameters.
    ///
    /// # Arguments
    ///
    /// * `params` - The parameter values at which to evaluate the residuals
    ///
    /// # Returns
    ///
    /// * A vector of residuals, or an error if the evaluation fails
    fn residuals(&self, params: &Array1<f64>) -> Result<Array1<f64>>;

    /// Evaluate the Jacobian of the residuals at the given parameters.
    ///
    /// Row `k`, column `i` holds `∂r_k/∂p_i`.
    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>>;

    /// Get the number of parameters in the problem.
    fn parameter_count(&self) -> usize;

    /// Get the number of residuals in the problem.
    fn residual_count(&self) -> usize;

    /// Half the sum of squared residuals at the given parameters.
    fn cost(&self, params: &Array1<f64>) -> Result<f64> {
        let residuals = self.residuals(params)?;
        Ok(0.5 * residuals.dot(&residuals))
    }
}

/// Least-squares fit of a compiled model to a dataset.
///
/// Residuals are `y - f(x; p)`, so the Jacobian columns are the negated
/// partial derivatives of the model.
#[derive(Debug, Clone, Copy)]
pub struct CurveProblem<'a> {
    model: &'a CompiledModel,
    data: &'a Dataset,
}

impl<'a> CurveProblem<'a> {
    /// Bind a model to the data it should be fitted against.
    pub fn new(model: &'a CompiledModel, data: &'a Dataset) -> Self {
        Self { model, data }
    }

    /// The model being fitted.
    pub fn model(&self) -> &CompiledModel {
        self.model
    }

    /// The observations.
    pub fn data(&self) -> &Dataset {
        self.data
    }
}

impl Problem for CurveProblem<'_> {
    fn residuals(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let predicted = self.model.eval(self.data.x(), &params.to_vec())?;
        Ok(&self.data.y() - &predicted)
    }

    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
        let jac = self.model.jacobian(self.data.x(), &params.to_vec())?;
        Ok(-jac)
    }

    fn parameter_count(&self) -> usize {
        self.model.arity()
    }

    fn residual_count(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::compile;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn linear_problem() -> (CompiledModel, Dataset) {
        let model = compile("param0 * x + param1").unwrap();
        // y = 2x
        let data = Dataset::new(vec![1.0, 2.0, 3.0, 4.0, 5.0], vec![2.0, 4.0, 6.0, 8.0, 10.0])
            .unwrap();
        (model, data)
    }

    #[test]
    fn test_linear_model_residuals() {
        let (model, data) = linear_problem();
        let problem = CurveProblem::new(&model, &data);

        let residuals = problem.residuals(&array![2.0, 0.0]).unwrap();
        assert_eq!(residuals.len(), 5);
        for r in residuals.iter() {
            assert_relative_eq!(*r, 0.0, epsilon = 1e-10);
        }

        // Parameters [a, b] = [1, 0] leave residuals equal to x
        let residuals = problem.residuals(&array![1.0, 0.0]).unwrap();
        for (i, r) in residuals.iter().enumerate() {
            assert_relative_eq!(*r, (i as f64) + 1.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_linear_model_jacobian() {
        let (model, data) = linear_problem();
        let problem = CurveProblem::new(&model, &data);

        let jacobian = problem.jacobian(&array![2.0, 0.0]).unwrap();
        assert_eq!(jacobian.shape(), &[5, 2]);
        for i in 0..5 {
            assert_eq!(jacobian[[i, 0]], -data.x()[i]);
            assert_eq!(jacobian[[i, 1]], -1.0);
        }
    }

    #[test]
    fn test_cost() {
        let (model, data) = linear_problem();
        let problem = CurveProblem::new(&model, &data);

        assert_relative_eq!(problem.cost(&array![2.0, 0.0]).unwrap(), 0.0);
        let expected = 0.5 * (1..=5).map(|i| (i as f64).powi(2)).sum::<f64>();
        assert_relative_eq!(problem.cost(&array![1.0, 0.0]).unwrap(), expected);
        assert_eq!(problem.parameter_count(), 2);
        assert_eq!(problem.residual_count(), 5);
    }
}
