//! Parsed models with cached derivatives, and their compiled evaluators.

use ndarray::{Array1, Array2, ArrayView1};

use super::expression::Expression;
use super::program::Program;
use crate::error::{CurveFitError, ModelError, Result, MAX_ARITY, MIN_ARITY};

/// A validated model expression together with its partial derivatives.
///
/// The derivative trees are built once, when the expression is parsed, and
/// live as long as the expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelExpression {
    source: String,
    expression: Expression,
    derivatives: Vec<Expression>,
}

impl ModelExpression {
    /// Parse `text`, enforce the arity rules, and differentiate symbolically.
    pub fn parse(text: &str) -> std::result::Result<Self, ModelError> {
        let expression = Expression::parse(text)?;

        let indices: Vec<usize> = expression.parameters().into_iter().collect();
        let arity = indices.len();
        let contiguous = indices.iter().enumerate().all(|(pos, &idx)| pos == idx);
        if !contiguous || !(MIN_ARITY..=MAX_ARITY).contains(&arity) {
            return Err(ModelError::UnsupportedArity { indices });
        }

        let derivatives: Vec<Expression> = (0..arity).map(|i| expression.derivative(i)).collect();
        for (i, d) in derivatives.iter().enumerate() {
            log::debug!("d/dparam{} {} = {}", i, expression, d);
        }

        Ok(Self {
            source: text.to_string(),
            expression,
            derivatives,
        })
    }

    /// The text the model was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The expression tree.
    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Partial derivative trees, one per parameter.
    pub fn derivatives(&self) -> &[Expression] {
        &self.derivatives
    }

    /// Number of free parameters.
    pub fn arity(&self) -> usize {
        self.derivatives.len()
    }
}

/// Vectorized evaluators for a model and its partial derivatives.
///
/// Holds no interior mutability; a single instance may be shared across
/// threads, and compiling the same text twice yields identical evaluators.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledModel {
    model: ModelExpression,
    function: Program,
    partials: Vec<Program>,
}

impl CompiledModel {
    /// Lower a parsed model into evaluators.
    pub fn new(model: ModelExpression) -> Self {
        let function = Program::lower(model.expression());
        let partials = model.derivatives().iter().map(Program::lower).collect();
        Self {
            model,
            function,
            partials,
        }
    }

    /// The parsed model.
    pub fn model(&self) -> &ModelExpression {
        &self.model
    }

    /// Number of free parameters.
    pub fn arity(&self) -> usize {
        self.partials.len()
    }

    fn check_params(&self, params: &[f64]) -> Result<()> {
        if params.len() != self.arity() {
            return Err(CurveFitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                self.arity(),
                params.len()
            )));
        }
        Ok(())
    }

    /// Evaluate `f(x; p)` for every sample.
    pub fn eval(&self, x: ArrayView1<f64>, params: &[f64]) -> Result<Array1<f64>> {
        self.check_params(params)?;
        Ok(self.function.eval(x, params))
    }

    /// Evaluate `∂f/∂p_index(x; p)` for every sample.
    pub fn partial(&self, index: usize, x: ArrayView1<f64>, params: &[f64]) -> Result<Array1<f64>> {
        self.check_params(params)?;
        let program = self.partials.get(index).ok_or_else(|| {
            CurveFitError::DimensionMismatch(format!(
                "Parameter index {} out of range for a model with {} parameters",
                index,
                self.arity()
            ))
        })?;
        Ok(program.eval(x, params))
    }

    /// Model Jacobian: column `i` holds `∂f/∂p_i` at every sample.
    pub fn jacobian(&self, x: ArrayView1<f64>, params: &[f64]) -> Result<Array2<f64>> {
        self.check_params(params)?;
        let mut jac = Array2::zeros((x.len(), self.arity()));
        for (i, program) in self.partials.iter().enumerate() {
            jac.column_mut(i).assign(&program.eval(x, params));
        }
        Ok(jac)
    }
}

/// Compile model text into an evaluator and its derivative evaluators.
pub fn compile(text: &str) -> std::result::Result<CompiledModel, ModelError> {
    ModelExpression::parse(text).map(CompiledModel::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_arity_detection() {
        assert_eq!(compile("param0 * x + param1").unwrap().arity(), 2);
        assert_eq!(compile("var0 + var1 * exp(-var2 * x)").unwrap().arity(), 3);
        assert_eq!(
            compile("param0 + param1 * x + param2 * x^2 + param3 * x^3")
                .unwrap()
                .arity(),
            4
        );
    }

    #[test]
    fn test_arity_rejection() {
        for (text, expected) in [
            ("param0 * x", vec![0]),
            ("x + 1", vec![]),
            ("param0 + param2 * x", vec![0, 2]),
            ("param1 + param2 * x", vec![1, 2]),
            ("param0 + param1 + param2 + param3 + param4 * x", vec![0, 1, 2, 3, 4]),
        ] {
            match compile(text) {
                Err(ModelError::UnsupportedArity { indices }) => assert_eq!(indices, expected),
                other => panic!("Expected UnsupportedArity for {:?}, got {:?}", text, other),
            }
        }
    }

    #[test]
    fn test_mixed_parameter_spellings() {
        let model = compile("var0 * x + param1").unwrap();
        assert_eq!(model.arity(), 2);
        let y = model.eval(array![2.0].view(), &[3.0, 1.0]).unwrap();
        assert_relative_eq!(y[0], 7.0);
    }

    #[test]
    fn test_eval_and_jacobian() {
        let model = compile("(var0 * x) / (var1 + x)").unwrap();
        let x = array![1.0, 2.0, 4.0];
        let p = [2.0, 1.5];

        let y = model.eval(x.view(), &p).unwrap();
        assert_relative_eq!(y[1], 2.0 * 2.0 / 3.5);

        let jac = model.jacobian(x.view(), &p).unwrap();
        assert_eq!(jac.shape(), &[3, 2]);
        for (row, &xi) in x.iter().enumerate() {
            assert_relative_eq!(jac[[row, 0]], xi / (1.5 + xi), epsilon = 1e-14);
            assert_relative_eq!(
                jac[[row, 1]],
                -2.0 * xi / (1.5 + xi).powi(2),
                epsilon = 1e-14
            );
        }

        let d1 = model.partial(1, x.view(), &p).unwrap();
        assert_eq!(d1, jac.column(1).to_owned());
    }

    #[test]
    fn test_parameter_count_checked() {
        let model = compile("param0 * x + param1").unwrap();
        assert!(matches!(
            model.eval(array![1.0].view(), &[1.0]),
            Err(CurveFitError::DimensionMismatch(_))
        ));
        assert!(matches!(
            model.partial(2, array![1.0].view(), &[1.0, 2.0]),
            Err(CurveFitError::DimensionMismatch(_))
        ));
    }
}
