//! Lowering of expression trees into flat postfix programs.
//!
//! A [`Program`] is a small stack machine: every instruction pops its operands
//! and pushes one column with the same length as the sample array. Evaluation
//! is element-wise with plain IEEE semantics, so a division by zero yields
//! `inf`/`NaN` in the affected rows instead of an error.

use ndarray::{Array1, ArrayView1, Zip};

use super::expression::{BinaryOp, Expression, Function, Variable};

/// One step of a lowered expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    /// Push a constant
    Constant(f64),

    /// Push the sample column
    LoadX,

    /// Push a parameter value
    LoadParam(usize),

    /// Negate the top of the stack
    Neg,

    /// Pop two columns, push `lhs op rhs`
    Binary(BinaryOp),

    /// Apply a function to the top of the stack
    Call(Function),
}

/// A lowered, vectorized evaluator for one expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    instructions: Vec<Instruction>,
    max_stack: usize,
}

impl Program {
    /// Lower an expression tree.
    pub fn lower(expr: &Expression) -> Self {
        let mut instructions = Vec::with_capacity(expr.size());
        emit(expr, &mut instructions);

        let mut depth = 0usize;
        let mut max_stack = 0usize;
        for instruction in &instructions {
            match instruction {
                Instruction::Constant(_) | Instruction::LoadX | Instruction::LoadParam(_) => {
                    depth += 1
                }
                Instruction::Binary(_) => depth -= 1,
                Instruction::Neg | Instruction::Call(_) => {}
            }
            max_stack = max_stack.max(depth);
        }

        Self {
            instructions,
            max_stack,
        }
    }

    /// The lowered instruction sequence.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Evaluate over every sample in `x`.
    ///
    /// [`crate::model::CompiledModel`] checks the parameter count once per
    /// call; a parameter missing from `params` reads as NaN.
    pub(crate) fn eval(&self, x: ArrayView1<f64>, params: &[f64]) -> Array1<f64> {
        let n = x.len();
        let mut stack: Vec<Array1<f64>> = Vec::with_capacity(self.max_stack);

        for instruction in &self.instructions {
            match *instruction {
                Instruction::Constant(value) => stack.push(Array1::from_elem(n, value)),
                Instruction::LoadX => stack.push(x.to_owned()),
                Instruction::LoadParam(i) => {
                    let value = params.get(i).copied().unwrap_or(f64::NAN);
                    stack.push(Array1::from_elem(n, value))
                }
                Instruction::Neg => {
                    if let Some(top) = stack.last_mut() {
                        top.mapv_inplace(|v| -v);
                    }
                }
                Instruction::Call(func) => {
                    if let Some(top) = stack.last_mut() {
                        top.mapv_inplace(|v| func.apply(v));
                    }
                }
                Instruction::Binary(op) => {
                    let rhs = stack.pop();
                    if let (Some(rhs), Some(lhs)) = (rhs, stack.last_mut()) {
                        Zip::from(lhs).and(&rhs).for_each(|l, &r| *l = op.apply(*l, r));
                    }
                }
            }
        }

        // A lowered tree always leaves exactly one column behind.
        stack.pop().unwrap_or_else(|| Array1::from_elem(n, f64::NAN))
    }
}

fn emit(expr: &Expression, out: &mut Vec<Instruction>) {
    match expr {
        Expression::Number(value) => out.push(Instruction::Constant(*value)),
        Expression::Variable(Variable::X) => out.push(Instruction::LoadX),
        Expression::Variable(Variable::Param(i)) => out.push(Instruction::LoadParam(*i)),
        Expression::Neg(inner) => {
            emit(inner, out);
            out.push(Instruction::Neg);
        }
        Expression::Binary(op, left, right) => {
            emit(left, out);
            emit(right, out);
            out.push(Instruction::Binary(*op));
        }
        Expression::Function(func, inner) => {
            emit(inner, out);
            out.push(Instruction::Call(*func));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_lowering_is_postfix() {
        let expr = Expression::parse("param0 * x + 1").unwrap();
        let program = Program::lower(&expr);
        assert_eq!(
            program.instructions(),
            &[
                Instruction::LoadParam(0),
                Instruction::LoadX,
                Instruction::Binary(BinaryOp::Mul),
                Instruction::Constant(1.0),
                Instruction::Binary(BinaryOp::Add),
            ]
        );
    }

    #[test]
    fn test_matches_tree_evaluation() {
        let expr = Expression::parse("var0 + ((var1 - var0)/(1 + exp((var2 - x)/var3)))").unwrap();
        let program = Program::lower(&expr);
        let x = array![-2.0, 0.0, 0.5, 3.0];
        let params = [0.2, 1.8, 0.5, 0.8];
        let y = program.eval(x.view(), &params);
        for (xi, yi) in x.iter().zip(y.iter()) {
            assert_relative_eq!(*yi, expr.evaluate(*xi, &params), epsilon = 1e-14);
        }
    }

    #[test]
    fn test_non_finite_rows_do_not_fail() {
        let program = Program::lower(&Expression::parse("param0 / x + param1").unwrap());
        let y = program.eval(array![0.0, 2.0].view(), &[1.0, 1.0]);
        assert!(y[0].is_infinite());
        assert_relative_eq!(y[1], 1.5);

        let program = Program::lower(&Expression::parse("log(x) * param0").unwrap());
        let y = program.eval(array![-1.0].view(), &[0.0]);
        assert!(y[0].is_nan());
    }

    #[test]
    fn test_short_parameter_slice_reads_nan() {
        let program = Program::lower(&Expression::parse("param0 * x + param1").unwrap());
        let y = program.eval(array![1.0, 2.0].view(), &[3.0]);
        assert!(y.iter().all(|v| v.is_nan()));
    }
}
