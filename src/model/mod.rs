//! Model compiler.
//!
//! Turns model text into a [`CompiledModel`]: a vectorized evaluator for
//! `f(x; p)` plus one evaluator per parameter for `∂f/∂p_i`, derived by
//! symbolic differentiation of the parsed expression.
//!
//! ```
//! use curvefit_rs::model::compile;
//! use ndarray::array;
//!
//! let model = compile("(param0 * x) / (param1 + x)").unwrap();
//! assert_eq!(model.arity(), 2);
//!
//! let y = model.eval(array![1.0, 3.0].view(), &[2.0, 1.0]).unwrap();
//! assert_eq!(y, array![1.0, 1.5]);
//! ```

pub mod builtin;
pub mod compiled;
mod derivative;
pub mod expression;
pub mod program;

pub use builtin::BuiltinModel;
pub use compiled::{compile, CompiledModel, ModelExpression};
pub use expression::{BinaryOp, Expression, Function, Variable};
pub use program::{Instruction, Program};
