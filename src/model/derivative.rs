//! Symbolic differentiation of model expressions.
//!
//! Derivatives are exact: each rule builds a new expression tree, and the
//! constructors below fold constants and trivial identities so the trees
//! handed to the lowering pass stay small.

use super::expression::{BinaryOp, Expression, Function, Variable};

fn num(value: f64) -> Expression {
    Expression::Number(value)
}

fn as_number(expr: &Expression) -> Option<f64> {
    match expr {
        Expression::Number(n) => Some(*n),
        _ => None,
    }
}

fn is_value(expr: &Expression, value: f64) -> bool {
    as_number(expr) == Some(value)
}

fn binary(op: BinaryOp, lhs: Expression, rhs: Expression) -> Expression {
    Expression::Binary(op, Box::new(lhs), Box::new(rhs))
}

pub(crate) fn neg(expr: Expression) -> Expression {
    match expr {
        Expression::Number(n) => num(-n),
        Expression::Neg(inner) => *inner,
        other => Expression::Neg(Box::new(other)),
    }
}

pub(crate) fn add(lhs: Expression, rhs: Expression) -> Expression {
    match (as_number(&lhs), as_number(&rhs)) {
        (Some(a), Some(b)) => num(a + b),
        (Some(a), _) if a == 0.0 => rhs,
        (_, Some(b)) if b == 0.0 => lhs,
        _ => match rhs {
            Expression::Neg(inner) => binary(BinaryOp::Sub, lhs, *inner),
            rhs => binary(BinaryOp::Add, lhs, rhs),
        },
    }
}

pub(crate) fn sub(lhs: Expression, rhs: Expression) -> Expression {
    match (as_number(&lhs), as_number(&rhs)) {
        (Some(a), Some(b)) => num(a - b),
        (Some(a), _) if a == 0.0 => neg(rhs),
        (_, Some(b)) if b == 0.0 => lhs,
        _ => binary(BinaryOp::Sub, lhs, rhs),
    }
}

pub(crate) fn mul(lhs: Expression, rhs: Expression) -> Expression {
    match (as_number(&lhs), as_number(&rhs)) {
        (Some(a), Some(b)) => num(a * b),
        (Some(a), _) if a == 0.0 => num(0.0),
        (_, Some(b)) if b == 0.0 => num(0.0),
        (Some(a), _) if a == 1.0 => rhs,
        (_, Some(b)) if b == 1.0 => lhs,
        (Some(a), _) if a == -1.0 => neg(rhs),
        (_, Some(b)) if b == -1.0 => neg(lhs),
        _ => match (lhs, rhs) {
            (Expression::Neg(a), Expression::Neg(b)) => binary(BinaryOp::Mul, *a, *b),
            (Expression::Neg(a), b) => neg(binary(BinaryOp::Mul, *a, b)),
            (a, Expression::Neg(b)) => neg(binary(BinaryOp::Mul, a, *b)),
            (a, b) => binary(BinaryOp::Mul, a, b),
        },
    }
}

pub(crate) fn div(lhs: Expression, rhs: Expression) -> Expression {
    match (as_number(&lhs), as_number(&rhs)) {
        (Some(a), Some(b)) if b != 0.0 => num(a / b),
        (Some(a), _) if a == 0.0 => num(0.0),
        (_, Some(b)) if b == 1.0 => lhs,
        _ => match lhs {
            Expression::Neg(inner) => neg(binary(BinaryOp::Div, *inner, rhs)),
            lhs => binary(BinaryOp::Div, lhs, rhs),
        },
    }
}

pub(crate) fn pow(base: Expression, exponent: Expression) -> Expression {
    match (as_number(&base), as_number(&exponent)) {
        (Some(a), Some(b)) => num(a.powf(b)),
        (_, Some(b)) if b == 0.0 => num(1.0),
        (_, Some(b)) if b == 1.0 => base,
        _ => binary(BinaryOp::Pow, base, exponent),
    }
}

pub(crate) fn call(func: Function, arg: Expression) -> Expression {
    match as_number(&arg) {
        Some(value) => num(func.apply(value)),
        None => Expression::Function(func, Box::new(arg)),
    }
}

impl Expression {
    /// Partial derivative with respect to parameter `param`.
    pub fn derivative(&self, param: usize) -> Expression {
        match self {
            Expression::Number(_) | Expression::Variable(Variable::X) => num(0.0),
            Expression::Variable(Variable::Param(i)) => num(if *i == param { 1.0 } else { 0.0 }),
            Expression::Neg(inner) => neg(inner.derivative(param)),
            Expression::Binary(op, u, v) => {
                let u = u.as_ref();
                let v = v.as_ref();
                match op {
                    BinaryOp::Add => add(u.derivative(param), v.derivative(param)),
                    BinaryOp::Sub => sub(u.derivative(param), v.derivative(param)),
                    BinaryOp::Mul => add(
                        mul(u.derivative(param), v.clone()),
                        mul(u.clone(), v.derivative(param)),
                    ),
                    BinaryOp::Div => {
                        if !v.depends_on(param) {
                            div(u.derivative(param), v.clone())
                        } else {
                            // (u'v - uv') / v^2
                            div(
                                sub(
                                    mul(u.derivative(param), v.clone()),
                                    mul(u.clone(), v.derivative(param)),
                                ),
                                pow(v.clone(), num(2.0)),
                            )
                        }
                    }
                    BinaryOp::Pow => power_rule(u, v, param),
                }
            }
            Expression::Function(func, arg) => {
                let inner = arg.derivative(param);
                if is_value(&inner, 0.0) {
                    return num(0.0);
                }
                let arg = arg.as_ref().clone();
                let outer = match func {
                    Function::Exp => call(Function::Exp, arg),
                    Function::Log => div(num(1.0), arg),
                    Function::Log10 => div(num(1.0), mul(arg, num(std::f64::consts::LN_10))),
                    Function::Sin => call(Function::Cos, arg),
                    Function::Cos => neg(call(Function::Sin, arg)),
                    Function::Tan => div(num(1.0), pow(call(Function::Cos, arg), num(2.0))),
                    Function::Sqrt => div(num(1.0), mul(num(2.0), call(Function::Sqrt, arg))),
                };
                mul(outer, inner)
            }
        }
    }
}

/// d(u^v) for the three shapes: constant exponent, constant base, and general.
fn power_rule(u: &Expression, v: &Expression, param: usize) -> Expression {
    let base_varies = u.depends_on(param);
    let exponent_varies = v.depends_on(param);

    match (base_varies, exponent_varies) {
        (false, false) => num(0.0),
        // v * u^(v - 1) * u'
        (true, false) => mul(
            mul(v.clone(), pow(u.clone(), sub(v.clone(), num(1.0)))),
            u.derivative(param),
        ),
        // u^v * ln(u) * v'
        (false, true) => mul(
            mul(
                pow(u.clone(), v.clone()),
                call(Function::Log, u.clone()),
            ),
            v.derivative(param),
        ),
        // u^v * (v' ln(u) + v u' / u)
        (true, true) => mul(
            pow(u.clone(), v.clone()),
            add(
                mul(v.derivative(param), call(Function::Log, u.clone())),
                div(mul(v.clone(), u.derivative(param)), u.clone()),
            ),
        ),
    }
}
