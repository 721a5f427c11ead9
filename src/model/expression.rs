//! Expression parsing for model formulas.
//!
//! A model is written as an algebraic expression over one independent
//! variable `x` and parameters `param0..param3` (`var0..var3` is accepted as a
//! synonym). Only arithmetic, the constants `pi` and `e`, and a closed set of
//! elementary functions are recognised; anything else is rejected while
//! parsing, so model text is never executed.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, multispace0, one_of, satisfy},
    combinator::{peek, recognize},
    error::{Error as NomError, ErrorKind},
    multi::many0,
    number::complete::double,
    sequence::{delimited, pair},
    IResult, Parser,
};
use std::collections::BTreeSet;
use std::f64::consts;
use std::fmt;

use crate::error::ModelError;

/// Deepest nesting, and tallest expression tree, a model may use.
pub const MAX_DEPTH: usize = 128;

/// Leaf symbols an expression may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variable {
    /// The independent variable `x`
    X,

    /// A fit parameter, by index
    Param(usize),
}

impl Variable {
    /// Resolve an identifier to a variable, normalizing `varN` to `paramN`.
    fn from_name(name: &str) -> Option<Self> {
        if name == "x" {
            return Some(Variable::X);
        }
        let digits = name
            .strip_prefix("param")
            .or_else(|| name.strip_prefix("var"))?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(Variable::Param)
    }
}

/// Elementary functions allowed in a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Exp,
    Log,
    Log10,
    Sin,
    Cos,
    Tan,
    Sqrt,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "exp" => Some(Function::Exp),
            "log" | "ln" => Some(Function::Log),
            "log10" => Some(Function::Log10),
            "sin" => Some(Function::Sin),
            "cos" => Some(Function::Cos),
            "tan" => Some(Function::Tan),
            "sqrt" => Some(Function::Sqrt),
            _ => None,
        }
    }

    /// Name used when printing the function.
    pub fn name(self) -> &'static str {
        match self {
            Function::Exp => "exp",
            Function::Log => "log",
            Function::Log10 => "log10",
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Sqrt => "sqrt",
        }
    }

    /// Apply the function to a scalar.
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Function::Exp => value.exp(),
            Function::Log => value.ln(),
            Function::Log10 => value.log10(),
            Function::Sin => value.sin(),
            Function::Cos => value.cos(),
            Function::Tan => value.tan(),
            Function::Sqrt => value.sqrt(),
        }
    }
}

/// Binary operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Addition (+)
    Add,

    /// Subtraction (-)
    Sub,

    /// Multiplication (*)
    Mul,

    /// Division (/)
    Div,

    /// Power (^)
    Pow,
}

impl BinaryOp {
    /// Apply the operator to two scalars with IEEE semantics.
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::Mul => lhs * rhs,
            BinaryOp::Div => lhs / rhs,
            BinaryOp::Pow => lhs.powf(rhs),
        }
    }

    fn symbol(self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Sub => '-',
            BinaryOp::Mul => '*',
            BinaryOp::Div => '/',
            BinaryOp::Pow => '^',
        }
    }
}

/// Expression AST node
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Constant number
    Number(f64),

    /// Variable reference
    Variable(Variable),

    /// Negation (-expr)
    Neg(Box<Expression>),

    /// Binary operations
    Binary(BinaryOp, Box<Expression>, Box<Expression>),

    /// Function call
    Function(Function, Box<Expression>),
}

impl Expression {
    /// Parse an expression from a string.
    ///
    /// The whole input must be consumed; statement syntax such as `x = 1` or
    /// `print(x)` fails with [`ModelError::InvalidExpression`].
    pub fn parse(input: &str) -> Result<Self, ModelError> {
        if input.trim().is_empty() {
            return Err(ModelError::InvalidExpression(
                "model expression is empty".to_string(),
            ));
        }

        match expr_parser(input, 0) {
            Ok((remainder, (expr, _))) => {
                let remainder = remainder.trim_start();
                if remainder.is_empty() {
                    Ok(expr)
                } else {
                    Err(ModelError::InvalidExpression(format!(
                        "unexpected input at column {}: '{}'",
                        column(input, remainder),
                        snippet(remainder)
                    )))
                }
            }
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                let message = if e.code == ErrorKind::TooLarge {
                    format!(
                        "expression nested too deeply at column {} (limit {} levels)",
                        column(input, e.input),
                        MAX_DEPTH
                    )
                } else if e.code == ErrorKind::Verify {
                    let name = identifier(e.input)
                        .map(|(_, name)| name)
                        .unwrap_or(e.input);
                    format!(
                        "unknown symbol '{}' at column {} (allowed: x, pi, e, param0..param3)",
                        name,
                        column(input, e.input)
                    )
                } else if e.input.trim().is_empty() {
                    "unexpected end of expression".to_string()
                } else {
                    format!(
                        "unexpected input at column {}: '{}'",
                        column(input, e.input),
                        snippet(e.input)
                    )
                };
                Err(ModelError::InvalidExpression(message))
            }
            Err(nom::Err::Incomplete(_)) => Err(ModelError::InvalidExpression(
                "unexpected end of expression".to_string(),
            )),
        }
    }

    /// Distinct parameter indices referenced by the expression, sorted.
    pub fn parameters(&self) -> BTreeSet<usize> {
        let mut params = BTreeSet::new();
        self.collect_parameters(&mut params);
        params
    }

    fn collect_parameters(&self, params: &mut BTreeSet<usize>) {
        match self {
            Self::Number(_) | Self::Variable(Variable::X) => {}
            Self::Variable(Variable::Param(i)) => {
                params.insert(*i);
            }
            Self::Neg(inner) | Self::Function(_, inner) => inner.collect_parameters(params),
            Self::Binary(_, left, right) => {
                left.collect_parameters(params);
                right.collect_parameters(params);
            }
        }
    }

    /// Whether the expression changes when `param` changes.
    pub fn depends_on(&self, param: usize) -> bool {
        match self {
            Self::Number(_) | Self::Variable(Variable::X) => false,
            Self::Variable(Variable::Param(i)) => *i == param,
            Self::Neg(inner) | Self::Function(_, inner) => inner.depends_on(param),
            Self::Binary(_, left, right) => left.depends_on(param) || right.depends_on(param),
        }
    }

    /// Evaluate at a single point. Parameters outside `params` read as NaN.
    pub fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
        match self {
            Self::Number(n) => *n,
            Self::Variable(Variable::X) => x,
            Self::Variable(Variable::Param(i)) => params.get(*i).copied().unwrap_or(f64::NAN),
            Self::Neg(inner) => -inner.evaluate(x, params),
            Self::Binary(op, left, right) => {
                op.apply(left.evaluate(x, params), right.evaluate(x, params))
            }
            Self::Function(func, inner) => func.apply(inner.evaluate(x, params)),
        }
    }

    /// Number of nodes in the tree.
    pub fn size(&self) -> usize {
        match self {
            Self::Number(_) | Self::Variable(_) => 1,
            Self::Neg(inner) | Self::Function(_, inner) => 1 + inner.size(),
            Self::Binary(_, left, right) => 1 + left.size() + right.size(),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) if *n == consts::PI => write!(f, "pi"),
            Self::Number(n) if *n == consts::E => write!(f, "e"),
            Self::Number(n) if *n < 0.0 => write!(f, "({})", n),
            Self::Number(n) => write!(f, "{}", n),
            Self::Variable(Variable::X) => write!(f, "x"),
            Self::Variable(Variable::Param(i)) => write!(f, "param{}", i),
            Self::Neg(inner) => write!(f, "(-{})", inner),
            Self::Binary(op, left, right) => write!(f, "({} {} {})", left, op.symbol(), right),
            Self::Function(func, inner) => write!(f, "{}({})", func.name(), inner),
        }
    }
}

fn column(input: &str, rest: &str) -> usize {
    input.len() - rest.len() + 1
}

fn snippet(rest: &str) -> String {
    rest.chars().take(16).collect()
}

// Parser functions using nom
//
// expr  := term (('+' | '-') term)*
// term  := unary (('*' | '/') unary)*
// unary := ('-' | '+') unary | power
// power := atom ('^' unary)?
// atom  := number | function '(' expr ')' | symbol | '(' expr ')'
//
// Every parser takes the current nesting depth and returns the height of the
// tree it built, so hostile input is rejected long before the recursion in
// the parser or in later tree walks can exhaust the stack.

type ParseResult<'a, T> = IResult<&'a str, T>;

/// A parsed sub-expression and the height of its tree.
type Node = (Expression, usize);

fn too_deep(input: &str) -> nom::Err<NomError<&str>> {
    nom::Err::Failure(NomError::new(input, ErrorKind::TooLarge))
}

/// Descend one nesting level.
fn enter(input: &str, depth: usize) -> Result<usize, nom::Err<NomError<&str>>> {
    if depth >= MAX_DEPTH {
        Err(too_deep(input))
    } else {
        Ok(depth + 1)
    }
}

fn node(input: &str, expr: Expression, height: usize) -> Result<Node, nom::Err<NomError<&str>>> {
    if height > MAX_DEPTH {
        Err(too_deep(input))
    } else {
        Ok((expr, height))
    }
}

fn whitespace(input: &str) -> ParseResult<'_, &str> {
    multispace0(input)
}

/// Parse a single-character token with surrounding whitespace.
fn token<'a>(input: &'a str, c: char) -> ParseResult<'a, char> {
    delimited(multispace0, char(c), multispace0).parse(input)
}

/// Parse an identifier (variable, constant or function name)
fn identifier(input: &str) -> ParseResult<'_, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))
    .parse(input)
}

/// Parse an unsigned decimal literal such as `2`, `2.5`, `.5` or `1e-3`.
///
/// Signs belong to the unary operators, and `double`'s `nan`/`inf` spellings
/// are not literals here, so the first character must be a digit or a point.
fn number(input: &str) -> ParseResult<'_, Expression> {
    let (input, _) = peek(satisfy(|c: char| c.is_ascii_digit() || c == '.')).parse(input)?;
    let (input, value) = double(input)?;
    Ok((input, Expression::Number(value)))
}

/// Parse a function call, constant or variable reference.
fn named(input: &str, depth: usize) -> ParseResult<'_, Node> {
    let (rest, name) = identifier(input)?;

    if let Some(func) = Function::from_name(name) {
        let (rest, _) = token(rest, '(')?;
        let inner = enter(rest, depth)?;
        let (rest, (arg, height)) = expr_parser(rest, inner)?;
        let (rest, _) = token(rest, ')')?;
        let call = node(rest, Expression::Function(func, Box::new(arg)), height + 1)?;
        return Ok((rest, call));
    }

    match name {
        "pi" => Ok((rest, (Expression::Number(consts::PI), 1))),
        "e" => Ok((rest, (Expression::Number(consts::E), 1))),
        _ => match Variable::from_name(name) {
            Some(var) => Ok((rest, (Expression::Variable(var), 1))),
            None => Err(nom::Err::Failure(NomError::new(input, ErrorKind::Verify))),
        },
    }
}

/// Parse a parenthesized expression
fn parens(input: &str, depth: usize) -> ParseResult<'_, Node> {
    let (input, _) = token(input, '(')?;
    let inner = enter(input, depth)?;
    let (input, parsed) = expr_parser(input, inner)?;
    let (input, _) = token(input, ')')?;
    Ok((input, parsed))
}

/// Parse a primary expression (number, call, symbol, or parenthesized expression)
fn atom(input: &str, depth: usize) -> ParseResult<'_, Node> {
    let (input, _) = whitespace(input)?;

    match number(input) {
        Ok((rest, value)) => return Ok((rest, (value, 1))),
        Err(nom::Err::Error(_)) => {}
        Err(e) => return Err(e),
    }
    match named(input, depth) {
        Err(nom::Err::Error(_)) => {}
        other => return other,
    }
    parens(input, depth)
}

/// Parse a power expression; `^` is right-associative and binds tighter than unary minus.
fn power(input: &str, depth: usize) -> ParseResult<'_, Node> {
    let (input, (base, base_height)) = atom(input, depth)?;
    match token(input, '^') {
        Ok((rest, _)) => {
            let inner = enter(rest, depth)?;
            let (rest, (exponent, exponent_height)) = unary(rest, inner)?;
            let pow = node(
                rest,
                Expression::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)),
                base_height.max(exponent_height) + 1,
            )?;
            Ok((rest, pow))
        }
        Err(_) => Ok((input, (base, base_height))),
    }
}

/// Parse a unary expression (-expr, +expr)
fn unary(input: &str, depth: usize) -> ParseResult<'_, Node> {
    if let Ok((rest, _)) = token(input, '-') {
        let inner = enter(rest, depth)?;
        let (rest, (operand, height)) = unary(rest, inner)?;
        let negated = node(rest, Expression::Neg(Box::new(operand)), height + 1)?;
        return Ok((rest, negated));
    }
    if let Ok((rest, _)) = token(input, '+') {
        let inner = enter(rest, depth)?;
        return unary(rest, inner);
    }
    power(input, depth)
}

fn multiplicative_op(input: &str) -> ParseResult<'_, BinaryOp> {
    let (input, c) = delimited(multispace0, one_of("*/"), multispace0).parse(input)?;
    Ok((input, if c == '*' { BinaryOp::Mul } else { BinaryOp::Div }))
}

fn additive_op(input: &str) -> ParseResult<'_, BinaryOp> {
    let (input, c) = delimited(multispace0, one_of("+-"), multispace0).parse(input)?;
    Ok((input, if c == '+' { BinaryOp::Add } else { BinaryOp::Sub }))
}

/// Fold `operand (op operand)*` into a left-associative chain.
///
/// An operator whose right operand does not parse is left unconsumed.
fn chain<'a>(
    input: &'a str,
    depth: usize,
    operator: fn(&'a str) -> ParseResult<'a, BinaryOp>,
    operand: fn(&'a str, usize) -> ParseResult<'a, Node>,
) -> ParseResult<'a, Node> {
    let (mut input, (mut acc, mut height)) = operand(input, depth)?;
    while let Ok((rest, op)) = operator(input) {
        let (rest, (rhs, rhs_height)) = match operand(rest, depth) {
            Ok(parsed) => parsed,
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        };
        (acc, height) = node(
            rest,
            Expression::Binary(op, Box::new(acc), Box::new(rhs)),
            height.max(rhs_height) + 1,
        )?;
        input = rest;
    }
    Ok((input, (acc, height)))
}

/// Parse a multiplicative expression (expr * expr, expr / expr)
fn term(input: &str, depth: usize) -> ParseResult<'_, Node> {
    chain(input, depth, multiplicative_op, unary)
}

/// Parse an additive expression (expr + expr, expr - expr)
fn expr_parser(input: &str, depth: usize) -> ParseResult<'_, Node> {
    chain(input, depth, additive_op, term)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn param(i: usize) -> Expression {
        Expression::Variable(Variable::Param(i))
    }

    fn x() -> Expression {
        Expression::Variable(Variable::X)
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(Expression::parse("42").unwrap(), Expression::Number(42.0));
        assert_eq!(Expression::parse("3.25").unwrap(), Expression::Number(3.25));
        assert_eq!(Expression::parse(".5").unwrap(), Expression::Number(0.5));
        assert_eq!(Expression::parse("1e-3").unwrap(), Expression::Number(1e-3));
        assert_eq!(Expression::parse("0.001").unwrap(), Expression::Number(0.001));
        assert_eq!(Expression::parse("2.").unwrap(), Expression::Number(2.0));
        assert_eq!(Expression::parse("1.5e2").unwrap(), Expression::Number(150.0));
        assert_eq!(
            Expression::parse("-2.5").unwrap(),
            Expression::Neg(Box::new(Expression::Number(2.5)))
        );
    }

    #[test]
    fn test_parse_variables() {
        assert_eq!(Expression::parse("x").unwrap(), x());
        assert_eq!(Expression::parse("param3").unwrap(), param(3));
        assert_eq!(Expression::parse("var1").unwrap(), param(1));
        assert_eq!(
            Expression::parse("pi").unwrap(),
            Expression::Number(consts::PI)
        );
    }

    #[test]
    fn test_trailing_fraction_is_kept() {
        assert_eq!(
            Expression::parse("x * 0.5").unwrap(),
            Expression::Binary(
                BinaryOp::Mul,
                Box::new(x()),
                Box::new(Expression::Number(0.5))
            )
        );
        let expr = Expression::parse("param0 * x + param1 + 0.25").unwrap();
        assert_relative_eq!(expr.evaluate(1.0, &[1.0, 1.0]), 2.25);
    }

    #[test]
    fn test_float_keywords_are_not_literals() {
        for text in ["inf * x", "nan + x", "infinity"] {
            assert!(
                matches!(Expression::parse(text), Err(ModelError::InvalidExpression(_))),
                "{}",
                text
            );
        }
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let n = 200_000;
        for text in [
            format!("{}x", "-".repeat(n)),
            format!("{}x", "+".repeat(n)),
            format!("{}x{}", "(".repeat(n), ")".repeat(n)),
            format!("{}x{}", "sin(".repeat(n), ")".repeat(n)),
            format!("x{}", "^x".repeat(n)),
            format!("x{}", " + x".repeat(n)),
            format!("x{}", " * x".repeat(n)),
        ] {
            match Expression::parse(&text) {
                Err(ModelError::InvalidExpression(msg)) => {
                    assert!(msg.contains("nested too deeply"), "{}", msg)
                }
                other => panic!("Expected InvalidExpression, got {:?}", other.map(|_| ())),
            }
        }
    }

    #[test]
    fn test_moderate_nesting_is_accepted() {
        let depth = MAX_DEPTH / 2;
        let text = format!("{}x{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(Expression::parse(&text).unwrap(), x());

        let text = format!("x{}", " + 1".repeat(depth));
        assert_relative_eq!(Expression::parse(&text).unwrap().evaluate(0.0, &[]), depth as f64);
    }

    #[test]
    fn test_left_associativity() {
        let expr = Expression::parse("param0 - param1 - x").unwrap();
        assert_relative_eq!(expr.evaluate(1.0, &[10.0, 4.0]), 5.0);

        let expr = Expression::parse("param0 / param1 / x").unwrap();
        assert_relative_eq!(expr.evaluate(2.0, &[12.0, 3.0]), 2.0);
    }

    #[test]
    fn test_power_precedence() {
        // ^ is right-associative and binds tighter than unary minus
        let expr = Expression::parse("-x^2").unwrap();
        assert_relative_eq!(expr.evaluate(3.0, &[]), -9.0);

        let expr = Expression::parse("2^3^2").unwrap();
        assert_relative_eq!(expr.evaluate(0.0, &[]), 512.0);

        let expr = Expression::parse("2^-x").unwrap();
        assert_relative_eq!(expr.evaluate(1.0, &[]), 0.5);

        let expr = Expression::parse("2 * x ^ 2 + 1").unwrap();
        assert_relative_eq!(expr.evaluate(3.0, &[]), 19.0);
    }

    #[test]
    fn test_parse_function_call() {
        assert_eq!(
            Expression::parse("sin(x)").unwrap(),
            Expression::Function(Function::Sin, Box::new(x()))
        );
        assert_eq!(
            Expression::parse("ln ( x )").unwrap(),
            Expression::Function(Function::Log, Box::new(x()))
        );
    }

    #[test]
    fn test_evaluate_complex() {
        let expr = Expression::parse("var0 + var1 * exp(-var2 * x)").unwrap();
        let expected = 1.0 + 2.0 * (-0.5_f64 * 3.0).exp();
        assert_relative_eq!(expr.evaluate(3.0, &[1.0, 2.0, 0.5]), expected);

        let expr = Expression::parse("2 * (x + 1) / (4 - param0)").unwrap();
        assert_relative_eq!(expr.evaluate(2.0, &[3.0]), 6.0);
    }

    #[test]
    fn test_ieee_semantics() {
        let expr = Expression::parse("1 / x").unwrap();
        assert!(expr.evaluate(0.0, &[]).is_infinite());

        let expr = Expression::parse("log(x)").unwrap();
        assert!(expr.evaluate(-1.0, &[]).is_nan());
    }

    #[test]
    fn test_parse_errors() {
        for text in [
            "",
            "   ",
            "x +",
            "(x + 1",
            "x = 1",
            "print(x)",
            "import os",
            "y * 2",
            "__import__('os')",
            "exp x",
            "x; x",
            "param",
            "x ** 2",
        ] {
            match Expression::parse(text) {
                Err(ModelError::InvalidExpression(_)) => {}
                other => panic!("Expected InvalidExpression for {:?}, got {:?}", text, other),
            }
        }
    }

    #[test]
    fn test_unknown_symbol_message() {
        match Expression::parse("param0 * foo") {
            Err(ModelError::InvalidExpression(msg)) => {
                assert!(msg.contains("unknown symbol 'foo'"), "{}", msg)
            }
            other => panic!("Expected InvalidExpression, got {:?}", other),
        }
    }

    #[test]
    fn test_parameters() {
        let expr = Expression::parse("param0 + var2 * sin(param0 * x)").unwrap();
        assert_eq!(expr.parameters().into_iter().collect::<Vec<_>>(), vec![0, 2]);
        assert!(expr.depends_on(2));
        assert!(!expr.depends_on(1));
    }

    #[test]
    fn test_display_round_trip() {
        let expr = Expression::parse("var0 * sin(pi * (x - var1) / var2) - 2^-x").unwrap();
        let reparsed = Expression::parse(&expr.to_string()).unwrap();
        assert_eq!(expr, reparsed);
    }
}
