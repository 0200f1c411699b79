use log::trace;

use super::{BinaryOp, Expression, Node, UnaryOp};
use crate::span::Span;

/// Largest magnitude any intermediate value may reach by default.
pub const DEFAULT_MAGNITUDE_BOUND: f64 = 1e18;

/// Evaluate with the default magnitude bound.
pub fn evaluate(expr: &Expression) -> Result<Number, EvalError> {
    Evaluator::default().evaluate(expr)
}

/// Result of an evaluation. Always finite and within the bound of the
/// [Evaluator] that produced it. Negative zero is normalized to zero.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Number(f64);

impl Number {
    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_integer(self) -> bool {
        self.0.fract() == 0.0
    }

    /// The value as an integer, if it is one. Always fits with bounds up to `i64::MAX`.
    pub fn to_i64(self) -> Option<i64> {
        (self.is_integer() && self.0.abs() < i64::MAX as f64).then_some(self.0 as i64)
    }
}

impl From<Number> for f64 {
    fn from(n: Number) -> f64 {
        n.0
    }
}

impl PartialEq<f64> for Number {
    fn eq(&self, other: &f64) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EvalErrorKind {
    #[error("division by zero")]
    DivisionByZero,

    #[error("negative number raised to a fractional power has no real result")]
    ComplexResult,

    #[error("value exceeds the allowed magnitude")]
    Overflow,
}

/// Evaluation failure, pointing at the sub-expression that caused it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind} in `{expr}` at position {pos}", pos = .span.start())]
pub struct EvalError {
    kind: EvalErrorKind,
    span: Span,
    expr: String,
}

impl EvalError {
    fn new(kind: EvalErrorKind, at: &Expression) -> Self {
        Self {
            kind,
            span: at.span(),
            expr: at.to_string(),
        }
    }

    pub fn kind(&self) -> EvalErrorKind {
        self.kind
    }

    /// Span of the offending sub-expression in the candidate text.
    pub fn span(&self) -> Span {
        self.span
    }

    /// Normalized text of the offending sub-expression.
    pub fn expr(&self) -> &str {
        &self.expr
    }
}

/// Tree walking evaluator over `f64`.
///
/// Every intermediate value is checked against the magnitude bound, so an
/// evaluation either stays within it or fails with [EvalErrorKind::Overflow].
/// Infinities and NaN are never produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluator {
    bound: f64,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self {
            bound: DEFAULT_MAGNITUDE_BOUND,
        }
    }
}

impl Evaluator {
    pub fn new(bound: f64) -> Self {
        Self { bound }
    }

    pub fn evaluate(&self, expr: &Expression) -> Result<Number, EvalError> {
        let v = self.eval(expr)?;
        trace!("`{expr}` evaluated to {v}");
        Ok(Number(if v == 0.0 { 0.0 } else { v }))
    }

    fn eval(&self, expr: &Expression) -> Result<f64, EvalError> {
        use EvalErrorKind::*;

        let v = match &**expr {
            Node::Number(v) => *v,
            Node::Group(inner) => self.eval(inner)?,
            Node::Unary {
                op: UnaryOp::Neg,
                operand,
            } => -self.eval(operand)?,
            Node::Binary { op, lhs, rhs } => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => {
                        if r == 0.0 {
                            return Err(EvalError::new(DivisionByZero, expr));
                        }
                        l / r
                    }
                    BinaryOp::Pow => self.pow(l, r, expr)?,
                }
            }
        };

        self.check(v, expr)
    }

    fn pow(&self, base: f64, exponent: f64, expr: &Expression) -> Result<f64, EvalError> {
        use EvalErrorKind::*;

        if base == 0.0 && exponent < 0.0 {
            return Err(EvalError::new(DivisionByZero, expr));
        }
        if base < 0.0 && exponent.fract() != 0.0 {
            return Err(EvalError::new(ComplexResult, expr));
        }
        Ok(base.powf(exponent))
    }

    fn check(&self, v: f64, expr: &Expression) -> Result<f64, EvalError> {
        if v.is_finite() && v.abs() <= self.bound {
            Ok(v)
        } else {
            Err(EvalError::new(EvalErrorKind::Overflow, expr))
        }
    }
}
