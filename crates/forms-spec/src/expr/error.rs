use thiserror::Error;

/// Failures raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("cannot apply unary '{op}' to {operand}")]
    InvalidOperand {
        op: &'static str,
        operand: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic result is not a finite number")]
    NonFinite,

    #[error("maximum expression depth ({0}) exceeded")]
    DepthExceeded(usize),
}
