use crate::{Currency, Location};
use std::fmt;
use thiserror::Error;

/// The ways an expression can be structurally malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Malformation {
    /// An operator with nothing on its left, e.g. `*A` or `(+A)`.
    LeadingOperator,
    /// Two operators in a row, e.g. `A+*B`.
    ConsecutiveOperators,
    /// An operator with nothing on its right, e.g. `A+` or `(A-)`.
    DanglingOperator,
    /// Two operands in a row, e.g. `A B` or `(A)(B)`.
    MissingOperator,
    /// A pair of parentheses with nothing in between.
    EmptyParens,
}

impl fmt::Display for Malformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Malformation::LeadingOperator => "operator without a left operand",
            Malformation::ConsecutiveOperators => "consecutive operators",
            Malformation::DanglingOperator => "operator without a right operand",
            Malformation::MissingOperator => "missing operator between operands",
            Malformation::EmptyParens => "empty parentheses",
        };
        f.write_str(msg)
    }
}

/// Errors of scanning or evaluating a balance expression. Locations are
/// relative to the expression text, starting at `1:1`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("Unknown character '{character}' at {position}.")]
    UnknownCharacter { position: Location, character: char },

    #[error("Invalid number '{text}' at {position}.")]
    InvalidNumber { position: Location, text: String },

    #[error("Unmatched ')' at {position}.")]
    UnmatchedParen { position: Location },

    #[error("Unclosed '(' at {position}.")]
    UnclosedParen { position: Location },

    #[error("Malformed expression at {position}: {kind}.")]
    MalformedExpression {
        position: Location,
        kind: Malformation,
    },

    #[error("Invalid reference to unknown account '{name}'.")]
    UnknownAccount { name: String },

    #[error("Currencies are inconsistent: expected {expected}, found {found}.")]
    CurrencyMismatch { expected: Currency, found: Currency },

    #[error("Division by zero at {position}.")]
    DivisionByZero { position: Location },

    #[error("Number out of range at {position}.")]
    Overflow { position: Location },

    #[error("Empty expression.")]
    EmptyExpression,
}

impl ExprError {
    /// Returns the location in the expression text the error points at.
    pub fn position(&self) -> Option<Location> {
        match self {
            ExprError::UnknownCharacter { position, .. }
            | ExprError::InvalidNumber { position, .. }
            | ExprError::UnmatchedParen { position }
            | ExprError::UnclosedParen { position }
            | ExprError::MalformedExpression { position, .. }
            | ExprError::DivisionByZero { position }
            | ExprError::Overflow { position } => Some(*position),
            ExprError::UnknownAccount { .. }
            | ExprError::CurrencyMismatch { .. }
            | ExprError::EmptyExpression => None,
        }
    }
}
