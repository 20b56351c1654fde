use crate::Decimal;
use std::fmt;

/// Binary operators of a balance expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Operator::Add),
            '-' => Some(Operator::Sub),
            '*' => Some(Operator::Mul),
            '/' => Some(Operator::Div),
            _ => None,
        }
    }

    /// `*` and `/` are folded as soon as their right operand is known.
    pub fn is_multiplicative(&self) -> bool {
        matches!(self, Operator::Mul | Operator::Div)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Operator::Add => '+',
            Operator::Sub => '-',
            Operator::Mul => '*',
            Operator::Div => '/',
        };
        write!(f, "{}", c)
    }
}

/// A token of a balance expression, borrowing identifiers from the
/// expression text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'t> {
    /// An account path such as `Assets:Bank:Checking`.
    Identifier(&'t str),
    Number(Decimal),
    Operator(Operator),
    LeftParen,
    RightParen,
}
