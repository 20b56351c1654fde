//! Balance expressions: arithmetic over account balances.
//!
//! An expression combines account paths and decimal literals with `+`, `-`,
//! `*`, `/` and parentheses, e.g. `Assets:Bank:Checking + Assets:Cash * 2`.
//! The [`Scanner`] splits the text into [`Token`]s and the [`Evaluator`]
//! reduces them to a single [`Amount`](crate::Amount) in one pass, without
//! building a syntax tree.

mod error;
mod evaluator;
mod scanner;
mod token;

pub use error::{ExprError, Malformation};
pub use evaluator::{evaluate, Evaluator, Resolver};
pub use scanner::{scan, Scanner};
pub use token::{Operator, Token};
