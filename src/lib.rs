//! # balexpr
//!
//! balexpr checks ledger balances against simple arithmetic expressions
//! combining multiple accounts, such as
//!
//! ```text
//! 1991-01-03 custom "balexpr" "Assets:B*(Assets:A+200.00)" 109032.00 USD
//! ```
//!
//! The [`expr`] module evaluates such expressions against any [`expr::Resolver`];
//! [`Ledger`] parses a text ledger, replays it and runs every `balexpr` check
//! in it.
#![doc(html_root_url = "https://docs.rs/balexpr/0.1.0")]

pub mod check;
pub mod expr;
mod ledger;
pub mod options;
pub mod parse;
pub mod utils;

pub use ledger::*;
