//! Useful functions for parsing and checking.

use crate::{Error, ErrorLevel, ErrorType, Source};
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;

/// Parses a [`Decimal`](crate::Decimal) from a [`&str`].
#[inline]
pub fn parse_decimal(num_str: &str, src: &Source) -> Result<Decimal, Error> {
    match num_str.parse::<Decimal>() {
        Ok(num) => Ok(num),
        Err(_) => {
            let error = Error {
                msg: "Invalid number.".to_string(),
                src: src.clone(),
                r#type: ErrorType::Syntax,
                level: ErrorLevel::Error,
            };
            Err(error)
        }
    }
}

lazy_static! {
    static ref ACCOUNT_PATTERN: Regex =
        Regex::new(r"(Assets|Liabilities|Equity|Income|Expenses)(:\w+)+").unwrap();
}

/// Returns the account paths mentioned in an expression, in order of
/// appearance, using plain pattern matching over the text.
///
/// Only paths under the five root account types are found, so a result
/// without any account means the expression cannot refer to the ledger.
pub fn find_accounts(expr: &str) -> Vec<&str> {
    ACCOUNT_PATTERN
        .find_iter(expr)
        .map(|m| m.as_str())
        .collect()
}
