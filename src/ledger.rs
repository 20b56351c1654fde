use crate::check::BalanceResolver;
use crate::parse::Parser;
pub use chrono::NaiveDate as Date;
use getset::{CopyGetters, Getters};
pub use rust_decimal::Decimal;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::convert::From;
use std::fmt;
use std::sync::Arc;

/// Representing a location, line number and column number, in a source file
/// or in an expression.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Location {
    pub line: usize,
    pub col: usize,
}

impl Location {
    pub fn advance(&self, width: usize) -> Self {
        Location {
            col: self.col + width,
            line: self.line,
        }
    }

    /// Translates a location relative to a text embedded at `origin` into
    /// the coordinates of the enclosing text.
    pub fn relative_to(&self, origin: Location) -> Self {
        if self.line <= 1 {
            Location {
                line: origin.line,
                col: origin.col + self.col - 1,
            }
        } else {
            Location {
                line: origin.line + self.line - 1,
                col: self.col,
            }
        }
    }
}

impl From<(usize, usize)> for Location {
    fn from(tuple: (usize, usize)) -> Self {
        Location {
            line: tuple.0,
            col: tuple.1,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A string wrapped in [`Arc`](std::sync::Arc)
/// representing the source file path.
pub type SrcFile = Arc<String>;

/// Represents a range in a source file. This struct is used to track the origins
/// of any information in the generated [`Ledger`], as well as for locating errors.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Source {
    pub file: SrcFile,
    pub start: Location,
    pub end: Location,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.start)
    }
}

/// Kinds of errors encountered while loading a ledger and running its checks.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// IO error, e.g., the context of an input file cannot be read.
    Io,
    /// Syntax error in the source file.
    Syntax,
    /// A transaction is not balanced, or a `balance` assertion failed.
    NotBalanced,
    /// A transaction missing too much information to be completed.
    Incomplete,
    /// An unknown, unopened or already closed account is referred.
    Account,
    /// A currency is not allowed by the constraint of an account.
    Currency,
    /// Duplicate information, such as an option specified twice.
    Duplicate,
    /// A `balexpr` expression failed to evaluate or did not match the
    /// expected amount.
    Expression,
}

/// The level of an error. Any directive in the source file resulting an
/// [`ErrorLevel::Error`] is dropped.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorLevel {
    Info,
    Warning,
    Error,
}

/// Contains the full information of an error.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Error {
    pub msg: String,
    pub src: Source,
    pub r#type: ErrorType,
    pub level: ErrorLevel,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}\n  {}", self.level, self.msg, self.src)
    }
}

pub type Currency = String;

/// A [`Decimal`] number plus the currency.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Amount {
    pub number: Decimal,
    pub currency: Currency,
}

impl Amount {
    pub fn new(number: Decimal, currency: impl Into<Currency>) -> Self {
        Amount {
            number,
            currency: currency.into(),
        }
    }

    /// Adds two amounts of the same currency. Returns `None` on overflow.
    pub fn checked_add(&self, rhs: &Amount) -> Option<Amount> {
        self.number
            .checked_add(rhs.number)
            .map(|number| Amount::new(number, self.currency.clone()))
    }

    /// Subtracts two amounts of the same currency. Returns `None` on overflow.
    pub fn checked_sub(&self, rhs: &Amount) -> Option<Amount> {
        self.number
            .checked_sub(rhs.number)
            .map(|number| Amount::new(number, self.currency.clone()))
    }

    /// Scales the amount, keeping its currency.
    pub fn checked_mul(&self, rhs: Decimal) -> Option<Amount> {
        self.number
            .checked_mul(rhs)
            .map(|number| Amount::new(number, self.currency.clone()))
    }

    /// Divides the amount by a scalar, keeping its currency. Returns `None`
    /// when `rhs` is zero or the result overflows.
    pub fn checked_div(&self, rhs: Decimal) -> Option<Amount> {
        self.number
            .checked_div(rhs)
            .map(|number| Amount::new(number, self.currency.clone()))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.number, self.currency)
    }
}

/// The flag of a [`Transaction`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TxnFlag {
    /// transactions flagged by `!`.
    Pending,
    /// transactions flagged by `txn` or `*`.
    Posted,
    /// `pad` directives.
    Pad,
    /// `balance` directives.
    Balance,
}

impl fmt::Display for TxnFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxnFlag::Pending => write!(f, "!"),
            TxnFlag::Posted | TxnFlag::Pad => write!(f, "*"),
            TxnFlag::Balance => write!(f, "balance"),
        }
    }
}

/// A string wrapped in [`Arc`](std::sync::Arc)
/// representing the account name.
pub type Account = Arc<String>;

/// A posting like `Assets:Bank -100 JPY` inside a [`Transaction`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub account: Account,
    pub amount: Amount,
    pub src: Source,
}

impl fmt::Display for Posting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = f.width().unwrap_or(46);
        write!(f, "{:width$} {}", self.account, self.amount, width = width)
    }
}

/// Represents the meta data attached to a transaction.
pub type Meta = HashMap<String, (String, Source)>;

/// Represents a transaction, or a `pad` directive, or a `balance` directive in
/// the source file.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct Transaction {
    /// Returns the transaction date.
    #[getset(get_copy = "pub")]
    pub(crate) date: Date,

    /// Returns the transaction flag.
    #[getset(get_copy = "pub")]
    pub(crate) flag: TxnFlag,

    /// Returns the payee.
    #[getset(get = "pub")]
    pub(crate) payee: String,

    /// Returns the narration.
    #[getset(get = "pub")]
    pub(crate) narration: String,

    /// Returns the links.
    #[getset(get = "pub")]
    pub(crate) links: Vec<String>,

    /// Returns the tags.
    #[getset(get = "pub")]
    pub(crate) tags: Vec<String>,

    /// Returns the meta data associated with this transaction.
    #[getset(get = "pub")]
    pub(crate) meta: Meta,

    /// Returns the postings of this transaction.
    #[getset(get = "pub")]
    pub(crate) postings: Vec<Posting>,

    /// Returns the source of this transaction.
    #[getset(get = "pub")]
    pub(crate) src: Source,
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.flag {
            TxnFlag::Balance => write!(f, "{} {}", self.date, self.flag)?,
            _ => write!(
                f,
                "{} {} \"{}\" \"{}\"",
                self.date, self.flag, self.payee, self.narration
            )?,
        };
        for tag in &self.tags {
            write!(f, " {}", tag)?;
        }
        for link in &self.links {
            write!(f, " {}", link)?;
        }
        for posting in self.postings.iter() {
            write!(f, "\n    {}", posting)?;
        }
        Ok(())
    }
}

/// Contains the open/close date of an account and its currency constraint.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct AccountInfo {
    /// Returns the account open date and the source of the `open` directive.
    #[getset(get = "pub")]
    pub(crate) open: (Date, Source),

    /// Returns the account close date and the source of the `close` directive.
    #[getset(get = "pub")]
    pub(crate) close: Option<(Date, Source)>,

    /// Returns the allowed currencies of this account. If there are no limitations,
    /// an empty set is returned.
    #[getset(get = "pub")]
    pub(crate) currencies: HashSet<Currency>,
}

impl AccountInfo {
    pub(crate) fn allows(&self, currency: &str) -> bool {
        self.currencies.is_empty() || self.currencies.contains(currency)
    }
}

/// A `custom "balexpr"` directive: an expression over account balances and
/// the amount it is expected to evaluate to.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct BalExpr {
    /// Returns the date of the check. Only transactions dated strictly
    /// before it contribute to the balances.
    #[getset(get_copy = "pub")]
    pub(crate) date: Date,

    /// Returns the expression text.
    #[getset(get = "pub")]
    pub(crate) expr: String,

    /// Returns the expected amount.
    #[getset(get = "pub")]
    pub(crate) expected: Amount,

    /// Returns the location of the first character of the expression in the
    /// source file.
    #[getset(get_copy = "pub")]
    pub(crate) expr_start: Location,

    /// Returns the source of the directive.
    #[getset(get = "pub")]
    pub(crate) src: Source,
}

/// The outcome of one [`BalExpr`] check.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct CheckReport {
    /// Returns the check.
    #[getset(get = "pub")]
    pub(crate) check: BalExpr,

    /// Returns the evaluated amount, if the expression could be evaluated.
    #[getset(get = "pub")]
    pub(crate) actual: Option<Amount>,

    /// Returns whether the check passed.
    #[getset(get_copy = "pub")]
    pub(crate) passed: bool,
}

/// Represents the final balances of all accounts.
pub type BalanceSheet = HashMap<Account, HashMap<Currency, Decimal>>;

/// Represents a valid ledger containing all valid accounts and balanced
/// transactions, together with the outcome of every `balexpr` check.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct Ledger {
    /// Returns the information of accounts.
    #[getset(get = "pub")]
    pub(crate) accounts: HashMap<Account, AccountInfo>,
    /// Returns transactions, `pad` directives, and `balance` directives, sorted
    /// by date.
    #[getset(get = "pub")]
    pub(crate) txns: Vec<Transaction>,
    /// Returns the reports of `balexpr` checks, sorted by date.
    #[getset(get = "pub")]
    pub(crate) checks: Vec<CheckReport>,
    /// Returns the options as a hash map.
    #[getset(get = "pub")]
    pub(crate) options: HashMap<String, (String, Source)>,
    /// Returns the final balances.
    #[getset(get = "pub")]
    pub(crate) balance_sheet: BalanceSheet,
}

impl Ledger {
    /// Parses the ledger file at `path` and all files it includes, then
    /// verifies it and runs its `balexpr` checks.
    pub fn from_file(path: &str) -> (Self, Vec<Error>) {
        let (draft, mut errors) = Parser::parse(path);
        let (ledger, check_errors) = draft.into_ledger();
        errors.extend(check_errors);
        (ledger, errors)
    }

    /// Same as [`Ledger::from_file`], reading the ledger from `text`. `file` is
    /// only used for error reporting and resolving `include` directives.
    pub fn from_text(text: &str, file: &str) -> (Self, Vec<Error>) {
        let (draft, mut errors) = Parser::parse_text(text, file);
        let (ledger, check_errors) = draft.into_ledger();
        errors.extend(check_errors);
        (ledger, errors)
    }

    /// Returns the balances accumulated by all transactions dated strictly
    /// before `date`.
    pub fn balance_sheet_before(&self, date: Date) -> BalanceSheet {
        let mut sheet = BalanceSheet::new();
        for txn in self.txns.iter().take_while(|txn| txn.date < date) {
            if txn.flag == TxnFlag::Balance {
                continue;
            }
            for posting in txn.postings.iter() {
                *sheet
                    .entry(posting.account.clone())
                    .or_default()
                    .entry(posting.amount.currency.clone())
                    .or_default() += posting.amount.number;
            }
        }
        sheet
    }

    /// Returns a resolver over `sheet` checking account references against
    /// the accounts of this ledger.
    pub fn resolver<'l>(&'l self, sheet: &'l BalanceSheet) -> BalanceResolver<'l> {
        BalanceResolver::new(sheet, &self.accounts)
    }
}
