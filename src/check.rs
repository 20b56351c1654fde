//! Verifying a [`LedgerDraft`] and running its `balexpr` checks.
//!
//! Transactions are replayed in date order against a running balance sheet.
//! On each date, `balance` assertions are checked first, then `pad`
//! directives and transactions in the order they were written. A `pad` is
//! realized by the first failing `balance` of its account but stays dated on
//! its own date. `balexpr` checks run once the replay is done, each against
//! the transactions dated strictly before it, so padding counts from the pad
//! date on. Every failing directive is reported and dropped; it never stops
//! the checks that follow.

use rust_decimal::prelude::Zero;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::{
    expr::{Evaluator, ExprError, Resolver},
    options::*,
    parse::{AccountInfoDraft, LedgerDraft, PostingDraft, TxnDraft},
    utils::{find_accounts, parse_decimal},
    Account, AccountInfo, Amount, BalExpr, BalanceSheet, CheckReport, Currency, Date, Decimal,
    Error, ErrorLevel, ErrorType, Ledger, Posting, Source, Transaction, TxnFlag,
};

/// The absolute tolerance used when no option overrides it: `0.005`.
pub fn default_tolerance() -> Decimal {
    Decimal::new(5, 3)
}

fn is_subaccount(name: &str, parent: &str) -> bool {
    name.strip_prefix(parent)
        .map_or(false, |rest| rest.is_empty() || rest.starts_with(':'))
}

/// Returns the balance of `account` and all its descendants in `currency`.
pub fn subtree_balance(sheet: &BalanceSheet, account: &str, currency: &str) -> Decimal {
    sheet
        .iter()
        .filter(|(name, _)| is_subaccount(name, account))
        .filter_map(|(_, balances)| balances.get(currency))
        .sum()
}

/// Resolves accounts of a balance expression to their subtree balances in a
/// [`BalanceSheet`].
///
/// An account must have been opened in the ledger, and the requested currency
/// must be allowed by the `open` directive of the account.
#[derive(Debug, Clone, Copy)]
pub struct BalanceResolver<'l> {
    sheet: &'l BalanceSheet,
    accounts: &'l HashMap<Account, AccountInfo>,
}

impl<'l> BalanceResolver<'l> {
    pub fn new(sheet: &'l BalanceSheet, accounts: &'l HashMap<Account, AccountInfo>) -> Self {
        BalanceResolver { sheet, accounts }
    }
}

impl Resolver for BalanceResolver<'_> {
    fn resolve(&self, account: &str, as_of: Date, currency: &str) -> Result<Amount, ExprError> {
        let info = self
            .accounts
            .get(&account.to_string())
            .ok_or_else(|| ExprError::UnknownAccount {
                name: account.to_string(),
            })?;
        if !info.allows(currency) {
            let mut allowed: Vec<&str> = info.currencies.iter().map(|c| c.as_str()).collect();
            allowed.sort_unstable();
            return Err(ExprError::CurrencyMismatch {
                expected: currency.to_string(),
                found: allowed.join(","),
            });
        }
        let number = subtree_balance(self.sheet, account, currency);
        log::trace!("balance of {} as of {}: {} {}", account, as_of, number, currency);
        Ok(Amount::new(number, currency))
    }
}

fn expression_error(check: &BalExpr, error: ExprError) -> Error {
    let r#type = match error {
        ExprError::UnknownAccount { .. } => ErrorType::Account,
        ExprError::CurrencyMismatch { .. } => ErrorType::Currency,
        _ => ErrorType::Expression,
    };
    let src = match error.position() {
        Some(position) => {
            let start = position.relative_to(check.expr_start);
            Source {
                file: check.src.file.clone(),
                start,
                end: start.advance(1),
            }
        }
        None => check.src.clone(),
    };
    Error {
        msg: error.to_string(),
        src,
        r#type,
        level: ErrorLevel::Error,
    }
}

/// Evaluates the expression of `check` with `resolver` and compares the
/// result with the expected amount. Differences up to `tolerance` pass.
pub fn check_expression<R: Resolver>(
    check: BalExpr,
    resolver: R,
    tolerance: Decimal,
) -> (CheckReport, Option<Error>) {
    if find_accounts(&check.expr).is_empty() {
        let error = Error {
            msg: "No account found in the expression.".to_string(),
            src: check.src.clone(),
            r#type: ErrorType::Expression,
            level: ErrorLevel::Error,
        };
        let report = CheckReport {
            check,
            actual: None,
            passed: false,
        };
        return (report, Some(error));
    }
    let evaluator = Evaluator::new(resolver, check.date, check.expected.currency.clone());
    let actual = match evaluator.evaluate(&check.expr) {
        Ok(actual) => actual,
        Err(e) => {
            log::debug!("balexpr {:?} on {} failed: {}", check.expr, check.date, e);
            let error = expression_error(&check, e);
            let report = CheckReport {
                check,
                actual: None,
                passed: false,
            };
            return (report, Some(error));
        }
    };
    let diff = actual.number - check.expected.number;
    let error = if diff.abs() > tolerance {
        Some(Error {
            msg: format!(
                "BalExpr failed: expected {} != accumulated {} ({} {}).",
                check.expected,
                actual,
                diff.abs(),
                if diff > Decimal::zero() {
                    "too much"
                } else {
                    "too little"
                }
            ),
            src: check.src.clone(),
            r#type: ErrorType::Expression,
            level: ErrorLevel::Error,
        })
    } else {
        None
    };
    log::debug!(
        "balexpr {:?} on {}: {} (expected {})",
        check.expr,
        check.date,
        actual,
        check.expected
    );
    let report = CheckReport {
        check,
        actual: Some(actual),
        passed: error.is_none(),
    };
    (report, error)
}

fn check_accounts(
    accounts: HashMap<Account, AccountInfoDraft>,
    errors: &mut Vec<Error>,
) -> HashMap<Account, AccountInfo> {
    let mut result = HashMap::new();
    for (account, info_draft) in accounts {
        let AccountInfoDraft {
            open,
            close,
            currencies,
        } = info_draft;
        if let Some((open_date, open_src)) = open {
            let valid_close = match close {
                Some((close_date, close_src)) if close_date < open_date => {
                    errors.push(Error {
                        level: ErrorLevel::Error,
                        r#type: ErrorType::Account,
                        src: close_src,
                        msg: format!("{} closed before being opened.", &account),
                    });
                    None
                }
                close => close,
            };
            let valid_info = AccountInfo {
                open: (open_date, open_src),
                close: valid_close,
                currencies,
            };
            result.insert(account, valid_info);
        } else if let Some((_, close_src)) = close {
            errors.push(Error {
                level: ErrorLevel::Error,
                r#type: ErrorType::Account,
                src: close_src,
                msg: format!("Reference to an unknown account {}.", &account),
            });
        }
    }
    result
}

fn check_posting(
    account: &Account,
    amount: Option<&Amount>,
    txn_date: Date,
    accounts: &HashMap<Account, AccountInfo>,
) -> Result<(), (ErrorType, String)> {
    let info = accounts.get(account).ok_or_else(|| {
        (
            ErrorType::Account,
            format!("Reference to unknown account {}.", account),
        )
    })?;
    if txn_date < info.open.0 {
        return Err((
            ErrorType::Account,
            format!("{} unopened as of {}.", account, txn_date),
        ));
    }
    if let Some((close_date, _)) = info.close {
        if txn_date > close_date {
            return Err((
                ErrorType::Account,
                format!("{} closed as of {}.", account, txn_date),
            ));
        }
    }
    if let Some(Amount { currency, .. }) = amount {
        if !info.allows(currency) {
            let mut allowed: Vec<&Currency> = info.currencies.iter().collect();
            allowed.sort_unstable();
            return Err((
                ErrorType::Currency,
                format!(
                    "{} not in the allowed currency set of {}: {:?}.",
                    currency, account, allowed
                ),
            ));
        }
    }
    Ok(())
}

fn check_postings<'p>(
    postings: impl Iterator<Item = (&'p Account, Option<&'p Amount>, &'p Source)>,
    txn_date: Date,
    accounts: &HashMap<Account, AccountInfo>,
    errors: &mut Vec<Error>,
) -> bool {
    let mut valid = true;
    for (account, amount, src) in postings {
        if let Err((r#type, msg)) = check_posting(account, amount, txn_date, accounts) {
            errors.push(Error {
                msg,
                src: src.clone(),
                level: ErrorLevel::Error,
                r#type,
            });
            valid = false;
        }
    }
    valid
}

/// Infers the amount of the posting without one, if any, and checks that the
/// transaction is balanced in every currency.
fn complete_txn(txn: TxnDraft, tolerance: Decimal) -> Result<Transaction, Error> {
    let TxnDraft {
        date,
        flag,
        payee,
        narration,
        links,
        tags,
        meta,
        postings,
        src,
    } = txn;
    let mut sums: BTreeMap<Currency, Decimal> = BTreeMap::new();
    let mut elided: Option<(Account, Source)> = None;
    let mut valid_postings = Vec::with_capacity(postings.len());
    for posting in postings {
        let PostingDraft {
            account,
            amount,
            src: posting_src,
        } = posting;
        match amount {
            Some(amount) => {
                *sums.entry(amount.currency.clone()).or_default() += amount.number;
                valid_postings.push(Posting {
                    account,
                    amount,
                    src: posting_src,
                });
            }
            None if elided.is_some() => {
                return Err(Error {
                    msg: "More than one posting without amount.".to_string(),
                    src: posting_src,
                    r#type: ErrorType::Incomplete,
                    level: ErrorLevel::Error,
                });
            }
            None => elided = Some((account, posting_src)),
        }
    }
    if let Some((account, posting_src)) = elided {
        for (currency, sum) in sums {
            if sum.is_zero() {
                continue;
            }
            valid_postings.push(Posting {
                account: account.clone(),
                amount: Amount::new(-sum, currency),
                src: posting_src.clone(),
            });
        }
    } else if let Some((currency, sum)) = sums.iter().find(|(_, sum)| sum.abs() > tolerance) {
        return Err(Error {
            msg: format!("Transaction not balanced: {} {} left.", sum, currency),
            src,
            r#type: ErrorType::NotBalanced,
            level: ErrorLevel::Error,
        });
    }
    Ok(Transaction {
        date,
        flag,
        payee,
        narration,
        links,
        tags,
        meta,
        postings: valid_postings,
        src,
    })
}

fn merge_postings(running_balance: &mut BalanceSheet, postings: &[Posting]) {
    for posting in postings {
        *running_balance
            .entry(posting.account.clone())
            .or_default()
            .entry(posting.amount.currency.clone())
            .or_default() += posting.amount.number;
    }
}

struct Tolerances {
    default: Decimal,
    balexpr: Decimal,
}

fn extract_tolerances(
    options: &HashMap<String, (String, Source)>,
    errors: &mut Vec<Error>,
) -> Tolerances {
    let mut read = |key: &str| match options.get(key) {
        Some((num_str, src)) => match parse_decimal(num_str, src) {
            Ok(num) => num.abs(),
            Err(err) => {
                errors.push(err);
                default_tolerance()
            }
        },
        None => default_tolerance(),
    };
    Tolerances {
        default: read(OPTION_DEFAULT_TOLERANCE),
        balexpr: read(OPTION_BALEXPR_TOLERANCE),
    }
}

fn equal_within(lhs: Decimal, rhs: Decimal, tolerance: Decimal) -> bool {
    lhs == rhs || (lhs - rhs).abs() <= tolerance
}

struct PadFromInfo {
    from: Account,
    currencies: HashSet<Currency>,
    index: usize,
}

fn try_padding(
    dest_account: &Account,
    pad_amount: Amount,
    pad_from: &mut HashMap<Account, PadFromInfo>,
    valid_txns: &mut [Transaction],
    valid_accounts: &HashMap<Account, AccountInfo>,
    balance_src: &Source,
) -> Result<Account, Option<Error>> {
    let info = pad_from.get_mut(dest_account).ok_or(None)?;
    let currency = &pad_amount.currency;
    if let Some(from_info) = valid_accounts.get(&info.from) {
        if !from_info.allows(currency) {
            return Err(Some(Error {
                msg: format!("Account {} cannot hold {}.", &info.from, currency),
                level: ErrorLevel::Error,
                r#type: ErrorType::Currency,
                src: balance_src.clone(),
            }));
        }
    }
    if !info.currencies.insert(currency.clone()) {
        return Err(None);
    }
    let pad_placeholder = &mut valid_txns[info.index];
    pad_placeholder.postings.push(Posting {
        account: info.from.clone(),
        amount: Amount::new(-pad_amount.number, currency.clone()),
        src: balance_src.clone(),
    });
    pad_placeholder.postings.push(Posting {
        account: dest_account.clone(),
        amount: pad_amount,
        src: balance_src.clone(),
    });
    Ok(info.from.clone())
}

fn check_balance(
    txn: TxnDraft,
    running_balance: &mut BalanceSheet,
    errors: &mut Vec<Error>,
    tolerance: Decimal,
    pad_from: &mut HashMap<Account, PadFromInfo>,
    valid_txns: &mut [Transaction],
    valid_accounts: &HashMap<Account, AccountInfo>,
) -> Option<Transaction> {
    let mut valid_postings: Vec<Posting> = Vec::new();
    let TxnDraft {
        date,
        flag,
        payee,
        narration,
        links,
        tags,
        meta,
        postings,
        src,
    } = txn;
    for posting in postings {
        let PostingDraft {
            account,
            amount,
            src: posting_src,
        } = posting;
        let p_amount = match amount {
            Some(amount) => amount,
            None => {
                errors.push(Error {
                    level: ErrorLevel::Error,
                    r#type: ErrorType::Incomplete,
                    msg: "Missing amount.".to_string(),
                    src: posting_src,
                });
                continue;
            }
        };
        let holding_total = subtree_balance(running_balance, &account, &p_amount.currency);
        if equal_within(holding_total, p_amount.number, tolerance) {
            valid_postings.push(Posting {
                account,
                amount: p_amount,
                src: posting_src,
            });
            continue;
        }
        let pad_amount = Amount::new(p_amount.number - holding_total, p_amount.currency.clone());
        match try_padding(
            &account,
            pad_amount.clone(),
            pad_from,
            valid_txns,
            valid_accounts,
            &posting_src,
        ) {
            Ok(account_from) => {
                log::debug!("padded {} {} from {}", account, pad_amount, account_from);
                *running_balance
                    .entry(account.clone())
                    .or_default()
                    .entry(pad_amount.currency.clone())
                    .or_default() += pad_amount.number;
                *running_balance
                    .entry(account_from)
                    .or_default()
                    .entry(pad_amount.currency.clone())
                    .or_default() -= pad_amount.number;
                valid_postings.push(Posting {
                    account,
                    amount: p_amount,
                    src: posting_src,
                });
            }
            Err(None) => errors.push(Error {
                level: ErrorLevel::Error,
                r#type: ErrorType::NotBalanced,
                msg: format!(
                    "Failed assertion: {} != {} {}.",
                    &p_amount, holding_total, &p_amount.currency
                ),
                src: posting_src,
            }),
            Err(Some(error)) => errors.push(error),
        }
    }
    if valid_postings.is_empty() {
        None
    } else {
        Some(Transaction {
            date,
            flag,
            payee,
            narration,
            links,
            tags,
            meta,
            postings: valid_postings,
            src,
        })
    }
}

fn replay_order(txn: &TxnDraft) -> (Date, bool) {
    (txn.date, txn.flag != TxnFlag::Balance)
}

/// Runs `checks` against the realized `txns`, which must be sorted by date.
fn run_checks(
    mut checks: Vec<BalExpr>,
    txns: &[Transaction],
    accounts: &HashMap<Account, AccountInfo>,
    tolerance: Decimal,
    errors: &mut Vec<Error>,
) -> Vec<CheckReport> {
    checks.sort_by_key(|check| check.date);
    let mut sheet = BalanceSheet::new();
    let mut replayed = txns
        .iter()
        .filter(|txn| txn.flag != TxnFlag::Balance)
        .peekable();
    let mut reports = Vec::with_capacity(checks.len());
    for check in checks {
        while let Some(txn) = replayed.next_if(|txn| txn.date < check.date) {
            merge_postings(&mut sheet, &txn.postings);
        }
        let resolver = BalanceResolver::new(&sheet, accounts);
        let (report, error) = check_expression(check, resolver, tolerance);
        errors.extend(error);
        reports.push(report);
    }
    reports
}

impl LedgerDraft {
    /// Consuming `self`, returns a [`Ledger`] and the errors encountered
    /// during verifying accounts, completing transactions, checking `balance`
    /// assertions, applying `pad` directives, and then running `balexpr`
    /// checks.
    /// Directives causing an error with [`ErrorLevel::Error`] are dropped, so
    /// the returned [`Ledger`] contains a subset of the information in `self`.
    pub fn into_ledger(self) -> (Ledger, Vec<Error>) {
        let LedgerDraft {
            accounts,
            mut txns,
            checks,
            options,
            plugins: _,
        } = self;
        let mut errors = Vec::new();
        let valid_accounts = check_accounts(accounts, &mut errors);
        let tolerances = extract_tolerances(&options, &mut errors);
        txns.sort_by_key(replay_order);

        let mut valid_txns: Vec<Transaction> = Vec::new();
        let mut running_balance = BalanceSheet::new();
        let mut pad_from: HashMap<Account, PadFromInfo> = HashMap::new();
        for txn in txns {
            let postings = txn
                .postings
                .iter()
                .map(|p| (&p.account, p.amount.as_ref(), &p.src));
            if !check_postings(postings, txn.date, &valid_accounts, &mut errors) {
                continue;
            }

            match txn.flag {
                TxnFlag::Balance => {
                    if let Some(valid_txn) = check_balance(
                        txn,
                        &mut running_balance,
                        &mut errors,
                        tolerances.default,
                        &mut pad_from,
                        &mut valid_txns,
                        &valid_accounts,
                    ) {
                        valid_txns.push(valid_txn);
                    }
                }
                TxnFlag::Pending | TxnFlag::Posted => {
                    let valid_txn = match complete_txn(txn, tolerances.default) {
                        Ok(valid_txn) => valid_txn,
                        Err(error) => {
                            errors.push(error);
                            continue;
                        }
                    };
                    let postings = valid_txn
                        .postings
                        .iter()
                        .map(|p| (&p.account, Some(&p.amount), &p.src));
                    if check_postings(postings, valid_txn.date, &valid_accounts, &mut errors) {
                        merge_postings(&mut running_balance, &valid_txn.postings);
                        valid_txns.push(valid_txn);
                    }
                }
                TxnFlag::Pad => {
                    let TxnDraft {
                        date,
                        flag,
                        links,
                        tags,
                        meta,
                        postings,
                        src,
                        ..
                    } = txn;
                    if postings.len() == 2 && postings.iter().all(|p| p.amount.is_none()) {
                        let pad_placeholder = Transaction {
                            date,
                            flag,
                            payee: String::new(),
                            narration: format!(
                                "Pad {} from {}",
                                &postings[0].account, &postings[1].account
                            ),
                            links,
                            tags,
                            meta,
                            postings: Vec::new(),
                            src,
                        };
                        pad_from.insert(
                            postings[0].account.clone(),
                            PadFromInfo {
                                from: postings[1].account.clone(),
                                currencies: HashSet::new(),
                                index: valid_txns.len(),
                            },
                        );
                        valid_txns.push(pad_placeholder);
                    } else {
                        errors.push(Error {
                            msg: "Invalid syntax: Pad must contains two accounts.".to_string(),
                            level: ErrorLevel::Error,
                            r#type: ErrorType::Syntax,
                            src,
                        });
                    }
                }
            }
        }
        let reports = run_checks(
            checks,
            &valid_txns,
            &valid_accounts,
            tolerances.balexpr,
            &mut errors,
        );
        let ledger = Ledger {
            accounts: valid_accounts,
            txns: valid_txns,
            checks: reports,
            options,
            balance_sheet: running_balance,
        };
        (ledger, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn sheet(entries: &[(&str, &str, &str)]) -> BalanceSheet {
        let mut sheet = BalanceSheet::new();
        for (account, number, currency) in entries {
            *sheet
                .entry(Arc::new(account.to_string()))
                .or_default()
                .entry(currency.to_string())
                .or_default() += d(number);
        }
        sheet
    }

    #[test]
    fn subtree_balance_includes_descendants_only() {
        let sheet = sheet(&[
            ("Assets:Bank", "10", "USD"),
            ("Assets:Bank:Checking", "5", "USD"),
            ("Assets:Bank:Checking", "7", "EUR"),
            ("Assets:Banknotes", "100", "USD"),
        ]);
        assert_eq!(subtree_balance(&sheet, "Assets:Bank", "USD"), d("15"));
        assert_eq!(subtree_balance(&sheet, "Assets:Bank:Checking", "EUR"), d("7"));
        assert_eq!(subtree_balance(&sheet, "Assets", "USD"), d("115"));
        assert_eq!(subtree_balance(&sheet, "Assets:Cash", "USD"), d("0"));
    }

    #[test]
    fn equal_within_tolerance_is_inclusive() {
        assert!(equal_within(d("0.81"), d("0.805"), default_tolerance()));
        assert!(!equal_within(d("0.81"), d("0.8049"), default_tolerance()));
    }
}
