use super::{ExprError, Malformation, Operator, Scanner, Token};
use crate::{Amount, Currency, Date, Location};
use std::collections::HashMap;

/// Resolves an account in a balance expression to its balance.
///
/// Any `Fn(&str, Date, &str) -> Result<Amount, ExprError>` closure is a
/// resolver, which is handy for tests and for callers keeping balances in
/// their own structures. [`BalanceResolver`](crate::check::BalanceResolver)
/// resolves accounts against the running balances of a ledger.
pub trait Resolver {
    /// Returns the balance of `account` in `currency` as of `as_of`. Fails
    /// with [`ExprError::UnknownAccount`] or [`ExprError::CurrencyMismatch`].
    fn resolve(&self, account: &str, as_of: Date, currency: &str) -> Result<Amount, ExprError>;
}

impl<F> Resolver for F
where
    F: Fn(&str, Date, &str) -> Result<Amount, ExprError>,
{
    fn resolve(&self, account: &str, as_of: Date, currency: &str) -> Result<Amount, ExprError> {
        self(account, as_of, currency)
    }
}

#[derive(Debug)]
enum Slot {
    Value(Amount),
    Op(Operator, Location),
    Paren(Location),
}

fn apply(lhs: &Amount, op: Operator, rhs: &Amount, position: Location) -> Result<Amount, ExprError> {
    let result = match op {
        Operator::Add | Operator::Sub => {
            if lhs.currency != rhs.currency {
                return Err(ExprError::CurrencyMismatch {
                    expected: lhs.currency.clone(),
                    found: rhs.currency.clone(),
                });
            }
            if op == Operator::Add {
                lhs.checked_add(rhs)
            } else {
                lhs.checked_sub(rhs)
            }
        }
        Operator::Mul => lhs.checked_mul(rhs.number),
        Operator::Div => {
            if rhs.number.is_zero() {
                return Err(ExprError::DivisionByZero { position });
            }
            lhs.checked_div(rhs.number)
        }
    };
    result.ok_or(ExprError::Overflow { position })
}

/// Values, pending operators and `(` markers of one evaluation.
///
/// `*` and `/` are folded into the value beneath them as soon as their right
/// operand is pushed, so only `+` and `-` are ever left pending between
/// values. Those are applied left to right when a parenthesis closes or the
/// input ends.
#[derive(Debug, Default)]
struct ValueStack {
    slots: Vec<Slot>,
}

impl ValueStack {
    fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn top_operator(&self) -> Option<Location> {
        match self.slots.last() {
            Some(Slot::Op(_, position)) => Some(*position),
            _ => None,
        }
    }

    fn push_value(&mut self, value: Amount) -> Result<(), ExprError> {
        let (op, position) = match self.slots.last() {
            Some(Slot::Op(op, position)) if op.is_multiplicative() => (*op, *position),
            _ => {
                self.slots.push(Slot::Value(value));
                return Ok(());
            }
        };
        self.slots.pop();
        match self.slots.last_mut() {
            Some(Slot::Value(lhs)) => {
                *lhs = apply(lhs, op, &value, position)?;
                log::trace!("folded {} {} into {}", op, value, lhs);
                Ok(())
            }
            _ => Err(ExprError::MalformedExpression {
                position,
                kind: Malformation::LeadingOperator,
            }),
        }
    }

    fn push_operator(&mut self, op: Operator, position: Location) {
        self.slots.push(Slot::Op(op, position));
    }

    /// Pushes a `(` marker and returns the mark to close it with.
    fn open_paren(&mut self, position: Location) -> usize {
        let mark = self.slots.len();
        self.slots.push(Slot::Paren(position));
        mark
    }

    fn paren_position(&self, mark: usize) -> Option<Location> {
        match self.slots.get(mark) {
            Some(Slot::Paren(position)) => Some(*position),
            _ => None,
        }
    }

    /// Sums the slots from `start` to the top and removes them. `end` is
    /// reported when the slots do not alternate between values and operators.
    fn reduce(&mut self, start: usize, end: Location) -> Result<Amount, ExprError> {
        let mut slots = self.slots.drain(start..);
        let mut total = match slots.next() {
            Some(Slot::Value(value)) => value,
            Some(Slot::Op(_, position)) => {
                return Err(ExprError::MalformedExpression {
                    position,
                    kind: Malformation::LeadingOperator,
                })
            }
            Some(Slot::Paren(position)) => return Err(ExprError::UnclosedParen { position }),
            None => {
                return Err(ExprError::MalformedExpression {
                    position: end,
                    kind: Malformation::EmptyParens,
                })
            }
        };
        while let Some(slot) = slots.next() {
            let (op, position) = match slot {
                Slot::Op(op, position) => (op, position),
                Slot::Value(_) => {
                    return Err(ExprError::MalformedExpression {
                        position: end,
                        kind: Malformation::MissingOperator,
                    })
                }
                Slot::Paren(position) => return Err(ExprError::UnclosedParen { position }),
            };
            match slots.next() {
                Some(Slot::Value(value)) => total = apply(&total, op, &value, position)?,
                _ => {
                    return Err(ExprError::MalformedExpression {
                        position,
                        kind: Malformation::DanglingOperator,
                    })
                }
            }
        }
        Ok(total)
    }

    /// Reduces everything after the `(` marker at `mark`, then removes the
    /// marker itself.
    fn close_paren(&mut self, mark: usize, position: Location) -> Result<Amount, ExprError> {
        let value = self.reduce(mark + 1, position)?;
        self.slots.truncate(mark);
        Ok(value)
    }
}

/// Evaluates balance expressions such as `Assets:A + Assets:B * 2`.
///
/// Number literals take the currency of the evaluator, and accounts are
/// resolved through `resolver` in that currency as of the given date. Every
/// account is resolved at most once per call to [`Evaluator::evaluate`];
/// nothing is kept between calls.
pub struct Evaluator<R> {
    resolver: R,
    as_of: Date,
    currency: Currency,
}

impl<R: Resolver> Evaluator<R> {
    pub fn new(resolver: R, as_of: Date, currency: impl Into<Currency>) -> Self {
        Evaluator {
            resolver,
            as_of,
            currency: currency.into(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn as_of(&self) -> Date {
        self.as_of
    }

    fn expect_operand(expect: bool, position: Location) -> Result<(), ExprError> {
        if expect {
            Ok(())
        } else {
            Err(ExprError::MalformedExpression {
                position,
                kind: Malformation::MissingOperator,
            })
        }
    }

    /// Evaluates `text` to a single amount.
    pub fn evaluate(&self, text: &str) -> Result<Amount, ExprError> {
        let mut stack = ValueStack::default();
        let mut parens: Vec<usize> = Vec::new();
        let mut cache: HashMap<&str, Amount> = HashMap::new();
        let mut expect_operand = true;
        let mut scanner = Scanner::new(text);
        for item in scanner.by_ref() {
            let (token, position) = item?;
            match token {
                Token::Identifier(account) => {
                    Self::expect_operand(expect_operand, position)?;
                    let amount = match cache.get(account) {
                        Some(amount) => amount.clone(),
                        None => {
                            let amount =
                                self.resolver
                                    .resolve(account, self.as_of, &self.currency)?;
                            log::trace!("resolved {} as {}", account, amount);
                            cache.insert(account, amount.clone());
                            amount
                        }
                    };
                    stack.push_value(amount)?;
                    expect_operand = false;
                }
                Token::Number(number) => {
                    Self::expect_operand(expect_operand, position)?;
                    stack.push_value(Amount::new(number, self.currency.clone()))?;
                    expect_operand = false;
                }
                Token::Operator(op) => {
                    if expect_operand {
                        let kind = if stack.top_operator().is_some() {
                            Malformation::ConsecutiveOperators
                        } else {
                            Malformation::LeadingOperator
                        };
                        return Err(ExprError::MalformedExpression { position, kind });
                    }
                    stack.push_operator(op, position);
                    expect_operand = true;
                }
                Token::LeftParen => {
                    Self::expect_operand(expect_operand, position)?;
                    parens.push(stack.open_paren(position));
                }
                Token::RightParen => {
                    let mark = parens
                        .pop()
                        .ok_or(ExprError::UnmatchedParen { position })?;
                    if expect_operand {
                        return Err(match stack.top_operator() {
                            Some(op_position) => ExprError::MalformedExpression {
                                position: op_position,
                                kind: Malformation::DanglingOperator,
                            },
                            None => ExprError::MalformedExpression {
                                position,
                                kind: Malformation::EmptyParens,
                            },
                        });
                    }
                    let value = stack.close_paren(mark, position)?;
                    stack.push_value(value)?;
                }
            }
        }
        if let Some(&mark) = parens.last() {
            let position = stack.paren_position(mark).unwrap_or_default();
            return Err(ExprError::UnclosedParen { position });
        }
        if stack.is_empty() {
            return Err(ExprError::EmptyExpression);
        }
        if let (true, Some(position)) = (expect_operand, stack.top_operator()) {
            return Err(ExprError::MalformedExpression {
                position,
                kind: Malformation::DanglingOperator,
            });
        }
        log::trace!("reducing {} slots", stack.len());
        let result = stack.reduce(0, scanner.location())?;
        log::debug!("evaluated {:?} to {}", text.trim(), result);
        Ok(result)
    }
}

/// Evaluates `text` with a one-off [`Evaluator`].
pub fn evaluate<R: Resolver>(
    text: &str,
    resolver: R,
    as_of: Date,
    currency: &str,
) -> Result<Amount, ExprError> {
    Evaluator::new(resolver, as_of, currency).evaluate(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Decimal;
    use std::cell::Cell;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn date() -> Date {
        Date::from_ymd_opt(1991, 1, 3).unwrap()
    }

    fn balances(account: &str, _: Date, currency: &str) -> Result<Amount, ExprError> {
        let number = match account {
            "A" | "Assets:A" => d("213.00"),
            "B" | "Assets:B" => d("264.00"),
            "Zero" => Decimal::ZERO,
            _ => {
                return Err(ExprError::UnknownAccount {
                    name: account.to_string(),
                })
            }
        };
        Ok(Amount::new(number, currency))
    }

    fn eval(text: &str) -> Result<Amount, ExprError> {
        Evaluator::new(balances, date(), "USD").evaluate(text)
    }

    fn number(text: &str) -> Decimal {
        eval(text).unwrap().number
    }

    #[test]
    fn sums_accounts_in_parentheses() {
        assert_eq!(eval("(A+B)"), Ok(Amount::new(d("477.00"), "USD")));
        assert_eq!(number("Assets:A+Assets:B"), d("477"));
        assert_eq!(number("Assets:A-Assets:B"), d("-51"));
        assert_eq!(number("A+200.00"), d("413"));
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(number("B*(A+200.00)"), d("109032.00"));
        assert_eq!(number("A*B"), d("56232"));
        assert_eq!(number("A+A*B"), d("56445"));
        assert_eq!(number("A*B+A"), d("56445"));
        assert_eq!(number("(A+A)*B"), d("112464"));
        assert_eq!(number("10-2*3-1"), d("3"));
        assert_eq!(number("2*3*4/8"), d("3"));
        assert_eq!(number("100/(2+3)*2"), d("40"));
        assert_eq!(number("((1+2)*(3+4))"), d("21"));
    }

    #[test]
    fn subtraction_is_left_associative() {
        assert_eq!(number("10-3-2"), d("5"));
        assert_eq!(number("10-(3-2)"), d("9"));
    }

    #[test]
    fn division_keeps_precision() {
        let ratio = number("A/B");
        assert!((ratio - d("0.81")).abs() < d("0.005"), "{}", ratio);
    }

    #[test]
    fn unclosed_paren_points_at_innermost_open() {
        assert_eq!(
            eval("(A+B"),
            Err(ExprError::UnclosedParen {
                position: (1, 1).into()
            })
        );
        assert_eq!(
            eval("(A+(B"),
            Err(ExprError::UnclosedParen {
                position: (1, 4).into()
            })
        );
        assert_eq!(
            eval("(A+"),
            Err(ExprError::UnclosedParen {
                position: (1, 1).into()
            })
        );
    }

    #[test]
    fn unmatched_paren() {
        assert_eq!(
            eval("A+B)"),
            Err(ExprError::UnmatchedParen {
                position: (1, 4).into()
            })
        );
        assert_eq!(
            eval(")"),
            Err(ExprError::UnmatchedParen {
                position: (1, 1).into()
            })
        );
    }

    #[test]
    fn unknown_character() {
        assert_eq!(
            eval("A^B"),
            Err(ExprError::UnknownCharacter {
                position: (1, 2).into(),
                character: '^',
            })
        );
    }

    #[test]
    fn resolver_errors_abort_evaluation() {
        assert_eq!(
            eval("C+200"),
            Err(ExprError::UnknownAccount {
                name: "C".to_string()
            })
        );
        // The account is met before the unknown character.
        assert_eq!(
            eval("C^B"),
            Err(ExprError::UnknownAccount {
                name: "C".to_string()
            })
        );
    }

    #[test]
    fn empty_expression_is_distinct_from_zero() {
        assert_eq!(eval(""), Err(ExprError::EmptyExpression));
        assert_eq!(eval(" \n\t "), Err(ExprError::EmptyExpression));
        assert_eq!(eval("Zero"), Ok(Amount::new(Decimal::ZERO, "USD")));
    }

    #[test]
    fn malformed_operator_sequences() {
        let malformed = |text: &str, col: usize, kind: Malformation| {
            assert_eq!(
                eval(text),
                Err(ExprError::MalformedExpression {
                    position: (1, col).into(),
                    kind
                }),
                "{}",
                text
            );
        };
        malformed("+A", 1, Malformation::LeadingOperator);
        malformed("A+*B", 3, Malformation::ConsecutiveOperators);
        malformed("A-", 2, Malformation::DanglingOperator);
        malformed("A*", 2, Malformation::DanglingOperator);
        malformed("(A-)", 3, Malformation::DanglingOperator);
        malformed("A B", 3, Malformation::MissingOperator);
        malformed("(A)(B)", 4, Malformation::MissingOperator);
        malformed("A()", 2, Malformation::MissingOperator);
        malformed("()", 2, Malformation::EmptyParens);
        malformed("(*A)", 2, Malformation::LeadingOperator);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(
            eval("A/(B-264)"),
            Err(ExprError::DivisionByZero {
                position: (1, 2).into()
            })
        );
        assert_eq!(
            eval("A/Zero"),
            Err(ExprError::DivisionByZero {
                position: (1, 2).into()
            })
        );
    }

    #[test]
    fn overflow_is_reported_at_the_operator() {
        let resolver = |account: &str, _: Date, currency: &str| -> Result<Amount, ExprError> {
            match account {
                "Max" => Ok(Amount::new(Decimal::MAX, currency)),
                _ => balances(account, date(), currency),
            }
        };
        let evaluator = Evaluator::new(resolver, date(), "USD");
        assert_eq!(
            evaluator.evaluate("Max*2"),
            Err(ExprError::Overflow {
                position: (1, 4).into()
            })
        );
        assert_eq!(
            evaluator.evaluate("Zero + Max + Max"),
            Err(ExprError::Overflow {
                position: (1, 12).into()
            })
        );
        assert_eq!(
            evaluator.evaluate("Max - 1"),
            Ok(Amount::new(Decimal::MAX - Decimal::ONE, "USD"))
        );
    }

    #[test]
    fn adding_different_currencies_fails() {
        let resolver = |account: &str, _: Date, _: &str| -> Result<Amount, ExprError> {
            Ok(Amount::new(
                Decimal::ONE,
                if account == "Assets:Eur" { "EUR" } else { "USD" },
            ))
        };
        let evaluator = Evaluator::new(resolver, date(), "USD");
        assert_eq!(
            evaluator.evaluate("Assets:Usd+Assets:Eur"),
            Err(ExprError::CurrencyMismatch {
                expected: "USD".to_string(),
                found: "EUR".to_string(),
            })
        );
        // Scaling ignores the currency of the scalar.
        assert_eq!(
            evaluator.evaluate("Assets:Usd*Assets:Eur"),
            Ok(Amount::new(Decimal::ONE, "USD"))
        );
    }

    #[test]
    fn each_account_is_resolved_once_per_evaluation() {
        let calls = Cell::new(0);
        let resolver = |account: &str, as_of: Date, currency: &str| {
            calls.set(calls.get() + 1);
            balances(account, as_of, currency)
        };
        let evaluator = Evaluator::new(resolver, date(), "USD");
        assert_eq!(
            evaluator.evaluate("A+A*(A-B)").unwrap().number,
            d("-10650")
        );
        assert_eq!(calls.get(), 2);
        // Nothing is cached across evaluations.
        evaluator.evaluate("A").unwrap();
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn resolver_receives_date_and_currency() {
        let resolver = |account: &str, as_of: Date, currency: &str| -> Result<Amount, ExprError> {
            assert_eq!(account, "Assets:A");
            assert_eq!(as_of, date());
            assert_eq!(currency, "CNY");
            Ok(Amount::new(Decimal::ONE, currency))
        };
        assert_eq!(
            evaluate("Assets:A + 1", resolver, date(), "CNY"),
            Ok(Amount::new(d("2"), "CNY"))
        );
    }

    #[test]
    fn repeated_evaluations_agree() {
        let evaluator = Evaluator::new(balances, date(), "USD");
        let first = evaluator.evaluate("B*(A+200.00)/3");
        let second = evaluator.evaluate("B*(A+200.00)/3");
        assert_eq!(first, second);
    }

    #[test]
    fn whitespace_does_not_change_the_result() {
        assert_eq!(eval("A+\n\tB"), eval("A+B"));
        assert_eq!(
            eval("\r\n  (\r\n    A+\r\n    A\r\n  )*\r\n  B"),
            eval("(A+A)*B")
        );
    }

    #[test]
    fn evaluators_can_be_shared_across_threads() {
        let evaluator = Evaluator::new(balances, date(), "USD");
        let results: Vec<Decimal> = std::thread::scope(|s| {
            let handles: Vec<_> = ["A+B", "A*B", "(A+A)*B"]
                .iter()
                .map(|text| {
                    let evaluator = &evaluator;
                    s.spawn(move || evaluator.evaluate(text).unwrap().number)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results, vec![d("477"), d("56232"), d("112464")]);
    }
}
