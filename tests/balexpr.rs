use balexpr::expr::ExprError;
use balexpr::{Amount, Date, Decimal, ErrorType, Ledger, Location};

fn load(text: &str) -> (Ledger, Vec<balexpr::Error>) {
    Ledger::from_text(text, "test.bean")
}

fn date(y: i32, m: u32, d: u32) -> Date {
    Date::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn good_expressions_pass() {
    let (ledger, errors) = load(
        r#"plugin "beancount_balexpr.balexpr"
1990-01-01 open Assets:A USD
1990-01-01 open Assets:B USD
1990-01-01 open Assets:C USD
1990-01-01 open Equity:OpenBalance USD
1991-01-01 pad Assets:A Equity:OpenBalance
1991-01-01 pad Assets:B Equity:OpenBalance
1991-01-01 pad Assets:C Equity:OpenBalance
1991-01-02 balance Assets:A 213.00 USD
1991-01-02 balance Assets:B 264.00 USD
1991-01-02 balance Assets:C 20.00 USD

1991-01-03 * "This record should not have impact on balexpr"
  Assets:B +20 USD
  Assets:C

1991-01-03 custom "balexpr" "Assets:A+Assets:B" 477.00 USD
1991-01-03 custom "balexpr" "Assets:A+200.00" 413.00 USD
1991-01-03 custom "balexpr" "Assets:B*(Assets:A+200.00)" 109032.00 USD
1991-01-03 custom "balexpr" "Assets:A-Assets:B" -51.00 USD
1991-01-03 custom "balexpr" "Assets:A*Assets:B" 56232.00 USD
1991-01-03 custom "balexpr" "Assets:A/Assets:B" 0.81 USD
1991-01-03 custom "balexpr" "Assets:A+Assets:A*Assets:B" 56445.00 USD
1991-01-03 custom "balexpr" "(Assets:A+Assets:A)*Assets:B" 112464.00 USD
"#,
    );
    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(ledger.checks().len(), 8);
    assert!(ledger.checks().iter().all(|r| r.passed()));
    assert_eq!(
        ledger.checks()[0].actual(),
        &Some(Amount::new(Decimal::new(47700, 2), "USD"))
    );
}

#[test]
fn zero_account() {
    let (ledger, errors) = load(
        r#"plugin "beancount_balexpr.balexpr"
1990-01-01 open Assets:A USD
1990-01-01 open Equity:OpenBalance
1991-01-02 balance Assets:A 0.00 USD
1991-01-03 custom "balexpr" "Assets:A" 0.00 USD
"#,
    );
    assert!(errors.is_empty(), "{:?}", errors);
    assert!(ledger.checks()[0].passed());
}

const BAD_HEADER: &str = r#"plugin "beancount_balexpr.balexpr"
1990-01-01 open Assets:A USD
1990-01-01 open Assets:B USD
1990-01-01 open Equity:OpenBalance
1991-01-01 pad Assets:A Equity:OpenBalance
1991-01-01 pad Assets:B Equity:OpenBalance
1991-01-02 balance Assets:A 213.00 USD
1991-01-02 balance Assets:B 264.00 USD
"#;

#[test]
fn bad_expressions_are_reported() {
    let text = format!(
        "{}{}",
        BAD_HEADER,
        r#"1991-01-03 custom "balexpr" "Assets:A+Assets:B" 400.00 USD
1991-01-03 custom "balexpr" "Assets:A^Assets:B" 400.00 USD
1991-01-03 custom "balexpr" "(Assets:A+Assets:B" 400.00 USD
1991-01-03 custom "balexpr" "Assets:C+200" 400.00 USD
1991-01-03 custom "balexpr" "(Assets:A+Assets:A)*Assets:B" 112464.00 CNY
"#
    );
    let (ledger, errors) = load(&text);
    assert_eq!(errors.len(), 5, "{:?}", errors);
    assert!(ledger.checks().iter().all(|r| !r.passed()));

    assert_eq!(errors[0].r#type, ErrorType::Expression);
    assert_eq!(
        errors[0].msg,
        "BalExpr failed: expected 400.00 USD != accumulated 477.00 USD (77.00 too much)."
    );
    assert_eq!(
        errors[1].msg,
        ExprError::UnknownCharacter {
            position: (1, 9).into(),
            character: '^',
        }
        .to_string()
    );
    assert_eq!(errors[1].src.start, Location { line: 10, col: 38 });
    assert_eq!(errors[2].r#type, ErrorType::Expression);
    assert_eq!(errors[3].r#type, ErrorType::Account);
    assert_eq!(
        errors[3].msg,
        "Invalid reference to unknown account 'Assets:C'."
    );
    assert_eq!(errors[4].r#type, ErrorType::Currency);
}

#[test]
fn bad_multi_line_expressions_are_reported() {
    let text = format!(
        "{}{}",
        BAD_HEADER,
        r#"1991-01-03 custom "balexpr" "
  Assets:A+
  Assets:B" 400.00 USD
1991-01-03 custom "balexpr" "
  Assets:A^
  Assets:B" 400.00 USD
1991-01-03 custom "balexpr" "
  (
    Assets:A+
    Assets:B" 400.00 USD
1991-01-03 custom "balexpr" "
  Assets:C+
  200" 400.00 USD
1991-01-03 custom "balexpr" "
  (
    Assets:A+
    Assets:A
  )*
  Assets:B" 112464.00 CNY
"#
    );
    let (_, errors) = load(&text);
    assert_eq!(errors.len(), 5, "{:?}", errors);
    // `^` sits on the second line of the expression starting on line 12.
    assert_eq!(errors[1].src.start, Location { line: 13, col: 11 });
}

fn newline_ledger(newline: &str, indent: &str) -> String {
    [
        r#"plugin "beancount_balexpr.balexpr""#,
        "1990-01-01 open Assets:A USD",
        "1990-01-01 open Assets:B USD",
        "1990-01-01 open Equity:OpenBalance USD",
        r#"1999-01-02 * "Populate accounts""#,
        "  Assets:A 20.00 USD",
        "  Assets:B 10.00 USD",
        "  Equity:OpenBalance -30.00 USD",
        r#"1999-01-03 custom "balexpr" ""#,
        &format!("{}Assets:A +", indent),
        &format!(r#"{}Assets:B" 30.00 USD"#, indent),
    ]
    .join(newline)
}

#[test]
fn expression_with_linux_newlines() {
    let (ledger, errors) = load(&newline_ledger("\n", "  "));
    assert!(errors.is_empty(), "{:?}", errors);
    assert!(ledger.checks()[0].passed());
}

#[test]
fn expression_with_windows_newlines() {
    let (ledger, errors) = load(&newline_ledger("\r\n", "  "));
    assert!(errors.is_empty(), "{:?}", errors);
    assert!(ledger.checks()[0].passed());
}

#[test]
fn expression_with_newlines_and_tabs() {
    let (ledger, errors) = load(&newline_ledger("\n", "\t"));
    assert!(errors.is_empty(), "{:?}", errors);
    assert!(ledger.checks()[0].passed());
}

#[test]
fn expression_without_account_is_rejected() {
    let (ledger, errors) = load(
        r#"1990-01-01 open Assets:A USD
1991-01-03 custom "balexpr" "100+200" 300.00 USD
"#,
    );
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].msg, "No account found in the expression.");
    assert_eq!(ledger.checks()[0].actual(), &None);
}

#[test]
fn tolerance_option_widens_the_comparison() {
    let text = r#"1990-01-01 open Assets:A USD
1990-01-01 open Equity:OpenBalance USD
1991-01-01 * "Opening"
  Assets:A 10.00 USD
  Equity:OpenBalance
1991-01-02 custom "balexpr" "Assets:A/3" 3.33 USD
1991-01-02 custom "balexpr" "Assets:A/3" 3.30 USD
"#;
    let (_, errors) = load(text);
    assert_eq!(errors.len(), 1, "{:?}", errors);

    let (ledger, errors) = load(&format!("option \"balexpr_tolerance\" \"0.05\"\n{}", text));
    assert!(errors.is_empty(), "{:?}", errors);
    assert!(ledger.checks().iter().all(|r| r.passed()));
}

#[test]
fn checks_only_see_earlier_transactions() {
    let (ledger, errors) = load(
        r#"1990-01-01 open Assets:A USD
1990-01-01 open Income:Salary USD
1991-01-01 * "Salary"
  Assets:A 100 USD
  Income:Salary
1991-01-02 custom "balexpr" "Assets:A+Income:Salary" 0 USD
1991-01-02 * "Salary"
  Assets:A 100 USD
  Income:Salary
1991-01-03 custom "balexpr" "Assets:A" 200 USD
"#,
    );
    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(ledger.checks().len(), 2);

    let sheet = ledger.balance_sheet_before(date(1991, 1, 2));
    let amount = balexpr::expr::evaluate(
        "Assets:A * 2",
        ledger.resolver(&sheet),
        date(1991, 1, 2),
        "USD",
    )
    .unwrap();
    assert_eq!(amount, Amount::new(Decimal::new(200, 0), "USD"));
}

#[test]
fn parent_accounts_include_their_children() {
    let (ledger, errors) = load(
        r#"1990-01-01 open Assets:Bank
1990-01-01 open Assets:Bank:Checking USD
1990-01-01 open Assets:Bank:Savings USD
1990-01-01 open Equity:OpenBalance USD
1991-01-01 * "Opening"
  Assets:Bank:Checking 30 USD
  Assets:Bank:Savings 70 USD
  Equity:OpenBalance
1991-01-02 custom "balexpr" "Assets:Bank / 2" 50 USD
"#,
    );
    assert!(errors.is_empty(), "{:?}", errors);
    assert!(ledger.checks()[0].passed());
}

#[test]
fn padding_counts_from_the_pad_date() {
    let (ledger, errors) = load(
        r#"1990-01-01 open Assets:A USD
1990-01-01 open Equity:Open USD
1991-01-01 pad Assets:A Equity:Open
1991-01-02 custom "balexpr" "Assets:A" 100 USD
1991-01-03 balance Assets:A 100 USD
"#,
    );
    assert!(errors.is_empty(), "{:?}", errors);
    assert!(ledger.checks()[0].passed());

    let sheet = ledger.balance_sheet_before(date(1991, 1, 2));
    let amount = balexpr::expr::evaluate(
        "Assets:A",
        ledger.resolver(&sheet),
        date(1991, 1, 2),
        "USD",
    );
    assert_eq!(amount.ok(), ledger.checks()[0].actual().clone());
}
