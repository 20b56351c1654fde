use balexpr::expr::{Evaluator, ExprError};
use balexpr::{Amount, Date, Decimal, Ledger};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn resolve(account: &str, _: Date, currency: &str) -> Result<Amount, ExprError> {
    Ok(Amount::new(Decimal::new(account.len() as i64 * 100, 2), currency))
}

fn criterion_benchmark(c: &mut Criterion) {
    let date = Date::from_ymd_opt(2021, 1, 1).unwrap();
    let evaluator = Evaluator::new(resolve, date, "USD");
    let expr = "(Assets:Bank:Checking + Assets:Bank:Savings) * 2 \
                - Liabilities:Card:Visa / 3 + (Assets:Cash - 12.50) * (1 + 0.05)";
    c.bench_function("Evaluate expression", |b| {
        b.iter(|| evaluator.evaluate(black_box(expr)))
    });

    if let Ok(input) = std::env::var("BALEXPR_BENCH_INPUT") {
        c.bench_function("Check ledger", |b| b.iter(|| Ledger::from_file(&input)));
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
