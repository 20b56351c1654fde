use balexpr::expr::Evaluator;
use balexpr::{Date, Ledger};
use clap::{Parser, Subcommand};
use std::process::ExitCode;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");

fn check(ledger: &Ledger, num_errors: usize) -> ExitCode {
    let passed = ledger.checks().iter().filter(|r| r.passed()).count();
    println!(
        "{} of {} balexpr checks passed.",
        passed,
        ledger.checks().len()
    );
    if num_errors == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn eval(ledger: &Ledger, expr: &str, currency: &str, date: Option<Date>) -> ExitCode {
    let before;
    let (sheet, as_of) = match date {
        Some(date) => {
            before = ledger.balance_sheet_before(date);
            (&before, date)
        }
        None => (ledger.balance_sheet(), chrono::Local::now().date_naive()),
    };
    let evaluator = Evaluator::new(ledger.resolver(sheet), as_of, currency);
    match evaluator.evaluate(expr) {
        Ok(amount) => {
            println!("{}", amount);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn balances(ledger: &Ledger) -> ExitCode {
    let mut result = vec![];
    for (account, account_map) in ledger.balance_sheet() {
        let closed = ledger
            .accounts()
            .get(account)
            .map_or(true, |info| info.close().is_some());
        if closed {
            continue;
        }
        for (currency, number) in account_map {
            if number.is_zero() {
                continue;
            }
            result.push(format!("{} {} {}", account, number, currency));
        }
    }
    result.sort();
    for entry in result {
        println!("{}", entry);
    }
    ExitCode::SUCCESS
}

#[derive(Debug, Parser)]
#[command(
    name = "balexpr",
    about = "Check ledger balances against expressions combining multiple accounts.",
    version = VERSION,
    author = AUTHOR,
)]
struct Cli {
    #[arg(short, required = true)]
    input: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Runs every `custom "balexpr"` check in the ledger.
    Check,
    /// Evaluates an expression against the balances of the ledger.
    Eval {
        expr: String,
        #[arg(short, long)]
        currency: String,
        /// Only transactions before this date are counted.
        #[arg(short, long)]
        date: Option<Date>,
    },
    /// Lists the non-zero balances of open accounts.
    Balances,
}

fn main() -> ExitCode {
    pretty_env_logger::init();
    let args = Cli::parse();
    let (ledger, errors) = Ledger::from_file(&args.input);
    for error in &errors {
        println!("{}\n", error);
    }
    match args.command {
        Commands::Check => check(&ledger, errors.len()),
        Commands::Eval {
            expr,
            currency,
            date,
        } => eval(&ledger, &expr, &currency, date),
        Commands::Balances => balances(&ledger),
    }
}
