use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use expenseshare::config::Config;
use expenseshare::{compute_shares, Expense, MongoShareRepository, Result, ShareService};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Computes the shares of an expense and stores them in MongoDB.
#[derive(Parser, Debug)]
#[command(name = "expenseshare", version)]
struct Args {
    /// JSON file holding the expense, stdin when omitted
    input: Option<PathBuf>,

    /// Replace the shares already stored for this expense
    #[arg(long)]
    replace: bool,

    /// Only print the computed shares
    #[arg(long, conflicts_with = "replace")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "expenseshare=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "expenseshare failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let expense = read_expense(args.input.as_ref())?;

    if args.dry_run {
        let shares = compute_shares(expense.amount, &expense.participants)?;
        println!("{}", serde_json::to_string_pretty(&shares)?);
        return Ok(());
    }

    let config = Config::from_env();
    info!(database = %config.database, collection = %config.collection, "connecting");
    let service = ShareService::new(MongoShareRepository::connect(&config).await?);
    let shares = if args.replace {
        service.recompute(&expense).await?
    } else {
        service.record(&expense).await?
    };
    println!("{}", serde_json::to_string_pretty(&shares)?);
    Ok(())
}

fn read_expense(path: Option<&PathBuf>) -> Result<Expense> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut raw = String::new();
            std::io::stdin().read_to_string(&mut raw)?;
            raw
        }
    };
    Ok(serde_json::from_str(&raw)?)
}
