use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stellar_arb_ledger::config::{Config, MonitoringConfig};
use stellar_arb_ledger::LedgerService;

/// Inspect the arbitrage trade ledger
#[derive(Parser, Debug)]
#[command(name = "arb-ledger")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the Markdown fleet report
    Report {
        /// Number of assets listed in the report
        #[arg(long, default_value_t = 10)]
        top: usize,
    },

    /// List the assets with the highest total profit
    TopAssets {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// List trades created in the last N hours, newest first
    Recent {
        #[arg(long, default_value_t = 24, value_parser = clap::value_parser!(i64).range(0..))]
        hours: i64,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// List trades whose predicted profit percent lies in [min, max]
    Range {
        #[arg(long)]
        min: Decimal,
        #[arg(long)]
        max: Decimal,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load().context("Failed to load configuration")?;
    init_tracing(&config.monitoring)?;
    info!(
        "Loading journals: trades={} accounts={}",
        config.storage.trade_journal_path.display(),
        config.storage.account_journal_path.display()
    );

    let service = LedgerService::open(&config)
        .await
        .context("Failed to open ledger")?;
    let reporter = service.reporter();
    let now = Utc::now();

    match cli.command {
        Commands::Report { top } => {
            println!("{}", reporter.generate_report(top, now));
        }
        Commands::TopAssets { limit } => {
            let assets = reporter.top_assets(limit);
            println!("{}", serde_json::to_string_pretty(&assets)?);
        }
        Commands::Recent { hours, limit } => {
            let trades = reporter.recent_trades(hours, limit, now);
            println!("{}", serde_json::to_string_pretty(&trades)?);
        }
        Commands::Range { min, max } => {
            if min > max {
                anyhow::bail!("--min ({}) must not exceed --max ({})", min, max);
            }
            let trades = reporter.trades_in_profit_range(min, max);
            println!("{}", serde_json::to_string_pretty(&trades)?);
        }
    }

    Ok(())
}

/// RUST_LOG wins over LOG_LEVEL; output goes to stderr so stdout stays parseable
fn init_tracing(monitoring: &MonitoringConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&monitoring.log_level))
        .context("Failed to create EnvFilter")?;

    let registry = tracing_subscriber::registry().with(env_filter);
    if monitoring.log_format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
    Ok(())
}
