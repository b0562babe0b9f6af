//! PTC Backend CLI
//!
//! Run modes:
//!   ptc-api api [--port <port>]          - Start the REST API (reconciler included)
//!   ptc-api reconcile [--interval <s>]   - Run only the stale-withdrawal reconciler
//!   ptc-api currencies                   - Print the currency registry
//!
//! Configuration comes from the environment (and `.env`), see `PtcConfig`.

use clap::{Parser, Subcommand};
use std::sync::Arc;

use ptc::api;
use ptc::common::{init_from_config, PtcConfig, PtcError};
use ptc::storage::{SqliteStore, Store};
use ptc::withdrawal::Reconciler;

#[derive(Parser)]
#[command(name = "ptc-api")]
#[command(about = "Points-to-crypto withdrawal backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the REST API server
    Api {
        /// Listen port (overrides PTC_API_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Fail withdrawals stuck in processing
    Reconcile {
        /// Seconds between sweeps (overrides PTC_RECONCILE_INTERVAL_SECS)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Print the currency registry
    Currencies,
}

#[tokio::main]
async fn main() -> Result<(), PtcError> {
    let cli = Cli::parse();

    let mut config = PtcConfig::from_env()?;
    init_from_config(&config)?;
    config.print_summary();

    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(&config.database_path)?);

    match cli.command {
        Commands::Api { port } => {
            if let Some(port) = port {
                config.api_port = port;
            }
            api::start_server(&config, store).await?;
        }
        Commands::Reconcile { interval } => {
            if let Some(interval) = interval {
                config.reconcile_interval_secs = interval;
            }
            run_reconciler(&config, store).await;
        }
        Commands::Currencies => {
            print_currencies(store.as_ref()).await?;
        }
    }

    Ok(())
}

/// Sweep until Ctrl+C
async fn run_reconciler(config: &PtcConfig, store: Arc<dyn Store>) {
    let reconciler = Arc::new(Reconciler::new(
        store,
        config.stale_withdrawal_secs,
        config.reconcile_interval_secs,
    ));

    let worker = tokio::spawn({
        let reconciler = reconciler.clone();
        async move { reconciler.run().await }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(target: "ptc::reconciler", error = %e, "signal handler failed");
    }

    reconciler.stop().await;
    worker.abort();
}

async fn print_currencies(store: &dyn Store) -> Result<(), PtcError> {
    println!(
        "{:<6} {:<10} {:>7} {:>14} {:>12} {:>12} {:>6}",
        "SYMBOL", "NAME", "ACTIVE", "POINTS/UNIT", "MIN", "FEE", "CONFS"
    );

    for c in store.list_currencies().await? {
        println!(
            "{:<6} {:<10} {:>7} {:>14} {:>12} {:>12} {:>6}",
            c.symbol,
            c.name,
            if c.is_active { "yes" } else { "no" },
            c.conversion_rate,
            c.min_withdrawal,
            c.network_fee,
            c.required_confirmations()
        );
    }

    Ok(())
}
