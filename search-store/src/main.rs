//! Search Store Main Entry Point
//!
//! Reads the collection settings from the environment, connects to OpenSearch
//! and runs one command against the collection.

use clap::Parser;
use dotenv::dotenv;
use search_store::{run, run_to_completion, AppError, Command, Dependencies, Settings};
use std::env;
use std::io;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Manage and query a search store collection.
#[derive(Parser)]
#[command(name = "search-store")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Initialize tracing/logging.
///
/// Logs go to stderr so command output on stdout stays machine readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("search_store=info,search_store_repository=info")
    });

    let json = env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_writer(io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .pretty()
                    .with_writer(io::stderr),
            )
            .init();
    }

    info!(
        service_name = "search-store",
        service_version = env!("CARGO_PKG_VERSION"),
        json,
        "Tracing initialized"
    );
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenv().ok();
    let cli = Cli::parse();

    init_tracing();

    let settings = Settings::from_env().inspect_err(|e| {
        error!(error = %e, "Invalid configuration");
    })?;

    let deps = Dependencies::new(&settings).await.inspect_err(|e| {
        error!(error = %e, "Failed to initialize dependencies");
    })?;

    let mut stdout = io::stdout().lock();
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for interrupts");
            std::future::pending::<()>().await;
        }
    };
    let result = run_to_completion(run(&deps.model, &cli.command, &mut stdout), interrupt).await;
    if let Err(e) = &result {
        error!(error = %e, command = ?cli.command, "Command failed");
    }
    result
}
