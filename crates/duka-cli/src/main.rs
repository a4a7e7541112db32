//! Duka CLI - record sales and stock offline, push them when the network is back.

mod cli;
mod commands;
mod config_file;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::common::resolve_db_path;
use crate::commands::config::run_config;
use crate::commands::records::{
    run_customer, run_product, run_record, run_sale, run_supplier,
};
use crate::commands::sync::run_sync;
use crate::config_file::CliConfig;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("duka=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = CliConfig::load().map_err(CliError::Config)?;
    let db_path = resolve_db_path(cli.db_path.clone(), &config)?;

    match cli.command {
        Commands::Product { command } => run_product(command, &db_path).await,
        Commands::Sale { command } => run_sale(command, &db_path).await,
        Commands::Customer { command } => run_customer(command, &db_path).await,
        Commands::Supplier { command } => run_supplier(command, &db_path).await,
        Commands::Record { command } => run_record(command, &db_path).await,
        Commands::Sync { command } => run_sync(command, &config, &db_path).await,
        Commands::Config { command } => run_config(command, config, cli.db_path.as_deref(), &db_path),
    }
}
