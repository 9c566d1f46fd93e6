//! CLI for the metering engine
//!
//! Subcommands:
//! - `run`: scheduler daemon (monthly resets + daily expiry sweeps)
//! - `reset`: one monthly reset pass, then exit
//! - `sweep`: one expiry sweep pass, then exit
//! - `stats`: print current-period usage for all institutions

pub mod reset;
pub mod run;
pub mod stats;
pub mod sweep;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::infrastructure::logging;
use crate::{MeteringEngine, MeteringStores};

/// Edu Metering - usage metering and quota enforcement
#[derive(Parser)]
#[command(name = "edu-metering")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the background scheduler daemon
    Run,

    /// Apply the monthly quota reset once
    Reset,

    /// Apply the license expiry sweep once
    Sweep,

    /// Print current-period usage for all institutions
    Stats,
}

pub(crate) fn load_config() -> AppConfig {
    let config = AppConfig::load().unwrap_or_default();
    logging::init_logging(&config.logging);

    config
}

pub(crate) async fn build_engine(config: AppConfig) -> anyhow::Result<MeteringEngine> {
    let database_url = config
        .database
        .url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok());

    let stores = match database_url {
        Some(url) => {
            let max_connections = config.database.max_connections.unwrap_or(5);

            MeteringStores::postgres(&url, max_connections).await?
        }
        None => {
            tracing::info!("No database configured, using in-memory stores");

            MeteringStores::in_memory()
        }
    };

    Ok(MeteringEngine::new(stores, config))
}
