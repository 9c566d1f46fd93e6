use clap::Parser;
use edu_metering::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Run => cli::run::run().await,
        Command::Reset => cli::reset::run().await,
        Command::Sweep => cli::sweep::run().await,
        Command::Stats => cli::stats::run().await,
    }
}
