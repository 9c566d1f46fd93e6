//! Run command - scheduler daemon

use tracing::info;

pub async fn run() -> anyhow::Result<()> {
    let config = super::load_config();
    let engine = super::build_engine(config).await?;

    let scheduler = tokio::spawn(engine.scheduler().run());

    info!("Metering scheduler running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    scheduler.abort();

    Ok(())
}
