//! Reset command - one monthly reset pass

use chrono::Utc;
use tracing::info;

pub async fn run() -> anyhow::Result<()> {
    let config = super::load_config();
    let engine = super::build_engine(config).await?;

    let reset = engine.scheduler().monthly_reset(Utc::now()).await?;
    info!(reset, "Monthly reset complete");

    Ok(())
}
