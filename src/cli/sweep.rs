//! Sweep command - one expiry sweep pass

use chrono::Utc;
use tracing::info;

pub async fn run() -> anyhow::Result<()> {
    let config = super::load_config();
    let engine = super::build_engine(config).await?;

    let report = engine.scheduler().expiry_sweep(Utc::now()).await?;
    info!(
        expiring_soon = report.expiring_soon,
        entered_grace = report.entered_grace,
        expired = report.expired,
        "Expiry sweep complete"
    );

    Ok(())
}
