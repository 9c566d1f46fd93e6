//! Stats command - dump current-period usage per institution

pub async fn run() -> anyhow::Result<()> {
    let config = super::load_config();
    let engine = super::build_engine(config).await?;

    let stats = engine.all_institutions_usage().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
