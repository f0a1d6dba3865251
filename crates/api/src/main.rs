//! NutriScan Scoring Server - Main Entry Point

use api::{init_logging, run_server, ServiceConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = ServiceConfig::load()?;
    init_logging(&settings.logging)?;

    info!("=== NutriScan Scoring Server v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Model directory: {}, device policy: {:?}",
        settings.model.model_dir.display(),
        settings.model.device
    );

    run_server(settings).await?;

    Ok(())
}
