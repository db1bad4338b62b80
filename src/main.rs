use anyhow::{Context, Result};

use dotharvest::{cli::config_path_from_args, config::Config, logging, pipeline::Pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config_path_from_args()?;
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let logging_guard = logging::init_tracing(&config.logging)?;
    tracing::info!(
        target: "main",
        run_id = logging_guard.run_id(),
        config = %config_path.display(),
        "dotharvest_starting"
    );

    let pipeline = Pipeline::new(&config)
        .await
        .context("pipeline startup failed; interpreter and checker must be available")?;
    let summary = pipeline
        .run()
        .await
        .context("pipeline aborted on infrastructure failure")?;

    println!("{}", summary.render());
    Ok(())
}
