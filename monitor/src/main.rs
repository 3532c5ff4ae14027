use anyhow::{Context, Result};
use clap::Parser;
use ctxwatch_monitor::{Cli, Monitor, logging};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let mut builder = Monitor::builder(&cli.root);
    if let Some(config) = &cli.config {
        builder = builder.with_config_path(config);
    }
    let monitor = builder
        .build()
        .await
        .with_context(|| format!("failed to start monitor in {}", cli.root.display()))?;

    if let Some(path) = &cli.once {
        let report = monitor.run_once(path).await;
        info!(
            "Published {} target(s) for {}",
            report.publish.published.len(),
            report.trigger.path
        );
        for failure in &report.publish.failures {
            warn!("{}: {}", failure.target, failure.message);
        }
        return Ok(());
    }

    monitor.run().await?;
    Ok(())
}
