use std::sync::Arc;

use tracing::info;

use fleetbook::compactor;
use fleetbook::config::Config;
use fleetbook::console;
use fleetbook::engine::Engine;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env();
    fleetbook::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let wal_path = config.wal_path();
    let engine = Arc::new(Engine::new(wal_path.clone())?);
    info!("fleetbook started");
    info!("  wal: {}", wal_path.display());
    info!(
        "  compaction: every {}s past {} appends",
        config.compact_interval.as_secs(),
        config.compact_threshold
    );
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let compactor_engine = engine.clone();
    let threshold = config.compact_threshold;
    let every = config.compact_interval;
    let compactor = tokio::spawn(async move {
        compactor::run_compactor(compactor_engine, threshold, every).await;
    });

    tokio::select! {
        result = console::run(&engine, tokio::io::stdin(), tokio::io::stdout()) => {
            result?;
            info!("console closed");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received");
        }
    }

    compactor.abort();
    info!("fleetbook stopped");
    Ok(())
}
