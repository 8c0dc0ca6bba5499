use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::Engine;

/// Compact the WAL if at least `threshold` events were appended since the last
/// compaction. Returns whether a compaction ran.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        debug!("compactor: {appends} appends, below threshold {threshold}");
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
            info!("compactor: compacted after {appends} appends");
            true
        }
        Err(e) => {
            warn!("compactor: compaction failed: {e}");
            false
        }
    }
}

/// Background task that periodically compacts the WAL once it has grown.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    // The first tick completes immediately; nothing can be due at startup.
    interval.tick().await;
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}
