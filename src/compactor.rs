//! Periodic WAL compaction. The log grows with every mutation; once enough
//! appends accumulate, the current state is rewritten as a fresh minimal log.

use std::sync::Arc;
use std::time::Duration;

use crate::engine::Engine;

const CHECK_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut ticker = tokio::time::interval(CHECK_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        tracing::info!(appends, threshold, "compacting WAL");
        match engine.compact_wal().await {
            Ok(()) => tracing::info!("WAL compaction complete"),
            Err(e) => tracing::warn!(error = %e, "WAL compaction failed"),
        }
    }
}
