//! Periodic retention sweep for staged artifacts.
//!
//! Artifacts are session-scoped and clients are expected to delete them, but
//! unreclaimed uploads would otherwise accumulate on disk forever. The sweep
//! bounds that growth; it is an operational backstop, not part of the
//! artifact lifecycle contract.

use std::sync::Arc;
use std::time::Duration;

use crate::state::AppState;

pub async fn run_retention_loop(state: Arc<AppState>) {
    let ttl_s = state.config.artifact_ttl_s;
    if ttl_s == 0 {
        tracing::info!("Artifact retention sweep disabled");
        return;
    }

    let period = Duration::from_secs(state.config.retention_sweep_interval_s.max(30));
    tracing::info!(
        "Artifact retention sweep running every {}s (TTL {}s)",
        period.as_secs(),
        ttl_s
    );

    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let removed = state.registry.sweep_expired(ttl_s);
        if removed > 0 {
            tracing::info!("Retention sweep removed {} expired artifacts", removed);
        }
    }
}
