//! Periodic deletion of event rows past their retention age.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use telemetry_storage::Store;

/// Sweep cadence and row lifetime.
#[derive(Clone, Copy, Debug)]
pub struct RetentionSettings {
    /// How often the sweep runs.
    pub interval: Duration,
    /// Rows older than this are deleted. Nodes are kept forever.
    pub max_age: Duration,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            max_age: Duration::from_secs(14 * 24 * 60 * 60),
        }
    }
}

/// Run the sweep until shutdown.
///
/// Each pass takes the shared write lock, so a bulk delete never overlaps
/// an in-flight envelope commit.
pub async fn run_retention(
    store: Arc<dyn Store>,
    write_lock: Arc<Mutex<()>>,
    settings: RetentionSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(settings.interval);
    // The first tick fires immediately; skip it so startup ingestion is not
    // stalled behind a sweep.
    ticker.tick().await;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("retention sweep shutting down");
                    return;
                }
            }
            _ = ticker.tick() => {
                let cutoff = Utc::now()
                    - chrono::Duration::from_std(settings.max_age)
                        .unwrap_or_else(|_| chrono::Duration::days(14));
                let _guard = write_lock.lock().await;
                match store.purge_older_than(cutoff).await {
                    Ok(stats) => info!(
                        packets = stats.packets,
                        seen = stats.seen,
                        traceroutes = stats.traceroutes,
                        "retention sweep complete"
                    ),
                    Err(err) => warn!(error = %err, "retention sweep failed"),
                }
            }
        }
    }
}
