//! Periodic statistics reporting
//!
//! Every stats-bearing component gets its own [`StatsReporter`]: a tokio task that
//! samples [`StatsSource::stats`] once per interval and logs the snapshot at info
//! level only when it differs from the previous one. The first sample is always
//! logged. Reporters stop when their cancellation token fires.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default sampling interval
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(1);

/// A component that can describe its counters as a human readable line
pub trait StatsSource: Send + Sync {
    /// Current snapshot, e.g. `"cdr: 5"`
    fn stats(&self) -> String;
}

/// Handle to a running reporter task
#[derive(Debug)]
pub struct StatsReporter {
    name: String,
    emitted: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl StatsReporter {
    /// Spawn a reporter for `source` on the current tokio runtime
    pub fn spawn<S>(
        name: impl Into<String>,
        source: Arc<S>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self
    where
        S: StatsSource + ?Sized + 'static,
    {
        let name = name.into();
        let emitted = Arc::new(AtomicU64::new(0));

        let task_name = name.clone();
        let task_emitted = emitted.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last: Option<String> = None;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Stats reporter '{}' stopped", task_name);
                        break;
                    }
                    _ = ticker.tick() => {
                        let message = source.stats();
                        if last.as_deref() != Some(message.as_str()) {
                            info!("{}", message);
                            task_emitted.fetch_add(1, Ordering::Relaxed);
                            last = Some(message);
                        }
                    }
                }
            }
        });

        Self {
            name,
            emitted,
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of snapshots logged so far
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Wait for the task to exit after its token was cancelled
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}
