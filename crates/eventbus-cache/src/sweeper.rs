//! Background expiry sweeps.
//!
//! Two periodic tasks remove expired records: one for error-free records on
//! the cleanup interval, one for records carrying handler errors on the
//! (typically longer) errors interval. Both stop when cleanup is disabled
//! between ticks, when the shutdown signal fires, or when the owning cache
//! is dropped.

use crate::memory::CacheState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Which expired records a sweep removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SweepKind {
    /// Expired records without any handler error
    Expired,
    /// Expired records with at least one handler error
    ExpiredWithErrors,
}

impl SweepKind {
    fn as_str(self) -> &'static str {
        match self {
            SweepKind::Expired => "expired",
            SweepKind::ExpiredWithErrors => "expired_with_errors",
        }
    }
}

/// Handles of the running sweep tasks.
pub(crate) struct Sweeper {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawn both sweep tasks. Must be called within a tokio runtime.
    pub(crate) fn spawn(state: Arc<CacheState>) -> Self {
        let (shutdown, _) = watch::channel(false);
        let cleanup_interval = state.options().event_cache_cleanup_interval;
        let errors_interval = state.options().event_errors_cache_cleanup_interval;

        let handles = vec![
            tokio::spawn(sweep_loop(
                state.clone(),
                SweepKind::Expired,
                cleanup_interval,
                shutdown.subscribe(),
            )),
            tokio::spawn(sweep_loop(
                state,
                SweepKind::ExpiredWithErrors,
                errors_interval,
                shutdown.subscribe(),
            )),
        ];

        Self { shutdown, handles }
    }

    /// True while at least one sweep task is alive.
    pub(crate) fn is_running(&self) -> bool {
        self.handles.iter().any(|h| !h.is_finished())
    }

    /// Signal both tasks and wait for them to exit.
    pub(crate) async fn stop(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Event cache sweep task ended abnormally");
            }
        }
    }
}

async fn sweep_loop(
    state: Arc<CacheState>,
    kind: SweepKind,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    info!(
        app = state.app_name(),
        sweep = kind.as_str(),
        period_ms = period.as_millis() as u64,
        "Event cache sweep started"
    );

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if !state.cleanup_enabled() {
                    debug!(sweep = kind.as_str(), "Event cache cleanup disabled");
                    break;
                }
                let removed = state.sweep(kind).await;
                if removed > 0 {
                    debug!(app = state.app_name(), sweep = kind.as_str(), removed, "Removed expired event handling records");
                }
            }
        }
    }

    info!(app = state.app_name(), sweep = kind.as_str(), "Event cache sweep stopped");
}
