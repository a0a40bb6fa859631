use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Shortest period the timer accepts; shorter ones are raised to this.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Timer that re-runs a refresh function while enabled.
///
/// Knows nothing about what is being refreshed. The first call happens one
/// full interval after spawning. Disabling skips ticks without stopping the
/// timer; re-enabling starts a fresh interval. Cancelling, or dropping the
/// handle, stops the timer and abandons a refresh that is still running.
pub struct PeriodicRefresh {
    interval: Duration,
    enabled: watch::Sender<bool>,
    cancel: CancellationToken,
}

impl PeriodicRefresh {
    pub fn spawn<F, Fut>(interval: Duration, enabled: bool, mut refresh: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if interval < MIN_REFRESH_INTERVAL {
            warn!(
                "Refresh interval {:?} is too short, using {:?}",
                interval, MIN_REFRESH_INTERVAL
            );
        }
        let interval = interval.max(MIN_REFRESH_INTERVAL);
        let (enabled_tx, mut enabled_rx) = watch::channel(enabled);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    changed = enabled_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if *enabled_rx.borrow_and_update() {
                            ticker.reset();
                        }
                        continue;
                    }
                    _ = ticker.tick() => {}
                }

                if !*enabled_rx.borrow() {
                    continue;
                }

                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    result = refresh() => {
                        if let Err(e) = result {
                            warn!("Periodic refresh failed: {:#}", e);
                        }
                    }
                }
            }

            debug!("Periodic refresh stopped");
        });

        Self {
            interval,
            enabled: enabled_tx,
            cancel,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.send_if_modified(|current| {
            let modified = *current != enabled;
            *current = enabled;
            modified
        });
    }

    pub fn is_enabled(&self) -> bool {
        *self.enabled.borrow()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for PeriodicRefresh {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
