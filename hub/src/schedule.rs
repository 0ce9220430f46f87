//! Cancellable periodic background tasks
//!
//! Health checks and discovery refreshes each run on their own interval in a
//! spawned task. The returned [`ScheduleHandle`] stops the loop; a tick that is
//! already running completes before the loop exits.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Handle to a running periodic task
#[derive(Debug)]
pub struct ScheduleHandle {
    name: String,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ScheduleHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the loop to stop and wait for it to exit
    pub async fn shutdown(self) {
        // receiver gone means the loop already exited
        let _ = self.shutdown.send(true);

        if let Err(e) = self.task.await {
            warn!("Schedule {} ended abnormally: {}", self.name, e);
        }
        debug!("Schedule {} stopped", self.name);
    }
}

/// Spawn `tick` every `period` until the handle is shut down
///
/// With `immediate` the first tick runs right away, otherwise after one period.
pub fn spawn_periodic<F, Fut>(
    name: impl Into<String>,
    period: Duration,
    immediate: bool,
    mut tick: F,
) -> ScheduleHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let name = name.into();
    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let task_name = name.clone();

    let task = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if !immediate {
            // first tick of a tokio interval completes immediately
            ticker.tick().await;
        }

        loop {
            tokio::select! {
                biased;
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    tick().await;
                }
            }
        }

        debug!("Schedule {} loop exited", task_name);
    });

    debug!("Schedule {} started (every {:?})", name, period);

    ScheduleHandle {
        name,
        shutdown,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_periodic_ticks_until_shutdown() {
        let counter = Arc::new(AtomicUsize::new(0));
        let ticks = counter.clone();

        let handle = spawn_periodic("test", Duration::from_millis(10), true, move || {
            let ticks = ticks.clone();
            async move {
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(55)).await;
        assert!(handle.is_running());
        handle.shutdown().await;

        let after_shutdown = counter.load(Ordering::SeqCst);
        assert!(after_shutdown >= 2);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), after_shutdown);
    }

    #[tokio::test]
    async fn test_delayed_start_skips_first_tick() {
        let counter = Arc::new(AtomicUsize::new(0));
        let ticks = counter.clone();

        let handle = spawn_periodic("delayed", Duration::from_secs(60), false, move || {
            let ticks = ticks.clone();
            async move {
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
