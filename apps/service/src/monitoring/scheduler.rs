use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::executor::CheckExecutor;
use crate::database::{CheckRepository, Store};

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodically runs every enabled check through the executor with at
/// most `max_workers` executions in flight.
pub struct MonitoringScheduler {
    store: Arc<dyn Store>,
    executor: Arc<dyn CheckExecutor>,
    interval: Duration,
    max_workers: usize,
    running: Arc<AtomicBool>,
    task: Mutex<Option<Running>>,
}

impl MonitoringScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        executor: Arc<dyn CheckExecutor>,
        interval: Duration,
        max_workers: usize,
    ) -> Self {
        Self {
            store,
            executor,
            interval,
            max_workers: max_workers.max(1),
            running: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Start the tick loop; the first tick fires immediately. Starting an
    /// already running scheduler does nothing.
    pub fn start(&self, parent: &CancellationToken) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return;
        }

        let cancel = parent.child_token();
        let tick = Tick {
            store: self.store.clone(),
            executor: self.executor.clone(),
            interval: self.interval,
            max_workers: self.max_workers,
        };
        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);

        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    _ = ticker.tick() => tick.run(&loop_cancel).await,
                }
            }
            running.store(false, Ordering::SeqCst);
            debug!("scheduler loop stopped");
        });

        info!(interval_secs = self.interval.as_secs(), max_workers = self.max_workers, "scheduler started");
        *task = Some(Running { cancel, handle });
    }

    /// Cancel the loop and wait for every dispatched check to finish
    pub async fn stop(&self) {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(Running { cancel, handle }) = task else {
            return;
        };
        cancel.cancel();
        if let Err(e) = handle.await {
            warn!(error = %e, "scheduler loop ended abnormally");
        }
        self.running.store(false, Ordering::SeqCst);
        info!("scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

struct Tick {
    store: Arc<dyn Store>,
    executor: Arc<dyn CheckExecutor>,
    interval: Duration,
    max_workers: usize,
}

impl Tick {
    /// One batch over all enabled checks. Every check is dispatched unless
    /// `cancel` fires. The batch deadline is the scheduling interval; checks
    /// still running or dispatched after it see their token cancelled.
    async fn run(&self, cancel: &CancellationToken) {
        let checks = match self.store.list_enabled_checks().await {
            Ok(checks) => checks,
            Err(e) => {
                warn!(error = %e, "failed to load enabled checks");
                return;
            }
        };
        if checks.is_empty() {
            return;
        }

        let deadline = cancel.child_token();
        let timer = {
            let deadline = deadline.clone();
            let interval = self.interval;
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => deadline.cancel(),
                    _ = deadline.cancelled() => {}
                }
            })
        };

        debug!(count = checks.len(), "dispatching checks");
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut workers = JoinSet::new();

        for check in checks {
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let executor = self.executor.clone();
            let token = deadline.clone();
            workers.spawn(async move {
                let _permit = permit;
                executor.execute(check, token).await;
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "check worker panicked");
            }
        }

        timer.abort();
    }
}
