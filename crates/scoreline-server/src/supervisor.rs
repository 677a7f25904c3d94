//! Ownership of background tasks.
//!
//! Every scheduled loop in the server (leaderboard refresh, cache
//! monitoring, memory-tier sweeps, hot-prediction cleanup) runs under a
//! child of the supervisor's [`CancellationToken`]. Cancelling the root
//! stops them all; each loop can also be stopped on its own.

use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A cancellable loop that runs `tick` every `period`.
///
/// The first tick fires one period after spawning, not immediately.
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    pub fn spawn<F, Fut>(
        name: &'static str,
        parent: &CancellationToken,
        period: Duration,
        mut tick: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = parent.child_token();
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            interval.tick().await;

            debug!(task = name, period_ms = period.as_millis() as u64, "Periodic task started");
            loop {
                tokio::select! {
                    biased;
                    _ = loop_token.cancelled() => break,
                    _ = interval.tick() => tick().await,
                }
            }
            debug!(task = name, "Periodic task stopped");
        });

        Self {
            name,
            token,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    async fn stop_when_cancelled(self) {
        self.token.cancelled().await;
        self.stop().await;
    }

    /// Cancel the loop and wait for the current tick to finish.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                warn!(task = self.name, "Periodic task panicked");
            }
        }
    }
}

/// Root owner of the server's background tasks.
#[derive(Debug, Default)]
pub struct Supervisor {
    token: CancellationToken,
    tasks: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root token; services derive child tokens from it.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Spawn a task that must watch [`Supervisor::token`] itself.
    pub fn spawn<F>(&self, name: impl Into<String>, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        debug!(task = %name, "Spawning supervised task");
        let handle = tokio::spawn(fut);
        self.tasks.lock().push((name, handle));
    }

    /// Spawn a supervised periodic loop.
    pub fn spawn_periodic<F, Fut>(&self, name: &'static str, period: Duration, tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task = PeriodicTask::spawn(name, &self.token, period, tick);
        self.spawn(name, async move {
            // parent cancellation reaches the child token
            task.stop_when_cancelled().await;
        });
    }

    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Cancel every task and wait up to `timeout` for them to finish.
    /// Tasks still running afterwards are aborted. Returns how many were.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        self.token.cancel();
        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        let total = tasks.len();

        let deadline = tokio::time::Instant::now() + timeout;
        let mut aborted = 0;
        for (name, mut handle) in tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(_) => {}
                Err(_) => {
                    warn!(task = %name, "Supervised task did not stop in time, aborting");
                    handle.abort();
                    aborted += 1;
                }
            }
        }
        info!(tasks = total, aborted, "Supervisor shut down");
        aborted
    }
}
