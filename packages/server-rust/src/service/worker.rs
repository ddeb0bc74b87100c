//! Background worker for periodic and on-demand tasks.
//!
//! The heartbeat client and the registry health monitor both run on a
//! `BackgroundWorker<R>`: a tokio task that drains an mpsc channel of
//! `R::Task` values and calls `R::on_tick` at a fixed period.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 64;

/// Task handler executed by [`BackgroundWorker`].
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    /// The type of task this runnable processes.
    type Task: Send + 'static;

    /// Short label used in log lines.
    fn name(&self) -> &'static str;

    /// Process a single submitted task.
    async fn run(&mut self, task: Self::Task);

    /// Called once per tick period. Default is a no-op.
    async fn on_tick(&mut self) {}

    /// Called once when the worker is stopping. Default is a no-op.
    async fn shutdown(&mut self) {}
}

/// Handle to a spawned worker task.
///
/// The first tick fires one full period after `start`, never immediately.
/// A tick that overruns delays the next one instead of bursting.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: Option<mpsc::Sender<R::Task>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Spawns the worker on the current runtime.
    pub fn start(mut runnable: R, period: Duration) -> Self {
        let (tx, mut rx) = mpsc::channel::<R::Task>(CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(worker = runnable.name(), period_ms = period.as_millis(), "worker started");

            loop {
                tokio::select! {
                    task = rx.recv() => match task {
                        Some(task) => runnable.run(task).await,
                        None => break,
                    },
                    _ = ticker.tick() => runnable.on_tick().await,
                    _ = &mut shutdown_rx => break,
                }
            }

            runnable.shutdown().await;
            debug!(worker = runnable.name(), "worker stopped");
        });

        Self {
            tx: Some(tx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Submits a task, waiting for channel capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker has been stopped.
    pub async fn submit(&self, task: R::Task) -> anyhow::Result<()> {
        match &self.tx {
            Some(tx) => tx
                .send(task)
                .await
                .map_err(|_| anyhow::anyhow!("worker channel closed")),
            None => Err(anyhow::anyhow!("worker not running")),
        }
    }

    /// Submits a task without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker has been stopped or its queue is full.
    pub fn try_submit(&self, task: R::Task) -> anyhow::Result<()> {
        match &self.tx {
            Some(tx) => tx
                .try_send(task)
                .map_err(|e| anyhow::anyhow!("worker rejected task: {e}")),
            None => Err(anyhow::anyhow!("worker not running")),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the worker and waits for `shutdown` to complete.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Default, Clone)]
    struct Counters {
        runs: Arc<AtomicU32>,
        ticks: Arc<AtomicU32>,
        shutdowns: Arc<AtomicU32>,
    }

    struct Counting(Counters);

    #[async_trait]
    impl BackgroundRunnable for Counting {
        type Task = u32;

        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&mut self, _task: u32) {
            self.0.runs.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_tick(&mut self) {
            self.0.ticks.fetch_add(1, Ordering::SeqCst);
        }

        async fn shutdown(&mut self) {
            self.0.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn runs_submitted_tasks_then_shuts_down() {
        let counters = Counters::default();
        let mut worker = BackgroundWorker::start(Counting(counters.clone()), Duration::from_secs(60));
        assert!(worker.is_running());

        worker.submit(1).await.unwrap();
        worker.try_submit(2).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counters.runs.load(Ordering::SeqCst), 2);

        worker.stop().await;
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
        assert!(!worker.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_after_each_period_not_at_start() {
        let counters = Counters::default();
        let mut worker = BackgroundWorker::start(Counting(counters.clone()), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(counters.ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(counters.ticks.load(Ordering::SeqCst), 2);

        worker.stop().await;
    }

    #[tokio::test]
    async fn submit_after_stop_is_an_error() {
        let mut worker = BackgroundWorker::start(Counting(Counters::default()), Duration::from_secs(60));
        worker.stop().await;
        assert!(worker.submit(1).await.is_err());
        assert!(worker.try_submit(2).is_err());
    }
}
