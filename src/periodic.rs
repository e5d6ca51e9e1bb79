//! Periodic background jobs.

use crate::error::RelayerError;
use std::{fmt::Debug, future::Future, time::Duration};
use tokio::{sync::watch, task::JoinHandle, time::Interval};
use tracing::{debug, error};

/// Work run on every tick of a [`PeriodicJob`].
pub trait PeriodicTask: Debug + Send + Sync + 'static {
    /// Runs one cycle.
    fn run(&self) -> impl Future<Output = Result<(), RelayerError>> + Send;
}

/// A periodic job that holds a task and its period interval.
///
/// The interval is reset after each cycle, so the period is measured from the end of one cycle
/// to the start of the next and cycles never overlap.
#[derive(Debug)]
pub struct PeriodicJob<T> {
    task: T,
    interval: Interval,
}

impl<T: PeriodicTask> PeriodicJob<T> {
    /// Launches a tokio task running `task` immediately and then every `period`.
    pub fn launch(task: T, period: Duration) -> JobHandle {
        let (shutdown, mut signal) = watch::channel(());
        let handle = tokio::spawn(async move {
            let mut job = Self { task, interval: tokio::time::interval(period) };
            loop {
                tokio::select! {
                    _ = job.interval.tick() => {}
                    _ = signal.changed() => break,
                }
                if let Err(err) = job.task.run().await {
                    error!(%err, task = ?job.task, "Periodic job failed");
                }
                job.interval.reset();
            }
            debug!(task = ?job.task, "Periodic job stopped");
        });

        JobHandle { shutdown, task: handle }
    }
}

/// Handle to a launched [`PeriodicJob`]. Dropping it stops the job after its current cycle.
#[derive(Debug)]
pub struct JobHandle {
    shutdown: watch::Sender<()>,
    task: JoinHandle<()>,
}

impl JobHandle {
    /// Stops the job after its current cycle and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let _ = self.task.await;
    }
}
