//! Dispatch of execution units onto threads.
//!
//! The experimenter hands each base configuration's surviving work to a
//! scheduler as one [`ExecutionUnit`]. The direct scheduler runs it on the
//! calling thread; the pooled scheduler fans units out over a bounded
//! crossbeam channel to named worker threads. Units from different base
//! configurations never share state, so no ordering between them is
//! guaranteed or needed.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::error::TaskError;
use crate::task::experimenter::ExecutionUnit;

/// Accepts execution units for eventual execution.
pub trait Scheduler {
    /// Submits one unit. Whether execution is synchronous is up to the
    /// implementation; the unit reports its outcome through the registry
    /// either way.
    ///
    /// # Errors
    /// [`TaskError::QueueFull`] or [`TaskError::SchedulerStopped`] if the
    /// unit could not be accepted.
    fn submit(&self, unit: ExecutionUnit) -> Result<(), TaskError>;
}

/// Runs every unit on the calling thread. Deterministic ordering, useful
/// for tests and small embedded runs.
#[derive(Debug, Default)]
pub struct DirectScheduler;

impl DirectScheduler {
    /// Creates a direct scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for DirectScheduler {
    fn submit(&self, unit: ExecutionUnit) -> Result<(), TaskError> {
        unit.run();
        Ok(())
    }
}

/// Configuration for [`WorkerPoolScheduler`].
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Maximum queued units.
    pub queue_capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 64,
        }
    }
}

/// A fixed pool of named worker threads fed by a bounded channel.
///
/// Dropping the scheduler drains the queue: the channel closes and the
/// workers are joined, so every accepted unit runs before the pool is
/// gone. `shutdown` does the same thing at an explicit point.
pub struct WorkerPoolScheduler {
    tx: Option<Sender<ExecutionUnit>>,
    workers: Vec<JoinHandle<()>>,
    queue_capacity: usize,
}

impl WorkerPoolScheduler {
    /// Starts the pool. Worker and capacity counts are clamped to one.
    ///
    /// # Errors
    /// [`TaskError::SchedulerStopped`] if a worker thread cannot be spawned.
    pub fn start(config: WorkerPoolConfig) -> Result<Self, TaskError> {
        let workers = config.workers.max(1);
        let queue_capacity = config.queue_capacity.max(1);
        let (tx, rx) = bounded::<ExecutionUnit>(queue_capacity);

        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let rx: Receiver<ExecutionUnit> = rx.clone();
            let thread_name = format!("entbench-worker-{idx}");
            let handle = thread::Builder::new()
                .name(thread_name)
                .spawn(move || {
                    while let Ok(unit) = rx.recv() {
                        unit.run();
                    }
                })
                .map_err(|_| TaskError::SchedulerStopped)?;
            handles.push(handle);
        }

        Ok(Self {
            tx: Some(tx),
            workers: handles,
            queue_capacity,
        })
    }

    /// Closes the queue and waits for workers to drain it.
    pub fn shutdown(mut self) {
        self.join_workers();
    }

    fn join_workers(&mut self) {
        // Closing the channel lets workers finish queued units then exit.
        drop(self.tx.take());
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPoolScheduler {
    fn drop(&mut self) {
        self.join_workers();
    }
}

impl Scheduler for WorkerPoolScheduler {
    fn submit(&self, unit: ExecutionUnit) -> Result<(), TaskError> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(TaskError::SchedulerStopped);
        };
        match tx.try_send(unit) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(TaskError::QueueFull {
                capacity: self.queue_capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(TaskError::SchedulerStopped),
        }
    }
}
