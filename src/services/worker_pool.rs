//! Fixed-size pool of tokio workers draining a bounded job queue.

use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct QueuedJob {
    deadline: Instant,
    run: Job,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SubmitError<E> {
    /// The deadline passed while queued or while the task was running.
    DeadlineExceeded,
    /// The pool is shutting down.
    Closed,
    /// The task ran and returned an error.
    Task(E),
}

impl<E: fmt::Display> fmt::Display for SubmitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::DeadlineExceeded => f.write_str("deadline exceeded before the task completed"),
            SubmitError::Closed => f.write_str("worker pool is closed"),
            SubmitError::Task(e) => write!(f, "{e}"),
        }
    }
}

impl<E> std::error::Error for SubmitError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SubmitError::Task(e) => Some(e),
            _ => None,
        }
    }
}

pub struct WorkerPool {
    sender: mpsc::Sender<QueuedJob>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `num_workers` workers on the current runtime.
    pub fn new(num_workers: usize, queue_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<QueuedJob>(queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..num_workers.max(1))
            .map(|id| tokio::spawn(worker_loop(id, receiver.clone())))
            .collect();

        tracing::info!(num_workers = num_workers.max(1), queue_capacity = queue_capacity.max(1), "Worker pool started");
        Self { sender, workers }
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Free queue slots right now.
    pub fn available_slots(&self) -> usize {
        self.sender.capacity()
    }

    /// Queues `task` and waits for its result.
    ///
    /// Blocks while the queue is full; both the wait for a slot and the wait
    /// for the result are bounded by `deadline`. A task that completes after
    /// the caller gave up keeps running to completion and its result is dropped.
    pub async fn submit<T, E, F, Fut>(&self, deadline: Instant, task: F) -> Result<T, SubmitError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let run: Job = Box::new(move || {
            async move {
                let outcome = task().await;
                if result_tx.send(outcome).is_err() {
                    tracing::warn!("Caller stopped waiting; discarded result");
                }
            }
            .boxed()
        });

        match tokio::time::timeout_at(deadline, self.sender.send(QueuedJob { deadline, run })).await {
            Err(_) => return Err(SubmitError::DeadlineExceeded),
            Ok(Err(_)) => return Err(SubmitError::Closed),
            Ok(Ok(())) => {}
        }

        match tokio::time::timeout_at(deadline, result_rx).await {
            Err(_) => Err(SubmitError::DeadlineExceeded),
            // job dropped unrun: skipped for an expired deadline, or the pool shut down
            Ok(Err(_)) if Instant::now() >= deadline => Err(SubmitError::DeadlineExceeded),
            Ok(Err(_)) => Err(SubmitError::Closed),
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(SubmitError::Task(e)),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

async fn worker_loop(id: usize, receiver: Arc<Mutex<mpsc::Receiver<QueuedJob>>>) {
    loop {
        let next = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };

        let Some(job) = next else {
            tracing::debug!(worker = id, "Job queue closed, worker exiting");
            break;
        };

        if Instant::now() >= job.deadline {
            tracing::debug!(worker = id, "Skipping job whose deadline already passed");
            continue;
        }

        (job.run)().await;
    }
}
