//! Worker pools
//!
//! A [`WorkerPool`] is an unbounded FIFO queue drained by a fixed number of tokio
//! worker tasks. Each worker takes one job at a time and hands it to the pool's
//! [`JobHandler`], so the worker count caps how many jobs are in flight while the
//! queue absorbs any burst. Producers never wait on workers.
//!
//! A handler that returns an error or panics does not take its worker down: the
//! failure is logged with the job payload, counted as `failed`, and the worker moves
//! on to the next job.

use std::any::Any;
use std::fmt::Debug;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::{Result, TrafficError};
use crate::stats::StatsSource;

/// Processes jobs pulled from a [`WorkerPool`]
#[async_trait]
pub trait JobHandler<J>: Send + Sync {
    async fn handle(&self, job: J) -> Result<()>;
}

#[derive(Debug, Default)]
struct PoolCounters {
    /// Queued plus in-flight jobs
    pending: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
}

/// Enqueue-only handle to a [`WorkerPool`]
///
/// Cheap to clone; holding one does not keep the pool's workers alive.
pub struct JobSender<J> {
    pool: Arc<str>,
    tx: mpsc::UnboundedSender<J>,
    counters: Arc<PoolCounters>,
    cancel: CancellationToken,
}

impl<J> Clone for JobSender<J> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            tx: self.tx.clone(),
            counters: self.counters.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<J> JobSender<J> {
    /// Enqueue a job. Returns immediately whether or not a worker is free.
    pub fn put(&self, job: J) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(self.closed());
        }
        self.counters.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(job).is_err() {
            self.counters.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(self.closed());
        }
        Ok(())
    }

    pub fn pool_name(&self) -> &str {
        &self.pool
    }

    fn closed(&self) -> TrafficError {
        TrafficError::QueueClosed {
            pool: self.pool.to_string(),
        }
    }
}

/// Fixed-size set of workers draining one job queue
pub struct WorkerPool<J> {
    name: String,
    worker_count: usize,
    sender: JobSender<J>,
    cancel: CancellationToken,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl<J> WorkerPool<J>
where
    J: Debug + Send + 'static,
{
    /// Start `worker_count` workers on the current tokio runtime
    pub fn new(
        name: impl Into<String>,
        worker_count: usize,
        handler: Arc<dyn JobHandler<J>>,
    ) -> Result<Self> {
        let name = name.into();
        if worker_count == 0 {
            return Err(TrafficError::config(format!(
                "Queue '{}' needs at least one worker",
                name
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(PoolCounters::default());
        let cancel = CancellationToken::new();

        let workers = (0..worker_count)
            .map(|id| {
                tokio::spawn(worker_loop(
                    name.clone(),
                    id,
                    rx.clone(),
                    handler.clone(),
                    counters.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        debug!("Created '{}' queue with {} workers", name, worker_count);

        Ok(Self {
            sender: JobSender {
                pool: Arc::from(name.as_str()),
                tx,
                counters,
                cancel: cancel.clone(),
            },
            name,
            worker_count,
            cancel,
            workers: parking_lot::Mutex::new(workers),
        })
    }

    /// Enqueue a job without waiting for a worker
    pub fn put(&self, job: J) -> Result<()> {
        self.sender.put(job)
    }

    /// Handle for components that only need to enqueue
    pub fn sender(&self) -> JobSender<J> {
        self.sender.clone()
    }

    /// Stop the workers once their current job is done and wait for them.
    ///
    /// Jobs still queued are dropped and remain counted as pending.
    pub async fn shutdown(&self) {
        self.close();
        let workers: Vec<_> = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            let _ = worker.await;
        }
        debug!("Queue '{}' stopped", self.name);
    }
}

impl<J> WorkerPool<J> {
    /// Reject new jobs and tell idle workers to exit without waiting for them
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Jobs queued or being handled
    pub fn pending(&self) -> u64 {
        self.sender.counters.pending.load(Ordering::SeqCst)
    }

    /// Jobs whose handler completed successfully
    pub fn processed(&self) -> u64 {
        self.sender.counters.processed.load(Ordering::SeqCst)
    }

    /// Jobs whose handler returned an error or panicked
    pub fn failed(&self) -> u64 {
        self.sender.counters.failed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> String {
        let mut message = format!(
            "{}-queue: {} pending, {} processed",
            self.name,
            self.pending(),
            self.processed()
        );
        let failed = self.failed();
        if failed > 0 {
            message.push_str(&format!(", {} failed", failed));
        }
        message
    }
}

impl<J: Send> StatsSource for WorkerPool<J> {
    fn stats(&self) -> String {
        WorkerPool::stats(self)
    }
}

async fn worker_loop<J: Debug + Send + 'static>(
    pool: String,
    id: usize,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<J>>>,
    handler: Arc<dyn JobHandler<J>>,
    counters: Arc<PoolCounters>,
    cancel: CancellationToken,
) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            }
        };

        let payload = format!("{:?}", job);
        debug!("Getting payload {} from '{}' queue", payload, pool);

        match AssertUnwindSafe(handler.handle(job)).catch_unwind().await {
            Ok(Ok(())) => {
                counters.processed.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                error!(
                    "Worker {} of '{}' queue failed on payload {}: {}",
                    id, pool, payload, e
                );
            }
            Err(panic) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                error!(
                    "Worker {} of '{}' queue panicked on payload {}: {}",
                    id,
                    pool,
                    payload,
                    panic_message(&panic)
                );
            }
        }
        counters.pending.fetch_sub(1, Ordering::SeqCst);
    }

    debug!("Worker {} of '{}' queue exiting", id, pool);
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
