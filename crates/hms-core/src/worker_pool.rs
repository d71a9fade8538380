//! Fixed-size worker pool over a single FIFO job queue.
//!
//! # How it works
//!
//! ```text
//!  submit(job) ──▶ [ FIFO queue ] ──▶ worker 0 ─┐
//!                                 ──▶ worker 1 ─┼─ run job under catch_unwind
//!                                 ──▶ worker N ─┘
//! ```
//!
//! Each worker is a tokio task.  Workers take turns holding the queue's
//! receiver, so whichever worker is idle picks up the oldest job.  Jobs from
//! one submitter keep their FIFO order in the queue; jobs from different
//! submitters are interleaved in arrival order and may *complete* in any
//! order once more than one worker is running.
//!
//! A job that panics is caught and logged.  The worker that ran it keeps
//! pulling jobs, so one faulty handler never shrinks the pool.
//!
//! # Shutdown
//!
//! [`ShutdownMode::Stop`] closes the queue and lets the workers run every job
//! that was already queued.  [`ShutdownMode::Drop`] closes the queue and
//! discards queued-but-unstarted jobs.  In both modes jobs that are already
//! running finish, and [`WorkerPool::shutdown`] returns once every worker has
//! exited.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// A unit of work accepted by the pool.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Errors returned by the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("worker pool needs at least one worker")]
    NoWorkers,
    #[error("worker pool has been shut down")]
    ShutDown,
}

/// What happens to queued jobs on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Run every job that was queued before shutdown.
    Stop,
    /// Discard jobs that have not started yet.
    Drop,
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Job>>>;

/// A bounded set of workers pulling from one FIFO queue.
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    discard: Arc<AtomicBool>,
    queued: Arc<AtomicUsize>,
    thread_count: usize,
}

impl WorkerPool {
    /// Spawns `thread_count` workers on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::NoWorkers`] if `thread_count` is zero.
    pub fn new(thread_count: usize) -> Result<Self, PoolError> {
        if thread_count == 0 {
            return Err(PoolError::NoWorkers);
        }

        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(rx));
        let discard = Arc::new(AtomicBool::new(false));
        let queued = Arc::new(AtomicUsize::new(0));

        let workers = (0..thread_count)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    Arc::clone(&receiver),
                    Arc::clone(&discard),
                    Arc::clone(&queued),
                ))
            })
            .collect();

        debug!(thread_count, "worker pool started");

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            discard,
            queued,
            thread_count,
        })
    }

    /// Queues `job` for execution by the next idle worker.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ShutDown`] once shutdown has begun.
    pub fn submit<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = sender.as_ref().ok_or(PoolError::ShutDown)?;
        self.queued.fetch_add(1, Ordering::SeqCst);
        tx.send(Box::pin(job)).map_err(|_| {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            PoolError::ShutDown
        })
    }

    /// Closes the queue without waiting for the workers.
    ///
    /// Later calls are no-ops, except that a `Drop` after a `Stop` still
    /// discards whatever has not started yet.
    pub fn close(&self, mode: ShutdownMode) {
        if mode == ShutdownMode::Drop {
            self.discard.store(true, Ordering::SeqCst);
        }
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_some() {
            debug!(?mode, queued = self.queued_jobs(), "worker pool closing");
        }
    }

    /// Waits for every worker to exit.  Call after [`close`](Self::close).
    pub async fn join(&self) {
        let handles = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in handles {
            if let Err(e) = handle.await {
                error!("worker task failed: {e}");
            }
        }
    }

    /// Closes the queue with `mode` and joins every worker.  Idempotent.
    pub async fn shutdown(&self, mode: ShutdownMode) {
        self.close(mode);
        self.join().await;
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Number of jobs queued but not yet picked up by a worker.
    pub fn queued_jobs(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("thread_count", &self.thread_count)
            .field("queued", &self.queued_jobs())
            .field("running", &self.is_running())
            .finish()
    }
}

async fn worker_loop(
    id: usize,
    receiver: SharedReceiver,
    discard: Arc<AtomicBool>,
    queued: Arc<AtomicUsize>,
) {
    loop {
        let job = {
            let mut rx = receiver.lock().await;
            rx.recv().await
        };
        let Some(job) = job else { break };
        queued.fetch_sub(1, Ordering::SeqCst);

        if discard.load(Ordering::SeqCst) {
            debug!(worker = id, "dropping unstarted job");
            continue;
        }

        if let Err(panic) = AssertUnwindSafe(job).catch_unwind().await {
            error!(worker = id, "job panicked: {}", panic_message(panic.as_ref()));
        }
    }
    debug!(worker = id, "worker stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
