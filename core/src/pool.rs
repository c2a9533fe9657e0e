//! Proof Worker Pool
//!
//! Bounded-concurrency execution of independent proving tasks.
//!
//! ```text
//!  builder thread                       worker set (N threads)
//!  ──────────────                       ──────────────────────
//!  lease = pool.checkout()      ──►     idle set reused or spawned
//!  lease.submit(task) × k       ──►     mpsc ──► worker: run task
//!                                                  └─► oneshot reply
//!  lease.join()                 ◄──     every reply collected in order
//!  drop(lease)                  ──►     set returned to the idle list
//! ```
//!
//! Workers are plain OS threads (proving is CPU bound) fed through a tokio
//! channel with `blocking_recv`, so `join()` must not be called from inside
//! an async runtime.

use log::{debug, warn};
use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};

use shroud_config::ProverTomlConfig;

use crate::error::{LedgerError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed group of worker threads sharing one job queue
struct WorkerSet {
    sender: Option<mpsc::UnboundedSender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerSet {
    fn spawn(workers: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..workers)
            .map(|_| {
                let receiver = receiver.clone();
                std::thread::spawn(move || {
                    loop {
                        let job = receiver.lock().blocking_recv();
                        match job {
                            Some(job) => job(),
                            None => break,
                        }
                    }
                })
            })
            .collect();

        debug!("Spawned proof worker set with {} threads", workers);
        Self {
            sender: Some(sender),
            handles,
        }
    }

    fn send(&self, job: Job) -> bool {
        match &self.sender {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        }
    }
}

impl Drop for WorkerSet {
    fn drop(&mut self) {
        // closing the channel ends every worker loop
        self.sender.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("Proof worker exited with a panic");
            }
        }
    }
}

/// Idle worker sets kept by `ProofWorkerPool::new`
pub const DEFAULT_MAX_IDLE_SETS: usize = 2;

/// Reusable pool of worker sets, one set per concurrent batch
pub struct ProofWorkerPool {
    workers: usize,
    max_idle: usize,
    idle: Mutex<Vec<WorkerSet>>,
}

impl ProofWorkerPool {
    pub fn new(workers: usize) -> Self {
        Self::with_idle_cap(workers, DEFAULT_MAX_IDLE_SETS)
    }

    /// Pool that keeps at most `max_idle` sets between batches
    pub fn with_idle_cap(workers: usize, max_idle: usize) -> Self {
        Self {
            workers: workers.max(1),
            max_idle,
            idle: Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(config: &ProverTomlConfig) -> Self {
        Self::with_idle_cap(config.workers, config.max_idle_sets)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Number of worker sets waiting to be reused
    pub fn idle_sets(&self) -> usize {
        self.idle.lock().len()
    }

    /// Take a worker set for one batch of tasks. The set is handed back
    /// when the lease drops, after every submitted task has finished.
    pub fn checkout<T: Send + 'static>(&self) -> PoolLease<'_, T> {
        let set = self
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| WorkerSet::spawn(self.workers));
        PoolLease {
            pool: self,
            set: Some(set),
            pending: Vec::new(),
        }
    }

    fn give_back(&self, set: WorkerSet) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(set);
            return;
        }
        drop(idle);
        debug!("Idle cap {} reached, shutting down worker set", self.max_idle);
        drop(set);
    }
}

/// Scoped use of one worker set
pub struct PoolLease<'a, T: Send + 'static> {
    pool: &'a ProofWorkerPool,
    set: Option<WorkerSet>,
    pending: Vec<oneshot::Receiver<Result<T>>>,
}

impl<T: Send + 'static> PoolLease<'_, T> {
    /// Queue one task. A panicking task is reported as a `ProofFailure`.
    pub fn submit<F>(&mut self, task: F)
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            let result = catch_unwind(AssertUnwindSafe(task)).unwrap_or_else(|_| {
                Err(LedgerError::ProofFailure("proof task panicked".into()))
            });
            let _ = reply_tx.send(result);
        });

        let queued = self.set.as_ref().map(|s| s.send(job)).unwrap_or(false);
        if !queued {
            let (tx, rx) = oneshot::channel();
            let _ = tx.send(Err(LedgerError::ProofFailure(
                "proof workers unavailable".into(),
            )));
            self.pending.push(rx);
            return;
        }
        self.pending.push(reply_rx);
    }

    /// Number of submitted tasks not yet joined
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Wait for every submitted task. Results come back in submission
    /// order; on failure the first error is returned, but only after all
    /// other tasks have finished.
    pub fn join(&mut self) -> Result<Vec<T>> {
        let mut results = Vec::with_capacity(self.pending.len());
        let mut first_error = None;

        for reply in self.pending.drain(..) {
            let outcome = reply
                .blocking_recv()
                .unwrap_or_else(|_| Err(LedgerError::ProofFailure("proof worker dropped task".into())));
            match outcome {
                Ok(value) => results.push(value),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }
}

impl<T: Send + 'static> Drop for PoolLease<'_, T> {
    fn drop(&mut self) {
        for reply in self.pending.drain(..) {
            let _ = reply.blocking_recv();
        }
        if let Some(set) = self.set.take() {
            self.pool.give_back(set);
        }
    }
}
