//! Fixed-size worker pool dispatching one job per (n, m, run-index)
//! grid cell.
//!
//! Jobs are process-bound rather than CPU-bound (each one mostly waits
//! on the external solver), so the default pool is slightly larger than
//! the available parallelism. Submission order is advisory only; jobs
//! may execute in any order and on any worker.

use log::error;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// One cell of the benchmark grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
    pub num_vars: u32,
    pub num_clauses: u32,
    pub run_index: usize,
}

/// Default worker count: available parallelism plus some headroom.
pub fn default_worker_count() -> usize {
    thread::available_parallelism().map_or(4, NonZeroUsize::get) + 4
}

pub struct JobScheduler {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    cancelled: Arc<AtomicBool>,
}

impl JobScheduler {
    /// Starts `worker_count` workers that run `handler` on every
    /// submitted job. The handler owns all job-level error handling; a
    /// panicking handler takes down only its own worker.
    pub fn spawn<F>(worker_count: usize, handler: F) -> Self
    where
        F: Fn(Job) + Send + Sync + 'static,
    {
        assert!(worker_count >= 1);
        let handler = Arc::new(handler);
        let (sender, receiver) = mpsc::channel();
        let receiver: Arc<Mutex<Receiver<Job>>> = Arc::new(Mutex::new(receiver));
        let cancelled = Arc::new(AtomicBool::new(false));

        let workers = (0..worker_count)
            .map(|_| {
                let receiver = Arc::clone(&receiver);
                let handler = Arc::clone(&handler);
                let cancelled = Arc::clone(&cancelled);
                thread::spawn(move || loop {
                    // Hold the queue lock only to dequeue, never while a
                    // job (and its solver process) runs.
                    let job = {
                        let guard = receiver
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner());
                        match guard.recv() {
                            Ok(job) => job,
                            Err(_) => break,
                        }
                    };
                    if cancelled.load(Ordering::SeqCst) {
                        // Cancellation drains the queue without running
                        // the remaining jobs.
                        continue;
                    }
                    handler(job);
                })
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
            cancelled,
        }
    }

    /// Queues a job. Returns false once the scheduler is cancelled.
    pub fn submit(&self, job: Job) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return false;
        }
        match &self.sender {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        }
    }

    /// Stops accepting new jobs and abandons queued ones; jobs already
    /// in flight finish normally.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Shared cancellation flag, for wiring up a signal handler.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Closes the queue and waits for every worker to finish.
    pub fn drain(mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("worker thread panicked");
            }
        }
    }
}
