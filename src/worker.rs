//! Dispatch Worker
//!
//! A single named thread fed by a FIFO queue. Every call into the engine
//! goes through it, so the engine is never entered concurrently and the
//! submitting thread stays free to notice interrupts while a call is in
//! flight.
//!
//! Cancellation is cooperative. A job cancelled before the worker picks it
//! up is skipped. A job that has already started runs to completion; its
//! result is dropped on the worker thread instead of being delivered.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{BridgeError, BridgeResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Shared flag an interrupt source trips to abandon waits
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; safe to call from a signal handler
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Re-arm the token for the next call
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Counters kept by the worker
#[derive(Debug, Default)]
struct WorkerStats {
    submitted: AtomicU64,
    completed: AtomicU64,
    skipped: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time copy of the worker counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSnapshot {
    /// Jobs accepted into the queue
    pub submitted: u64,
    /// Jobs that ran (including ones that panicked)
    pub completed: u64,
    /// Jobs cancelled before they started
    pub skipped: u64,
    /// Finished jobs whose caller had stopped waiting
    pub discarded: u64,
}

/// Handle to a submitted job's eventual result
#[must_use = "dropping a Pending abandons its result"]
pub struct Pending<T> {
    receiver: Receiver<Result<T, String>>,
    cancelled: Arc<AtomicBool>,
    ticket: u64,
}

impl<T> Pending<T> {
    /// Submission sequence number, monotonically increasing per worker
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Whether the result can be taken without blocking
    pub fn is_ready(&self) -> bool {
        !self.receiver.is_empty()
    }

    /// Block until the job finishes
    pub fn wait(self) -> BridgeResult<T> {
        match self.receiver.recv() {
            Ok(result) => result.map_err(BridgeError::WorkerPanicked),
            Err(_) => Err(BridgeError::WorkerUnavailable),
        }
    }

    /// Block for at most `timeout`. On timeout the job is cancelled and
    /// `Cancelled` is returned; a call already running keeps running.
    pub fn wait_timeout(self, timeout: Duration) -> BridgeResult<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => result.map_err(BridgeError::WorkerPanicked),
            Err(RecvTimeoutError::Timeout) => {
                self.cancel();
                Err(BridgeError::Cancelled)
            }
            Err(RecvTimeoutError::Disconnected) => Err(BridgeError::WorkerUnavailable),
        }
    }

    /// Block until the job finishes or `token` is tripped, checking the
    /// token every `poll`.
    pub fn wait_cancellable(self, token: &CancelToken, poll: Duration) -> BridgeResult<T> {
        loop {
            if token.is_cancelled() {
                self.cancel();
                return Err(BridgeError::Cancelled);
            }
            match self.receiver.recv_timeout(poll) {
                Ok(result) => return result.map_err(BridgeError::WorkerPanicked),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(BridgeError::WorkerUnavailable)
                }
            }
        }
    }

    /// Like [`Pending::wait_cancellable`], but also give up once `timeout`
    /// has passed. Both outcomes report `Cancelled`.
    pub fn wait_cancellable_timeout(
        self,
        token: &CancelToken,
        poll: Duration,
        timeout: Duration,
    ) -> BridgeResult<T> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if token.is_cancelled() || now >= deadline {
                self.cancel();
                return Err(BridgeError::Cancelled);
            }
            match self.receiver.recv_timeout(poll.min(deadline - now)) {
                Ok(result) => return result.map_err(BridgeError::WorkerPanicked),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(BridgeError::WorkerUnavailable)
                }
            }
        }
    }

    /// Give up on the result
    pub fn cancel(self) {
        self.cancelled.store(true, Ordering::Release);
        debug!(ticket = self.ticket, "pending call cancelled");
    }
}

/// Single-thread FIFO executor
pub struct DispatchWorker {
    name: String,
    sender: Mutex<Option<Sender<Job>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<WorkerStats>,
    next_ticket: AtomicU64,
}

impl DispatchWorker {
    /// Start the worker thread
    pub fn spawn(name: impl Into<String>) -> BridgeResult<Self> {
        let name = name.into();
        let (sender, receiver) = unbounded::<Job>();

        let thread_name = name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                for job in receiver.iter() {
                    job();
                }
                debug!(worker = %thread_name, "dispatch worker exiting");
            })
            .map_err(BridgeError::WorkerSpawn)?;

        debug!(worker = %name, "dispatch worker started");
        Ok(Self {
            name,
            sender: Mutex::new(Some(sender)),
            thread: Mutex::new(Some(handle)),
            stats: Arc::new(WorkerStats::default()),
            next_ticket: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the worker still accepts jobs
    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Queue `job` behind every job submitted before it
    pub fn submit<T, F>(&self, job: F) -> BridgeResult<Pending<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (result_tx, result_rx) = bounded(1);
        let cancelled = Arc::new(AtomicBool::new(false));

        // Tickets are handed out under the sender lock so they follow queue order
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(BridgeError::WorkerUnavailable)?;
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);

        let flag = Arc::clone(&cancelled);
        let stats = Arc::clone(&self.stats);
        let wrapped: Job = Box::new(move || {
            if flag.load(Ordering::Acquire) {
                stats.skipped.fetch_add(1, Ordering::Relaxed);
                debug!(ticket, "skipping job cancelled before dispatch");
                return;
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(job));
            stats.completed.fetch_add(1, Ordering::Relaxed);
            let message = outcome.map_err(panic_message);
            if result_tx.send(message).is_err() {
                stats.discarded.fetch_add(1, Ordering::Relaxed);
                warn!(ticket, "caller stopped waiting, result discarded");
            }
        });

        sender
            .send(wrapped)
            .map_err(|_| BridgeError::WorkerUnavailable)?;
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);

        Ok(Pending {
            receiver: result_rx,
            cancelled,
            ticket,
        })
    }

    pub fn stats(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            submitted: self.stats.submitted.load(Ordering::Relaxed),
            completed: self.stats.completed.load(Ordering::Relaxed),
            skipped: self.stats.skipped.load(Ordering::Relaxed),
            discarded: self.stats.discarded.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting jobs, let the queue drain, and join the thread.
    ///
    /// Blocks until an in-flight native call returns.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!(worker = %self.name, "dispatch worker panicked during shutdown");
            }
        }
    }
}

impl Drop for DispatchWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
