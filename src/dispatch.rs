//! Asynchronous execution of blocking work off the orchestrating thread.
//!
//! Tasks run on a bounded worker pool. Each finished task produces one
//! [`Completion`] on a single result channel that only the orchestrating
//! thread consumes. Cancelling a handle guarantees its result is never
//! delivered, even if the task already finished and its message is queued.

mod pool;
mod types;

pub use types::*;

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::error::{Error, Result};

use pool::{Job, spawn_workers};

pub struct TaskDispatcher {
    jobs: Option<Sender<Job>>,
    done_tx: Sender<Completion>,
    done_rx: Receiver<Completion>,
    tokens: HashMap<TaskHandle, CancelToken>,
    next_id: u64,
    workers: Vec<JoinHandle<()>>,
}

impl TaskDispatcher {
    pub fn new(pool_size: usize) -> Self {
        let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded::<Job>();
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<Completion>();
        let workers = spawn_workers(pool_size, jobs_rx);
        tracing::debug!(pool_size = workers.len(), "task dispatcher started");

        Self {
            jobs: Some(jobs_tx),
            done_tx,
            done_rx,
            tokens: HashMap::new(),
            next_id: 1,
            workers,
        }
    }

    /// Queue `task` for execution and return its handle immediately.
    ///
    /// The task receives `token` so it can stop at safe points. Panics inside
    /// the task are captured and delivered as [`Error::TaskPanicked`].
    pub fn submit<F>(&mut self, kind: TaskKind, token: CancelToken, task: F) -> TaskHandle
    where
        F: FnOnce(&CancelToken) -> Result<TaskOutput> + Send + 'static,
    {
        let handle = TaskHandle(self.next_id);
        self.next_id += 1;
        self.tokens.insert(handle, token.clone());

        let done = self.done_tx.clone();
        let job: Job = Box::new(move || {
            let result = if token.is_cancelled() {
                Err(Error::Cancelled)
            } else {
                panic::catch_unwind(AssertUnwindSafe(|| task(&token)))
                    .unwrap_or_else(|payload| Err(Error::TaskPanicked(panic_message(&*payload))))
            };

            if token.is_cancelled() {
                tracing::debug!(%handle, ?kind, "dropping result of cancelled task");
                return;
            }
            // The receiver only disappears when the dispatcher is gone.
            let _ = done.send(Completion {
                handle,
                kind,
                result,
            });
        });

        let queued = self.jobs.as_ref().map(|jobs| jobs.send(job));
        if !matches!(queued, Some(Ok(()))) {
            tracing::error!(%handle, ?kind, "worker pool unavailable");
            let _ = self.done_tx.send(Completion {
                handle,
                kind,
                result: Err(Error::TaskPanicked("worker pool unavailable".to_string())),
            });
        } else {
            tracing::trace!(%handle, ?kind, "task submitted");
        }
        handle
    }

    /// Mark `handle` cancelled. Returns false when it already completed.
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        match self.tokens.remove(&handle) {
            Some(token) => {
                token.cancel();
                tracing::debug!(%handle, "task cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, handle: TaskHandle) -> bool {
        self.tokens.contains_key(&handle)
    }

    pub fn in_flight(&self) -> usize {
        self.tokens.len()
    }

    /// The raw completion channel, for use in `select!`. Every message taken
    /// from it must go through [`TaskDispatcher::accept`].
    pub fn completions(&self) -> &Receiver<Completion> {
        &self.done_rx
    }

    /// Filter a raw completion: `None` when its task was cancelled.
    pub fn accept(&mut self, completion: Completion) -> Option<Completion> {
        match self.tokens.remove(&completion.handle) {
            Some(token) if !token.is_cancelled() => Some(completion),
            _ => {
                tracing::debug!(handle = %completion.handle, "discarding stale completion");
                None
            }
        }
    }

    /// Next deliverable completion without blocking.
    pub fn try_next(&mut self) -> Option<Completion> {
        while let Ok(raw) = self.done_rx.try_recv() {
            if let Some(c) = self.accept(raw) {
                return Some(c);
            }
        }
        None
    }

    /// Wait up to `timeout` for the next deliverable completion.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<Completion> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(std::time::Instant::now());
            match self.done_rx.recv_timeout(left) {
                Ok(raw) => {
                    if let Some(c) = self.accept(raw) {
                        return Some(c);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None;
                }
            }
        }
    }

    /// Cancel everything outstanding and wait for the workers to exit.
    pub fn shutdown(mut self) {
        self.stop_workers();
    }

    fn stop_workers(&mut self) {
        for (_, token) in self.tokens.drain() {
            token.cancel();
        }
        self.jobs.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::warn!("worker thread panicked during shutdown");
            }
        }
    }
}

impl Drop for TaskDispatcher {
    fn drop(&mut self) {
        self.stop_workers();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
