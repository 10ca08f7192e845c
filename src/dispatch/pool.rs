//! Worker threads that execute dispatched jobs.

use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;

pub(super) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Spawn `size` workers pulling jobs from a shared queue.
///
/// Workers exit once every job sender has been dropped and the queue is
/// drained.
pub(super) fn spawn_workers(size: usize, jobs: Receiver<Job>) -> Vec<JoinHandle<()>> {
    (0..size.max(1))
        .filter_map(|n| {
            let jobs = jobs.clone();
            let spawned = thread::Builder::new()
                .name(format!("cadenza-worker-{n}"))
                .spawn(move || {
                    while let Ok(job) = jobs.recv() {
                        job();
                    }
                    tracing::trace!(worker = n, "worker exiting");
                });
            match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::error!(worker = n, error = %e, "failed to spawn worker thread");
                    None
                }
            }
        })
        .collect()
}
