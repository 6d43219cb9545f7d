//! Work queue for asynchronous cache operations
//!
//! A clone-able handle over a crossbeam channel feeding a small pool of
//! named worker threads. Workers draw jobs concurrently from the shared
//! channel, so completion order across jobs is not FIFO; mutual exclusion
//! of store state comes from each store's own lock, not from the queue.
//!
//! Dropping the last handle closes the channel and joins the workers. Once
//! enqueued, a job runs to completion; there is no cancellation.

use std::sync::Arc;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Shared handle to a pool of worker threads.
#[derive(Clone)]
pub struct WorkQueue {
    inner: Arc<WorkQueueInner>,
}

struct WorkQueueInner {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkQueue {
    /// Spawn `threads` workers (at least one) labeled with `label`.
    pub fn new(label: &str, threads: usize) -> Self {
        let (sender, receiver) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(threads.max(1));

        for worker_id in 0..threads.max(1) {
            let receiver: Receiver<Job> = receiver.clone();
            let builder = thread::Builder::new().name(format!("{}-worker-{}", label, worker_id));
            match builder.spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
            }) {
                Ok(handle) => workers.push(handle),
                Err(e) => log::warn!("failed to spawn {} worker {}: {}", label, worker_id, e),
            }
        }

        Self {
            inner: Arc::new(WorkQueueInner {
                sender: Mutex::new(Some(sender)),
                workers: Mutex::new(workers),
            }),
        }
    }

    /// Enqueue a job. Silently dropped if the queue has shut down.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        let guard = match self.inner.sender.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(sender) = guard.as_ref() {
            let _ = sender.send(Box::new(job));
        }
    }
}

impl Drop for WorkQueueInner {
    fn drop(&mut self) {
        // Close the channel so workers drain remaining jobs and exit.
        if let Ok(mut guard) = self.sender.lock() {
            guard.take();
        }
        let current = thread::current().id();
        if let Ok(mut workers) = self.workers.lock() {
            for handle in workers.drain(..) {
                // The last queue handle can be dropped from inside a job,
                // on a worker thread; that worker must not join itself.
                if handle.thread().id() == current {
                    continue;
                }
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    #[test]
    fn executes_submitted_jobs() {
        let queue = WorkQueue::new("test", 2);
        let (tx, rx) = mpsc::channel();

        for i in 0..8 {
            let tx = tx.clone();
            queue.execute(move || {
                tx.send(i).unwrap();
            });
        }

        let mut seen: Vec<i32> = (0..8).map(|_| rx.recv().unwrap()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn drop_drains_pending_jobs() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let queue = WorkQueue::new("drain", 1);
            for _ in 0..16 {
                let counter = Arc::clone(&counter);
                queue.execute(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
            // Dropping the handle joins the worker after the backlog runs.
        }
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn clones_share_one_pool() {
        let queue = WorkQueue::new("shared", 2);
        let clone = queue.clone();
        let (tx, rx) = mpsc::channel();

        let tx2 = tx.clone();
        queue.execute(move || tx.send("a").unwrap());
        clone.execute(move || tx2.send("b").unwrap());

        let mut got = vec![rx.recv().unwrap(), rx.recv().unwrap()];
        got.sort_unstable();
        assert_eq!(got, vec!["a", "b"]);
    }
}
