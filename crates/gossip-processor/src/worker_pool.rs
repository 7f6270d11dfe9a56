//! Bounded-queue task dispatcher over a fixed set of OS threads.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Fixed-parallelism worker pool with a bounded submission queue.
///
/// Saturation policy: [`WorkerPool::submit`] blocks the caller while the
/// queue is full, so producers observe back-pressure instead of losing
/// tasks. Each worker runs one task to completion before taking the next.
pub struct WorkerPool<T: Send + 'static> {
    worker_count: usize,
    sender: Mutex<Option<Sender<T>>>,
    receiver: Receiver<T>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Creates a pool with `worker_count` threads and a queue of
    /// `queue_size` slots. Tasks may be submitted before [`Self::start`];
    /// they sit in the queue until the workers come up.
    pub fn new(worker_count: usize, queue_size: usize) -> Self {
        let (sender, receiver) = channel::bounded(queue_size);
        Self {
            worker_count,
            sender: Mutex::new(Some(sender)),
            receiver,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the worker threads. A second call is a no-op.
    pub fn start<F>(&self, handler: F)
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            return;
        }
        let handler = Arc::new(handler);
        for index in 0..self.worker_count {
            let receiver = self.receiver.clone();
            let handler = Arc::clone(&handler);
            let worker = thread::Builder::new()
                .name(format!("gossip-worker-{index}"))
                .spawn(move || {
                    while let Ok(task) = receiver.recv() {
                        handler(task);
                    }
                })
                .expect("failed to spawn gossip worker thread");
            workers.push(worker);
        }
        debug!(workers = self.worker_count, "worker pool started");
    }

    /// Enqueues a task, blocking while the queue is full.
    ///
    /// A task submitted after [`Self::stop_and_wait`] is dropped with a
    /// warning.
    pub fn submit(&self, task: T) {
        let sender = self.sender.lock().clone();
        match sender {
            Some(sender) => {
                if sender.send(task).is_err() {
                    warn!("worker pool queue disconnected; dropping task");
                }
            }
            None => warn!("worker pool stopped; dropping task"),
        }
    }

    /// Stops accepting tasks, lets the workers drain every queued task, then
    /// joins them.
    pub fn stop_and_wait(&self) {
        self.sender.lock().take();
        let mut workers = self.workers.lock();
        for worker in workers.drain(..) {
            if worker.join().is_err() {
                warn!("worker thread panicked during shutdown");
            }
        }
        debug!("worker pool stopped");
    }

    /// Number of tasks waiting in the queue.
    pub fn queued_tasks(&self) -> usize {
        self.receiver.len()
    }
}
