//! Fixed-size worker pool with a completion barrier.
//!
//! Workers drain a FIFO queue guarded by a mutex and condition variable.
//! `wait_for_completion` blocks until the queue is empty and no task is
//! executing; a second condition variable signals that barrier. Dropping
//! the pool stops the workers after they drain the queue.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::error;
use parking_lot::{Condvar, Mutex};
use thiserror::Error;

type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("cannot enqueue task: worker pool is stopped")]
    EnqueueAfterStop,
}

struct Shared {
    queue: VecDeque<Task>,
    active: usize,
    stop: bool,
    /// Count of tasks that panicked since the last barrier
    panicked: usize,
}

struct Inner {
    shared: Mutex<Shared>,
    /// Wakes workers when tasks arrive or stop is requested
    work_available: Condvar,
    /// Wakes waiters when the queue drains and all tasks finish
    all_done: Condvar,
}

pub struct WorkerPool {
    inner: Arc<Inner>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Pool with `num_threads` workers (minimum 1)
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);
        let inner = Arc::new(Inner {
            shared: Mutex::new(Shared {
                queue: VecDeque::new(),
                active: 0,
                stop: false,
                panicked: 0,
            }),
            work_available: Condvar::new(),
            all_done: Condvar::new(),
        });

        let workers = (0..num_threads)
            .map(|i| {
                let inner = Arc::clone(&inner);
                thread::Builder::new()
                    .name(format!("raster-worker-{i}"))
                    .spawn(move || worker_loop(inner))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self { inner, workers }
    }

    /// Pool sized to hardware parallelism minus one (minimum 1)
    pub fn with_default_threads() -> Self {
        let n = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        Self::new(n.saturating_sub(1).max(1))
    }

    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }

    /// Push a task and wake one worker. Fails once the pool is stopping.
    pub fn enqueue<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut shared = self.inner.shared.lock();
            if shared.stop {
                return Err(PoolError::EnqueueAfterStop);
            }
            shared.queue.push_back(Box::new(task));
        }
        self.inner.work_available.notify_one();
        Ok(())
    }

    /// Block until the queue is empty and no task is executing.
    /// Returns the number of tasks that panicked since the last barrier.
    pub fn wait_for_completion(&self) -> usize {
        let mut shared = self.inner.shared.lock();
        while shared.active != 0 || !shared.queue.is_empty() {
            self.inner.all_done.wait(&mut shared);
        }
        std::mem::take(&mut shared.panicked)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        {
            let mut shared = self.inner.shared.lock();
            shared.stop = true;
        }
        self.inner.work_available.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(inner: Arc<Inner>) {
    loop {
        let task = {
            let mut shared = inner.shared.lock();
            while shared.queue.is_empty() && !shared.stop {
                inner.work_available.wait(&mut shared);
            }
            if shared.stop && shared.queue.is_empty() {
                return;
            }
            let task = shared.queue.pop_front().expect("queue checked non-empty");
            shared.active += 1;
            task
        };

        // A panicking task must not wedge the barrier; record it and keep
        // the worker alive.
        let result = panic::catch_unwind(AssertUnwindSafe(task));

        let mut shared = inner.shared.lock();
        shared.active -= 1;
        if result.is_err() {
            shared.panicked += 1;
            error!("worker task panicked");
        }
        if shared.active == 0 && shared.queue.is_empty() {
            inner.all_done.notify_all();
        }
    }
}
