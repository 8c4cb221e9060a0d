//! Long-lived worker threads for the rasterizer pool.
//!
//! A [`Worker`] owns one OS thread and a single-producer task queue. The
//! producer pushes task records, then calls [`Worker::flush`] to hand the
//! batch over. The worker drains the queue, runs every task and raises its
//! ready flag. While idle the thread either parks on a condvar or spins,
//! depending on the [`Worker::busy_waiting`] mode.

use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};

/// A unit of work that can be shipped to a [`Worker`].
pub trait Task: Send + 'static {
    fn run(&mut self);
}

impl<F> Task for F
where
    F: FnMut() + Send + 'static,
{
    fn run(&mut self) {
        self();
    }
}

struct Shared<T> {
    queue: SegQueue<T>,
    /// Set by `flush`, cleared by the worker when it picks the batch up.
    pending: AtomicBool,
    /// Set by the worker once the batch is fully drained.
    ready: AtomicBool,
    busy_wait: AtomicBool,
    shutdown: AtomicBool,
    lock: Mutex<()>,
    cvar: Condvar,
}

/// A single long-lived worker thread.
pub struct Worker<T> {
    shared: Arc<Shared<T>>,
    handle: Option<JoinHandle<()>>,
}

impl<T> Worker<T>
where
    T: Task,
{
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            queue: SegQueue::new(),
            pending: AtomicBool::new(false),
            ready: AtomicBool::new(true),
            busy_wait: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            lock: Mutex::new(()),
            cvar: Condvar::new(),
        });

        let handle = {
            let shared = shared.clone();
            std::thread::spawn(move || run_worker(&shared))
        };

        Self {
            shared,
            handle: Some(handle),
        }
    }

    /// Enqueues a task. The task does not run until the next [`flush`].
    ///
    /// [`flush`]: Self::flush
    pub fn push(&self, task: T) {
        self.shared.queue.push(task);
    }

    /// Hands all queued tasks to the worker thread.
    pub fn flush(&self) {
        self.shared.ready.store(false, Ordering::Release);
        self.shared.pending.store(true, Ordering::Release);

        // A parked worker needs the wakeup even if busy-wait mode was just
        // enabled; the flag race is resolved by notifying unconditionally.
        let _guard = self.shared.lock.lock();
        self.shared.cvar.notify_one();
    }

    /// Returns `true` once every task of the last flushed batch has run.
    pub fn ready(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire)
    }

    /// Spins until the worker has drained the last flushed batch.
    pub fn wait(&self) {
        while !self.ready() {
            std::hint::spin_loop();
        }
    }

    /// Selects between spinning (`true`) and parking (`false`) while the
    /// worker has nothing to do. Spinning keeps flush-to-start latency in
    /// the nanosecond range at the cost of a burned core.
    pub fn busy_waiting(&self, enabled: bool) {
        self.shared.busy_wait.store(enabled, Ordering::Relaxed);

        if !enabled {
            let _guard = self.shared.lock.lock();
            self.shared.cvar.notify_one();
        }
    }

    pub fn is_busy_waiting(&self) -> bool {
        self.shared.busy_wait.load(Ordering::Relaxed)
    }
}

impl<T> Default for Worker<T>
where
    T: Task,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Worker<T> {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        {
            let _guard = self.shared.lock.lock();
            self.shared.cvar.notify_one();
        }

        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

impl<T> Debug for Worker<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("ready", &self.shared.ready.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

fn run_worker<T>(shared: &Shared<T>)
where
    T: Task,
{
    loop {
        // Wait for a flush (or shutdown).
        loop {
            if shared.shutdown.load(Ordering::Acquire) {
                return;
            }

            if shared.pending.load(Ordering::Acquire) {
                break;
            }

            if shared.busy_wait.load(Ordering::Relaxed) {
                std::hint::spin_loop();
            } else {
                let mut guard = shared.lock.lock();
                if !shared.pending.load(Ordering::Acquire)
                    && !shared.shutdown.load(Ordering::Acquire)
                {
                    shared.cvar.wait(&mut guard);
                }
            }
        }

        shared.pending.store(false, Ordering::Relaxed);

        while let Some(mut task) = shared.queue.pop() {
            task.run();
        }

        shared.ready.store(true, Ordering::Release);
    }
}
