//! Shared background worker pool
//!
//! A fixed set of worker threads executes submitted tasks in FIFO order.
//! Each submission returns a [`TaskTicket`] tagged with a unique id; the
//! submitter polls the ticket (or blocks on it) to learn that the pool has
//! finished the task. The pool itself keeps only a weak reference to each
//! ticket's completion cell, so abandoning a ticket releases all bookkeeping
//! for its task once the task has run.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Unique task identifier
pub type TaskId = u64;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Configuration for the task pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads to spawn.
    /// Default: number of logical CPU cores.
    pub num_workers: usize,

    /// Maximum time a worker will wait for a task before checking shutdown.
    /// Default: 100ms.
    pub poll_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus(),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with the given worker count.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
            poll_interval: Duration::from_millis(100),
        }
    }

    /// Set the poll interval for workers.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Task pool statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    /// Total tasks submitted
    pub tasks_submitted: u64,

    /// Total tasks completed
    pub tasks_completed: u64,
}

/// Completion state shared between one ticket and the pool.
struct CompletionCell {
    done: Mutex<bool>,
    signal: Condvar,
}

impl CompletionCell {
    fn new() -> Self {
        Self {
            done: Mutex::new(false),
            signal: Condvar::new(),
        }
    }

    fn mark_done(&self) {
        let mut done = self.done.lock().unwrap();
        *done = true;
        self.signal.notify_all();
    }
}

/// Handle to one submitted task.
///
/// The ticket is the owner's only view of the task: poll [`is_complete`] from
/// the owner thread, or [`wait`] to block until the pool reports the task
/// done. Dropping the ticket abandons the task — it still runs, but nothing
/// is retained for it afterwards.
///
/// [`is_complete`]: TaskTicket::is_complete
/// [`wait`]: TaskTicket::wait
pub struct TaskTicket {
    id: TaskId,
    cell: Arc<CompletionCell>,
}

impl TaskTicket {
    /// The unique id of the task this ticket refers to.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Non-blocking check whether the task has finished executing.
    pub fn is_complete(&self) -> bool {
        *self.cell.done.lock().unwrap()
    }

    /// Block the calling thread until the task has finished executing.
    ///
    /// Waits unconditionally; there is no timeout.
    pub fn wait(&self) {
        let mut done = self.cell.done.lock().unwrap();
        while !*done {
            done = self.cell.signal.wait(done).unwrap();
        }
    }
}

struct QueueEntry {
    task: Task,
    cell: Weak<CompletionCell>,
}

struct PoolShared {
    queue: Mutex<VecDeque<QueueEntry>>,
    available: Condvar,
    shutdown: AtomicBool,
    next_id: AtomicU64,
    submitted: AtomicU64,
    completed: AtomicU64,
}

/// Shared background task pool.
///
/// Workers pull tasks from a FIFO queue and mark the associated completion
/// cell done after execution. Shutdown is graceful: workers finish their
/// current task before exiting.
pub struct TaskPool {
    shared: Arc<PoolShared>,
    workers: Vec<Worker>,
}

impl TaskPool {
    /// Create and start a new task pool.
    pub fn new(config: PoolConfig) -> Self {
        let shared = Arc::new(PoolShared {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        });

        let mut workers = Vec::with_capacity(config.num_workers);
        for id in 0..config.num_workers {
            workers.push(Worker::new(id, shared.clone(), config.poll_interval));
        }

        Self { shared, workers }
    }

    /// Submit a task for background execution.
    ///
    /// Returns a ticket the caller can poll or block on. The task always runs
    /// to completion even if the ticket is dropped first.
    pub fn submit<F>(&self, task: F) -> TaskTicket
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let cell = Arc::new(CompletionCell::new());

        {
            let mut queue = self.shared.queue.lock().unwrap();
            queue.push_back(QueueEntry {
                task: Box::new(task),
                cell: Arc::downgrade(&cell),
            });
        }
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        self.shared.available.notify_one();

        TaskTicket { id, cell }
    }

    /// Number of tasks queued but not yet picked up by a worker.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }

    /// Get the number of worker threads.
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Get pool statistics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            tasks_submitted: self.shared.submitted.load(Ordering::Relaxed),
            tasks_completed: self.shared.completed.load(Ordering::Relaxed),
        }
    }

    /// Shutdown the pool gracefully.
    ///
    /// Signals all workers to stop and waits for them to finish their current
    /// task and exit. Queued tasks that have not started are dropped. Letting
    /// the pool fall out of scope does the same.
    pub fn shutdown(self) {}
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.available.notify_all();

        for worker in self.workers.drain(..) {
            worker.join();
        }
    }
}

/// A single worker thread in the pool.
struct Worker {
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn new(id: usize, shared: Arc<PoolShared>, poll_interval: Duration) -> Self {
        let thread = thread::Builder::new()
            .name(format!("deflate-worker-{}", id))
            .spawn(move || Self::run(shared, poll_interval))
            .expect("Failed to spawn worker thread");

        Self {
            thread: Some(thread),
        }
    }

    /// Main worker loop.
    ///
    /// Pulls tasks in FIFO order, executes them, then marks the completion
    /// cell done — the owner observes results only after that point, which is
    /// what makes the output handoff safe without a data lock.
    fn run(shared: Arc<PoolShared>, poll_interval: Duration) {
        loop {
            if shared.shutdown.load(Ordering::Acquire) {
                break;
            }

            let entry = {
                let mut queue = shared.queue.lock().unwrap();
                loop {
                    if shared.shutdown.load(Ordering::Acquire) {
                        break None;
                    }
                    if let Some(entry) = queue.pop_front() {
                        break Some(entry);
                    }
                    let (guard, _timeout) = shared
                        .available
                        .wait_timeout(queue, poll_interval)
                        .unwrap();
                    queue = guard;
                }
            };

            let Some(entry) = entry else {
                break;
            };

            (entry.task)();
            shared.completed.fetch_add(1, Ordering::Relaxed);

            // Ticket may have been dropped; then there is nothing to signal.
            if let Some(cell) = entry.cell.upgrade() {
                cell.mark_done();
            }
        }
    }

    fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            thread.join().expect("Worker thread panicked");
        }
    }
}

/// Get the number of logical CPU cores.
///
/// This is used as the default number of worker threads.
fn num_cpus() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
