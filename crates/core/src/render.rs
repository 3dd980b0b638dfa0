//! Background deflation job
//!
//! One job computes one primitive sequence on the shared worker pool. The
//! owner polls (or blocks on) the pool ticket; once the pool reports the task
//! done, the worker is guaranteed to never touch the output slot again, so
//! the owner takes the result without any further coordination.
//!
//! An owner that goes away first raises the kill flag instead of waiting. The
//! worker reads the flag exactly once, after the computation has finished:
//! killed means the result is dropped on the worker thread and the job's
//! heap state dies with the closure.

use content_model::{BoundingRange, ContentSource, PrimitiveSequence};
use embed_host_scheduler::{KillFlag, TaskPool, TaskTicket};
use std::sync::{Arc, Mutex};

pub(crate) struct RenderJob {
    output: Arc<Mutex<Option<(PrimitiveSequence, BoundingRange)>>>,
    ticket: TaskTicket,
    kill: KillFlag,
}

impl RenderJob {
    /// Queue a deflation of `content` on the pool.
    ///
    /// Deflation errors are swallowed here: the job completes with an empty
    /// sequence so the owner caches "no content" instead of retrying every
    /// frame.
    pub(crate) fn spawn(pool: &TaskPool, content: Arc<dyn ContentSource>) -> Self {
        let output = Arc::new(Mutex::new(None));
        let kill = KillFlag::new();

        let worker_output = Arc::clone(&output);
        let worker_kill = kill.clone();
        let ticket = pool.submit(move || {
            let result = match content.deflate_to_primitives() {
                Ok(result) => result,
                Err(err) => {
                    log::warn!("background deflation failed: {}", err);
                    (PrimitiveSequence::new(), BoundingRange::EMPTY)
                }
            };

            // Single read of the flag, after all the work. A kill raised
            // later than this is the owner's race to lose; the ticket is
            // already abandoned then and the output Arc dies with us.
            if !worker_kill.is_killed() {
                *worker_output.lock().unwrap() = Some(result);
            }
        });

        Self { output, ticket, kill }
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.ticket.is_complete()
    }

    /// Block until the pool reports the task done.
    pub(crate) fn wait(&self) {
        self.ticket.wait();
    }

    /// Take the computed result. `None` if the job was never completed or
    /// the result was discarded.
    pub(crate) fn take_output(self) -> Option<(PrimitiveSequence, BoundingRange)> {
        self.output.lock().unwrap().take()
    }

    /// Abandon the job: the task still runs, but it discards its result and
    /// releases its own state on the worker thread.
    pub(crate) fn kill(self) {
        self.kill.kill();
    }
}
