//! Post-convergence queue.
//!
//! Tasks run strictly first-in first-out once a digest has stabilized. The
//! queue belongs to the engine, so it covers every tree the engine holds,
//! isolated scopes included.

use crate::engine::Engine;
use crate::error::{CallbackResult, EngineError};

/// A queued post-convergence task.
pub type PostTask = Box<dyn FnOnce(&mut Engine) -> CallbackResult>;

impl Engine {
    /// Queue a task to run after the next digest settles.
    pub fn enqueue_post_convergence<F>(&mut self, task: F)
    where
        F: FnOnce(&mut Engine) -> CallbackResult + 'static,
    {
        self.post_queue.push_back(Box::new(task));
    }

    /// Number of tasks waiting for the next flush.
    pub fn post_convergence_len(&self) -> usize {
        self.post_queue.len()
    }

    /// Drain the queue until it is empty.
    ///
    /// Tasks enqueued by running tasks join the same flush. When a task
    /// mutates a scope, the resulting digest runs (and flushes) before the
    /// next queued task; this flush then resumes with whatever is left.
    pub(crate) fn flush_post_convergence(&mut self) {
        while let Some(task) = self.post_queue.pop_front() {
            if let Err(source) = task(self) {
                self.report(EngineError::PostConvergenceTask { source }, None);
            }
            if !self.pending.is_empty() {
                self.tick();
            }
        }
    }
}
