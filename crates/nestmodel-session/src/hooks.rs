//! Deferred transaction callbacks.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// A callback deferred until the enclosing transaction ends.
pub type Hook = Box<dyn FnOnce() + Send + 'static>;

/// Commit and rollback callbacks collected for one transaction frame.
///
/// Commit hooks run in registration order once the outermost transaction
/// commits. Rollback hooks run when the frame they were registered in is
/// rolled back. Committing an inner frame hands both lists to its parent.
#[derive(Default)]
pub struct TxHooks {
    commit: Vec<Hook>,
    rollback: Vec<Hook>,
}

impl TxHooks {
    /// Create an empty hook set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` after the outermost commit.
    pub fn on_commit(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.commit.push(Box::new(hook));
    }

    /// Run `hook` if this frame is rolled back.
    pub fn on_rollback(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.rollback.push(Box::new(hook));
    }

    /// Number of pending commit hooks.
    pub fn commit_len(&self) -> usize {
        self.commit.len()
    }

    /// Number of pending rollback hooks.
    pub fn rollback_len(&self) -> usize {
        self.rollback.len()
    }

    /// True if no hook of either kind is pending.
    pub fn is_empty(&self) -> bool {
        self.commit.is_empty() && self.rollback.is_empty()
    }

    /// Append another frame's hooks after ours.
    pub fn absorb(&mut self, other: TxHooks) {
        self.commit.extend(other.commit);
        self.rollback.extend(other.rollback);
    }

    /// Run every commit hook and drop the rollback hooks.
    ///
    /// A panicking hook does not stop the ones after it; the first panic is
    /// resumed once all of them have run.
    pub fn run_commit(self) {
        let count = self.commit.len();
        run_all(self.commit);
        tracing::debug!(count, "Ran commit hooks");
    }

    /// Run every rollback hook and drop the commit hooks.
    ///
    /// Panics are handled as in [`run_commit`](Self::run_commit).
    pub fn run_rollback(self) {
        let count = self.rollback.len();
        let discarded = self.commit.len();
        run_all(self.rollback);
        tracing::debug!(count, discarded, "Ran rollback hooks");
    }
}

fn run_all(hooks: Vec<Hook>) {
    let mut first_panic = None;
    for hook in hooks {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(hook)) {
            tracing::warn!("Transaction hook panicked");
            first_panic.get_or_insert(payload);
        }
    }
    if let Some(payload) = first_panic {
        panic::resume_unwind(payload);
    }
}

impl fmt::Debug for TxHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxHooks")
            .field("commit", &self.commit.len())
            .field("rollback", &self.rollback.len())
            .finish()
    }
}
