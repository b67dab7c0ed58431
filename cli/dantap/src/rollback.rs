//! Compensating actions for partially completed workflows.
//!
//! Each acquired resource pushes the action that releases it. On failure
//! the stack is unwound newest-first; a failing action is logged and the
//! rest still run. On success the stack is committed and nothing runs.

use tracing::{debug, warn};

type Compensation<'a> = Box<dyn FnOnce() -> anyhow::Result<()> + 'a>;

/// Ordered stack of compensating actions.
#[must_use = "a rollback stack must be committed or unwound"]
pub struct Rollback<'a> {
    actions: Vec<(String, Compensation<'a>)>,
}

impl<'a> Rollback<'a> {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Register the action undoing a step that just succeeded.
    pub fn push<F, E>(&mut self, label: impl Into<String>, action: F)
    where
        F: FnOnce() -> Result<(), E> + 'a,
        E: Into<anyhow::Error>,
    {
        self.actions
            .push((label.into(), Box::new(move || action().map_err(Into::into))));
    }

    /// Number of pending actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns true if nothing would be undone.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action in reverse order. Returns how many failed.
    pub fn unwind(mut self) -> usize {
        let mut failed = 0;
        while let Some((label, action)) = self.actions.pop() {
            match action() {
                Ok(()) => debug!(action = %label, "Rollback step complete"),
                Err(e) => {
                    failed += 1;
                    warn!(action = %label, error = %e, "Rollback step failed");
                }
            }
        }
        failed
    }

    /// Discard all actions without running them.
    pub fn commit(mut self) {
        self.actions.clear();
    }
}

impl Default for Rollback<'_> {
    fn default() -> Self {
        Self::new()
    }
}
