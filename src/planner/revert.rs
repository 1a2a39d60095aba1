//! Revert stack for rolling back a failed run.

use serde::Serialize;
use std::fmt;
use tracing::{error, info};

use crate::plugin::{ActionContext, HookAction, RevertFn};

/// Ordered log of reverts for completed actions.
///
/// Entries are only pushed while applying; [`RevertStack::unwind`] consumes
/// the stack and runs every revert in reverse insertion order.
#[derive(Debug, Default)]
pub struct RevertStack {
    entries: Vec<RevertEntry>,
}

#[derive(Debug)]
struct RevertEntry {
    /// Action the revert undoes.
    context: ActionContext,
    revert: RevertFn,
}

/// Outcome of a rollback sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    /// Number of reverts run.
    pub attempted: usize,
    /// Number of reverts that succeeded.
    pub reverted: usize,
    /// One message per failed revert, in the order they ran.
    pub failures: Vec<String>,
    /// Completed actions that had no revert to run.
    pub unrecoverable: Vec<String>,
}

impl RevertStack {
    /// Creates an empty stack.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Records the revert of a completed action.
    pub fn push(&mut self, context: ActionContext, revert: RevertFn) {
        self.entries.push(RevertEntry { context, revert });
    }

    /// Number of recorded reverts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing can be rolled back.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs every revert, newest first.
    ///
    /// A failing revert is logged and collected; the sweep always continues
    /// with the next one.
    pub async fn unwind(mut self) -> RollbackReport {
        let mut report = RollbackReport::default();
        if !self.entries.is_empty() {
            info!("Rolling back {} action(s)", self.entries.len());
        }

        while let Some(RevertEntry { context, revert }) = self.entries.pop() {
            report.attempted += 1;
            match revert.run().await {
                Ok(()) => report.reverted += 1,
                Err(e) => {
                    let failure = context.for_action(HookAction::Revert).fail(e);
                    error!("Revert of {context} failed: {}", failure.source);
                    report.failures.push(failure.to_string());
                }
            }
        }

        report
    }
}

impl RollbackReport {
    /// Returns true if every completed action was undone.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.unrecoverable.is_empty()
    }
}

impl fmt::Display for RollbackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempted == 0 && self.unrecoverable.is_empty() {
            return write!(f, "nothing to roll back");
        }
        write!(f, "rolled back {} of {} action(s)", self.reverted, self.attempted)?;
        if !self.unrecoverable.is_empty() {
            write!(f, ", {} without revert", self.unrecoverable.len())?;
        }
        Ok(())
    }
}
