//! Planning primitives for a reconciliation run.
//!
//! This module holds the pure diff between prior and declared targets, the
//! journal of decided actions, and the revert stack used to undo them.

mod diff;
mod plan;
mod revert;

pub use diff::{Change, ChangeSet, DiffEngine, TargetDiff};
pub use plan::{ActionKind, PlannedAction, RunWarning};
pub use revert::{RevertStack, RollbackReport};
