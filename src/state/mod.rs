//! Target store module.
//!
//! The store persists, per provider name, the targets that were live after
//! the last successful run. It is read once at the start of a run and
//! rewritten only after a fully successful, non-dry run.

mod local;
mod lock;
mod s3;
mod store;
mod types;

#[cfg(test)]
pub use store::MockTargetStore;

pub use local::{LocalTargetStore, STATE_DIR};
pub use lock::{LOCK_EXPIRY_SECS, LOCK_REFRESH_SECS, LockInfo, generate_holder_id};
pub use s3::S3TargetStore;
pub use store::TargetStore;
pub use types::{STATE_VERSION, TargetRecord, TargetSnapshot};
