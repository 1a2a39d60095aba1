//! Target store trait definition.
//!
//! This module defines the common interface for snapshot storage backends.

use async_trait::async_trait;
use std::path::PathBuf;

use super::lock::LockInfo;
use super::types::TargetSnapshot;
use crate::error::Result;

/// Trait for target snapshot backends.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Loads the last committed snapshot.
    ///
    /// Returns an empty snapshot if none was written yet.
    async fn load(&self) -> Result<TargetSnapshot>;

    /// Replaces the committed snapshot.
    ///
    /// Either the whole snapshot is written or the previous one is kept.
    async fn save(&self, snapshot: &TargetSnapshot) -> Result<()>;

    /// Acquires the run lock.
    ///
    /// Returns lock information if successful.
    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo>;

    /// Releases the run lock if `lock_id` still holds it.
    async fn release_lock(&self, lock_id: &str) -> Result<()>;

    /// Pushes back the expiry of the lock held by `lock_id`.
    ///
    /// Fails if the lock is gone or was replaced by another run's lock.
    async fn refresh_lock(&self, lock_id: &str) -> Result<LockInfo>;

    /// Gets current lock information if locked.
    async fn get_lock_info(&self) -> Result<Option<LockInfo>>;

    /// Checks if a live lock exists.
    async fn is_locked(&self) -> Result<bool>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;

    /// Default file for dry-run snapshots, if the backend has a local home.
    fn dry_run_path(&self) -> Option<PathBuf> {
        None
    }
}

#[async_trait]
impl TargetStore for Box<dyn TargetStore> {
    async fn load(&self) -> Result<TargetSnapshot> {
        (**self).load().await
    }

    async fn save(&self, snapshot: &TargetSnapshot) -> Result<()> {
        (**self).save(snapshot).await
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        (**self).acquire_lock(holder).await
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        (**self).release_lock(lock_id).await
    }

    async fn refresh_lock(&self, lock_id: &str) -> Result<LockInfo> {
        (**self).refresh_lock(lock_id).await
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        (**self).get_lock_info().await
    }

    async fn is_locked(&self) -> Result<bool> {
        (**self).is_locked().await
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }

    fn dry_run_path(&self) -> Option<PathBuf> {
        (**self).dry_run_path()
    }
}
