//! S3-based target store.
//!
//! The snapshot and the lock are two objects under a common key prefix. The
//! lock object is created with a conditional put, so two runs racing for a
//! free lock cannot both win.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{DeployError, Result, StateError};

use super::lock::{LOCK_EXPIRY_SECS, LockInfo, holder_or_default, lock_lost};
use super::store::TargetStore;
use super::types::TargetSnapshot;

/// Snapshot object key suffix.
const STATE_KEY: &str = "targets.json";

/// Lock object key suffix.
const LOCK_KEY: &str = "run.lock";

/// S3-based target store.
#[derive(Debug, Clone)]
pub struct S3TargetStore {
    /// S3 client.
    client: Client,
    /// Bucket name.
    bucket: String,
    /// Normalized key prefix, empty or ending in `/`.
    prefix: String,
}

impl S3TargetStore {
    /// Creates a store using the ambient AWS configuration.
    pub async fn new(bucket: &str, prefix: Option<&str>, region: Option<&str>) -> Self {
        let loader = aws_config::from_env();
        let config = match region {
            Some(region) => loader.region(aws_config::Region::new(region.to_string())),
            None => loader,
        }
        .load()
        .await;

        Self::with_client(Client::new(&config), bucket, prefix)
    }

    /// Creates a store with an existing client.
    #[must_use]
    pub fn with_client(client: Client, bucket: &str, prefix: Option<&str>) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: normalize_prefix(prefix),
        }
    }

    fn key(&self, file: &str) -> String {
        format!("{}{file}", self.prefix)
    }

    fn location(&self, key: &str) -> String {
        format!("s3://{}/{key}", self.bucket)
    }

    async fn get_object(&self, key: &str) -> Result<Option<String>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(response) => {
                let bytes = response.body.collect().await.map_err(|e| {
                    DeployError::State(StateError::s3(format!("Failed to read S3 object: {e}")))
                })?;

                let content = String::from_utf8(bytes.to_vec()).map_err(|e| {
                    DeployError::State(StateError::Corrupted {
                        message: format!("Invalid UTF-8 in S3 object: {e}"),
                    })
                })?;

                Ok(Some(content))
            }
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(DeployError::State(StateError::s3(format!(
                        "S3 get error: {service_err}"
                    ))))
                }
            }
        }
    }

    async fn put_object(&self, key: &str, content: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(content.as_bytes().to_vec().into())
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| {
                DeployError::State(StateError::WriteFailed {
                    location: self.location(key),
                    message: e.to_string(),
                })
            })?;

        Ok(())
    }

    /// Writes `content` only if `key` does not exist yet.
    ///
    /// Returns `false` if the object already exists.
    async fn put_object_if_absent(&self, key: &str, content: &str) -> Result<bool> {
        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .if_none_match("*")
            .body(content.as_bytes().to_vec().into())
            .content_type("application/json")
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(sdk_err) => {
                let status = sdk_err.raw_response().map(|r| r.status().as_u16());
                if matches!(status, Some(409 | 412)) {
                    Ok(false)
                } else {
                    Err(DeployError::State(StateError::LockFailed {
                        message: format!("S3 put error: {sdk_err}"),
                    }))
                }
            }
        }
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| DeployError::State(StateError::s3(format!("S3 delete error: {e}"))))?;

        Ok(())
    }

    async fn read_lock(&self) -> Result<Option<LockInfo>> {
        let Some(content) = self.get_object(&self.key(LOCK_KEY)).await? else {
            return Ok(None);
        };

        let lock_info = serde_json::from_str(&content).map_err(|e| {
            DeployError::State(StateError::Corrupted {
                message: format!("Failed to parse lock: {e}"),
            })
        })?;
        Ok(Some(lock_info))
    }
}

#[async_trait]
impl TargetStore for S3TargetStore {
    async fn load(&self) -> Result<TargetSnapshot> {
        let key = self.key(STATE_KEY);
        debug!("Loading state from {}", self.location(&key));

        match self.get_object(&key).await? {
            Some(json) => {
                let snapshot = TargetSnapshot::from_json(&json)?;
                info!(
                    "Loaded {} target(s) across {} provider(s)",
                    snapshot.target_count(),
                    snapshot.providers.len()
                );
                Ok(snapshot)
            }
            None => {
                debug!("No state found in S3");
                Ok(TargetSnapshot::new())
            }
        }
    }

    async fn save(&self, snapshot: &TargetSnapshot) -> Result<()> {
        let key = self.key(STATE_KEY);
        info!("Saving state to {}", self.location(&key));

        let content = snapshot.to_pretty_json()?;
        self.put_object(&key, &content).await?;

        debug!("State saved successfully to S3");
        Ok(())
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        let key = self.key(LOCK_KEY);
        let lock_info = LockInfo::new(&holder_or_default(holder));
        let content = serde_json::to_string_pretty(&lock_info)
            .map_err(|e| StateError::serialization(format!("Failed to serialize lock: {e}")))?;

        if !self.put_object_if_absent(&key, &content).await? {
            match self.read_lock().await? {
                Some(existing) if !existing.is_expired() => {
                    return Err(DeployError::State(StateError::LockedByOther {
                        holder: existing.holder,
                        since: existing.acquired_at.to_rfc3339(),
                    }));
                }
                _ => {
                    debug!("Expired lock found, taking over");
                    self.delete_object(&key).await?;
                }
            }

            if !self.put_object_if_absent(&key, &content).await? {
                return Err(DeployError::State(StateError::LockFailed {
                    message: String::from("Lock was taken by another run during takeover"),
                }));
            }
        }

        info!(
            "Acquired state lock: {} (expires in {}s)",
            lock_info.lock_id, LOCK_EXPIRY_SECS
        );

        Ok(lock_info)
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        if let Some(existing) = self.read_lock().await? {
            if existing.lock_id == lock_id {
                self.delete_object(&self.key(LOCK_KEY)).await?;
                info!("Released state lock: {lock_id}");
            } else {
                debug!(
                    "Lock ID mismatch: expected {lock_id}, found {}",
                    existing.lock_id
                );
            }
        }

        Ok(())
    }

    async fn refresh_lock(&self, lock_id: &str) -> Result<LockInfo> {
        let mut lock_info = match self.read_lock().await? {
            Some(existing) if existing.lock_id == lock_id => existing,
            _ => return Err(lock_lost(lock_id)),
        };
        lock_info.refresh();
        let content = serde_json::to_string_pretty(&lock_info)
            .map_err(|e| StateError::serialization(format!("Failed to serialize lock: {e}")))?;
        self.put_object(&self.key(LOCK_KEY), &content).await?;

        debug!("Refreshed state lock: {lock_id}");
        Ok(lock_info)
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        self.read_lock().await
    }

    async fn is_locked(&self) -> Result<bool> {
        Ok(self
            .read_lock()
            .await?
            .is_some_and(|lock_info| !lock_info.is_expired()))
    }

    fn backend_type(&self) -> &'static str {
        "s3"
    }
}

fn normalize_prefix(prefix: Option<&str>) -> String {
    match prefix.map(|p| p.trim_matches('/')) {
        Some(p) if !p.is_empty() => format!("{p}/"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_normalization() {
        assert_eq!(normalize_prefix(None), "");
        assert_eq!(normalize_prefix(Some("")), "");
        assert_eq!(normalize_prefix(Some("/")), "");
        assert_eq!(normalize_prefix(Some("team/prod/")), "team/prod/");
        assert_eq!(normalize_prefix(Some("/team")), "team/");
    }
}
