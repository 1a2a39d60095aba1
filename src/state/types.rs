//! Persisted snapshot of applied targets.
//!
//! A snapshot maps every provider name to the hook it was loaded from and
//! the targets that were live after the last successful run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{Result, StateError};
use crate::plugin::{HookRef, ProviderRef};

/// Current version of the snapshot format.
pub const STATE_VERSION: &str = "1";

/// The complete target snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    /// Snapshot format version.
    pub version: String,
    /// When the snapshot was last written.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Applied targets per provider name.
    #[serde(default)]
    pub providers: BTreeMap<String, TargetRecord>,
}

/// Targets applied through one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    /// Hook the provider's plugin is loaded from.
    pub hook: HookRef,
    /// Targets in declaration order.
    #[serde(default)]
    pub targets: Vec<Value>,
}

impl TargetSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            updated_at: None,
            providers: BTreeMap::new(),
        }
    }

    /// Returns the record of a provider.
    #[must_use]
    pub fn record(&self, provider: &str) -> Option<&TargetRecord> {
        self.providers.get(provider)
    }

    /// Appends a target to its provider's record, creating the record if needed.
    pub fn push_target(&mut self, provider: &ProviderRef, target: Value) {
        self.providers
            .entry(provider.name.clone())
            .or_insert_with(|| TargetRecord {
                hook: provider.hook.clone(),
                targets: Vec::new(),
            })
            .targets
            .push(target);
    }

    /// Total number of targets across providers.
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.providers.values().map(|r| r.targets.len()).sum()
    }

    /// Returns true if no targets are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.target_count() == 0
    }

    /// Sets the write timestamp to now.
    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }

    /// Renders the snapshot as pretty-printed JSON with sorted keys.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_pretty_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| StateError::serialization(format!("Failed to serialize state: {e}")).into())
    }

    /// Parses a snapshot and checks its format version.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not a snapshot or has another version.
    pub fn from_json(content: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(content).map_err(|e| StateError::Corrupted {
            message: format!("Failed to parse state: {e}"),
        })?;

        if snapshot.version != STATE_VERSION {
            return Err(StateError::VersionMismatch {
                expected: STATE_VERSION.to_string(),
                found: snapshot.version,
            }
            .into());
        }
        Ok(snapshot)
    }
}

impl Default for TargetSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_groups_by_provider() {
        let web = ProviderRef::new("web", HookRef::new("builtin:file"));
        let dns = ProviderRef::new("dns", HookRef::new("builtin:file:dns"));

        let mut snapshot = TargetSnapshot::new();
        snapshot.push_target(&web, json!({ "name": "a" }));
        snapshot.push_target(&dns, json!({ "name": "b" }));
        snapshot.push_target(&web, json!({ "name": "c" }));

        assert_eq!(snapshot.target_count(), 3);
        let record = snapshot.record("web").expect("web record missing");
        assert_eq!(record.hook, HookRef::new("builtin:file"));
        assert_eq!(record.targets, vec![json!({ "name": "a" }), json!({ "name": "c" })]);
    }

    #[test]
    fn test_json_is_sorted_and_reloadable() {
        let web = ProviderRef::new("web", HookRef::new("builtin:file"));
        let mut snapshot = TargetSnapshot::new();
        snapshot.push_target(&web, json!({ "zeta": 1, "alpha": 2 }));

        let rendered = snapshot.to_pretty_json().expect("render failed");
        let alpha = rendered.find("alpha").expect("alpha missing");
        let zeta = rendered.find("zeta").expect("zeta missing");
        assert!(alpha < zeta);

        assert_eq!(TargetSnapshot::from_json(&rendered).expect("parse failed"), snapshot);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let err = TargetSnapshot::from_json(r#"{"version":"9","providers":{}}"#)
            .expect_err("should reject");
        assert!(err.to_string().contains("version mismatch"));
    }
}
