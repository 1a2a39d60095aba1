//! Declared targets and their identities.
//!
//! A target is an opaque JSON record owned by its provider. The engine only
//! derives an identity from it: a deterministic hash of the fields the
//! provider's `identify` hook selects, used to match a declaration against
//! the record applied by a previous run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::plugin::ProviderRef;

/// Stable identity of a target within its provider.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetIdentity(String);

impl TargetIdentity {
    /// Computes the identity of a set of identity fields.
    ///
    /// Object keys are hashed in sorted order, so key order in the input
    /// never changes the result.
    #[must_use]
    pub fn of(fields: &Value) -> Self {
        let mut canonical = String::new();
        write_canonical(fields, &mut canonical);

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Returns the full hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first 8 characters, for display.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for TargetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A declared target paired with what the engine derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTarget {
    /// Provider the target was declared for.
    pub provider: ProviderRef,
    /// Declaration index.
    pub index: u64,
    /// Identity computed from the provider's `identify` projection.
    pub identity: TargetIdentity,
    /// Target value after `pull` was merged in.
    pub target: Value,
}

impl ResolvedTarget {
    /// Creates a resolved target.
    #[must_use]
    pub const fn new(
        provider: ProviderRef,
        index: u64,
        identity: TargetIdentity,
        target: Value,
    ) -> Self {
        Self {
            provider,
            index,
            identity,
            target,
        }
    }
}

/// Overwrites fields of `target` with the fields of `pulled`.
///
/// Non-object values replace the target entirely.
pub fn merge_pulled(target: &mut Value, pulled: Value) {
    match (target, pulled) {
        (Value::Object(fields), Value::Object(update)) => {
            for (key, value) in update {
                fields.insert(key, value);
            }
        }
        (target, pulled) => *target = pulled,
    }
}

/// Serializes a value as JSON with object keys sorted at every level.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(inner) = map.get(key) {
                    write_canonical(inner, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
