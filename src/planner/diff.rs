//! Diff engine for comparing a prior record with a declared target.
//!
//! The comparison is structural and pure: objects are compared key by key,
//! arrays index by index, and scalars by exact equality.

use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::btree_map;

/// Engine for computing structural diffs between target values.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiffEngine;

/// A change at one key or index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// The value differs and is compared no further.
    Leaf,
    /// Both sides are composite; the nested set lists what differs.
    Nested(ChangeSet),
}

/// Nested mapping from field name (or array index) to [`Change`].
///
/// Unchanged fields have no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet {
    entries: BTreeMap<String, Change>,
}

/// Result of diffing one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetDiff {
    /// What differs; empty when unchanged.
    pub changes: ChangeSet,
    /// Whether anything differs at all.
    pub changed: bool,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Compares `prior` with `next`.
    ///
    /// A scalar mismatch at the root is reported under the key `$`.
    #[must_use]
    pub fn diff(&self, prior: &Value, next: &Value) -> TargetDiff {
        match compare(prior, next) {
            None => TargetDiff::default(),
            Some(Change::Nested(changes)) => TargetDiff {
                changes,
                changed: true,
            },
            Some(Change::Leaf) => {
                let mut changes = ChangeSet::default();
                changes.insert("$", Change::Leaf);
                TargetDiff {
                    changes,
                    changed: true,
                }
            }
        }
    }
}

fn compare(prior: &Value, next: &Value) -> Option<Change> {
    match (prior, next) {
        (Value::Object(before), Value::Object(after)) => {
            let mut set = ChangeSet::default();
            for (key, old) in before {
                let change = after.get(key).map_or(Some(Change::Leaf), |new| compare(old, new));
                if let Some(change) = change {
                    set.insert(key, change);
                }
            }
            for key in after.keys().filter(|key| !before.contains_key(*key)) {
                set.insert(key, Change::Leaf);
            }
            set.into_change()
        }
        (Value::Array(before), Value::Array(after)) => {
            let mut set = ChangeSet::default();
            for index in 0..before.len().max(after.len()) {
                let change = match (before.get(index), after.get(index)) {
                    (Some(old), Some(new)) => compare(old, new),
                    _ => Some(Change::Leaf),
                };
                if let Some(change) = change {
                    set.insert(&index.to_string(), change);
                }
            }
            set.into_change()
        }
        (old, new) => (old != new).then_some(Change::Leaf),
    }
}

impl ChangeSet {
    fn insert(&mut self, key: &str, change: Change) {
        self.entries.insert(key.to_string(), change);
    }

    fn into_change(self) -> Option<Change> {
        (!self.entries.is_empty()).then_some(Change::Nested(self))
    }

    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of changed fields at this level.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the change recorded for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Change> {
        self.entries.get(key)
    }

    /// Iterates over the changed fields at this level.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Change> {
        self.entries.iter()
    }

    /// Returns the dotted path of every changed leaf, e.g. `spec.ports.0`.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.collect_paths("", &mut paths);
        paths
    }

    fn collect_paths(&self, prefix: &str, paths: &mut Vec<String>) {
        for (key, change) in &self.entries {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            match change {
                Change::Leaf => paths.push(path),
                Change::Nested(inner) => inner.collect_paths(&path, paths),
            }
        }
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = (&'a String, &'a Change);
    type IntoIter = btree_map::Iter<'a, String, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Serialize for Change {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Leaf => serializer.serialize_bool(true),
            Self::Nested(inner) => inner.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn diff(prior: &Value, next: &Value) -> TargetDiff {
        DiffEngine::new().diff(prior, next)
    }

    #[test]
    fn test_equal_values_unchanged() {
        let value = json!({ "name": "x", "size": 1, "tags": ["a", "b"], "net": { "port": 80 } });
        let result = diff(&value, &value.clone());
        assert!(!result.changed);
        assert!(result.changes.is_empty());
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"a":1,"b":{"c":2,"d":3}}"#).expect("invalid json");
        let b: Value = serde_json::from_str(r#"{"b":{"d":3,"c":2},"a":1}"#).expect("invalid json");
        assert!(!diff(&a, &b).changed);
    }

    #[test]
    fn test_single_nested_leaf_change() {
        let prior = json!({ "name": "x", "net": { "port": 80, "host": "a" } });
        let next = json!({ "name": "x", "net": { "port": 81, "host": "a" } });

        let result = diff(&prior, &next);
        assert!(result.changed);
        assert_eq!(result.changes.paths(), vec![String::from("net.port")]);
        assert_eq!(result.changes.len(), 1);
        match result.changes.get("net") {
            Some(Change::Nested(inner)) => assert_eq!(inner.get("port"), Some(&Change::Leaf)),
            other => panic!("unexpected change: {other:?}"),
        }
    }

    #[test]
    fn test_keys_on_one_side_are_changes() {
        let prior = json!({ "name": "x", "old": true });
        let next = json!({ "name": "x", "new": true });
        assert_eq!(
            diff(&prior, &next).changes.paths(),
            vec![String::from("new"), String::from("old")]
        );
    }

    #[test]
    fn test_arrays_compared_by_index() {
        let prior = json!({ "ports": [80, { "p": 1 }] });
        let next = json!({ "ports": [80, { "p": 2 }, 443] });
        assert_eq!(
            diff(&prior, &next).changes.paths(),
            vec![String::from("ports.1.p"), String::from("ports.2")]
        );
    }

    #[test]
    fn test_no_type_coercion() {
        assert!(diff(&json!({ "size": 1 }), &json!({ "size": "1" })).changed);
        assert!(diff(&json!({ "on": true }), &json!({ "on": 1 })).changed);
        assert!(diff(&json!({ "v": null }), &json!({})).changed);
    }

    #[test]
    fn test_composite_replaced_by_scalar() {
        let result = diff(&json!({ "net": { "port": 80 } }), &json!({ "net": 80 }));
        assert_eq!(result.changes.get("net"), Some(&Change::Leaf));
    }

    #[test]
    fn test_root_scalar_mismatch() {
        let result = diff(&json!(1), &json!(2));
        assert!(result.changed);
        assert_eq!(result.changes.paths(), vec![String::from("$")]);
    }

    #[test]
    fn test_change_set_serializes_as_nested_flags() {
        let result = diff(&json!({ "a": { "b": 1 }, "c": 1 }), &json!({ "a": { "b": 2 }, "c": 2 }));
        let rendered = serde_json::to_value(&result.changes).expect("serialize failed");
        assert_eq!(rendered, json!({ "a": { "b": true }, "c": true }));
    }

    #[test]
    fn test_diff_is_pure() {
        let prior = json!({ "a": [1, 2, { "b": "c" }] });
        let next = json!({ "a": [1, 3] });
        assert_eq!(diff(&prior, &next), diff(&prior, &next));
    }
}
