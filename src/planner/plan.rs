//! Action journal types.
//!
//! Every spawn, update and kill decided during a run is recorded as a
//! [`PlannedAction`], in the order it was (or, for dry runs, would have
//! been) executed.

use serde::Serialize;
use std::fmt;

use crate::plugin::HookAction;
use crate::target::TargetIdentity;

/// A single action decided by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedAction {
    /// Action type.
    pub kind: ActionKind,
    /// Provider name.
    pub provider: String,
    /// Identity of the target acted on.
    pub identity: TargetIdentity,
    /// Declaration index; `None` for kills of undeclared targets.
    pub index: Option<u64>,
    /// Dotted paths of changed fields, for updates.
    pub changes: Vec<String>,
}

/// Types of actions in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Create a new resource.
    Spawn,
    /// Change an existing resource.
    Update,
    /// Destroy a resource no longer declared.
    Kill,
}

/// Non-fatal conditions noticed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunWarning {
    /// An action succeeded but its plugin returned no revert.
    NoRevert {
        /// Provider name.
        provider: String,
        /// Hook that returned no revert.
        action: HookAction,
        /// Identity of the target.
        identity: TargetIdentity,
    },
    /// Two declarations of one provider share an identity.
    DuplicateIdentity {
        /// Provider name.
        provider: String,
        /// The repeated identity.
        identity: TargetIdentity,
        /// Declaration index of the repeat.
        index: u64,
    },
}

impl PlannedAction {
    /// Creates a spawn action.
    #[must_use]
    pub fn spawn(provider: &str, identity: &TargetIdentity, index: u64) -> Self {
        Self {
            kind: ActionKind::Spawn,
            provider: provider.to_string(),
            identity: identity.clone(),
            index: Some(index),
            changes: vec![],
        }
    }

    /// Creates an update action.
    #[must_use]
    pub fn update(
        provider: &str,
        identity: &TargetIdentity,
        index: u64,
        changes: Vec<String>,
    ) -> Self {
        Self {
            kind: ActionKind::Update,
            provider: provider.to_string(),
            identity: identity.clone(),
            index: Some(index),
            changes,
        }
    }

    /// Creates a kill action.
    #[must_use]
    pub fn kill(provider: &str, identity: &TargetIdentity) -> Self {
        Self {
            kind: ActionKind::Kill,
            provider: provider.to_string(),
            identity: identity.clone(),
            index: None,
            changes: vec![],
        }
    }

    /// Returns a human-readable description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        let target = self.identity.short();
        match self.kind {
            ActionKind::Spawn => format!("Spawn {target} on '{}'", self.provider),
            ActionKind::Update => format!(
                "Update {target} on '{}' ({})",
                self.provider,
                self.changes.join(", ")
            ),
            ActionKind::Kill => format!("Kill {target} on '{}'", self.provider),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Spawn => "spawn",
            Self::Update => "update",
            Self::Kill => "kill",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.provider, self.identity.short())?;
        if !self.changes.is_empty() {
            write!(f, " [{}]", self.changes.join(", "))?;
        }
        Ok(())
    }
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRevert {
                provider,
                action,
                identity,
            } => write!(
                f,
                "{action} of {} on '{provider}' returned no revert; it cannot be rolled back",
                identity.short()
            ),
            Self::DuplicateIdentity {
                provider,
                identity,
                index,
            } => write!(
                f,
                "declaration #{index} repeats identity {} on '{provider}'",
                identity.short()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_display() {
        let identity = TargetIdentity::of(&json!({ "name": "web" }));
        let action = PlannedAction::update("sites", &identity, 0, vec![String::from("size")]);
        let rendered = action.to_string();
        assert!(rendered.starts_with("update sites/"));
        assert!(rendered.ends_with("[size]"));
        assert_eq!(PlannedAction::kill("sites", &identity).index, None);
    }

    #[test]
    fn test_warning_serializes_with_kind_tag() {
        let warning = RunWarning::NoRevert {
            provider: String::from("dns"),
            action: HookAction::Spawn,
            identity: TargetIdentity::of(&json!({ "name": "a" })),
        };
        let value = serde_json::to_value(&warning).expect("serialize failed");
        assert_eq!(value["kind"], "no_revert");
        assert_eq!(value["action"], "spawn");
    }
}
