//! Condition and phase enums for runs, tasks and execution units.

use serde::{Deserialize, Serialize};

/// Condition type the controller uses to report the outcome of runs and tasks.
pub const SUCCEEDED_CONDITION: &str = "Succeeded";

/// Status of a condition.
///
/// Transitions only forward: absent → `Unknown` → `True` | `False`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    /// Still in progress.
    Unknown,
    /// Finished successfully.
    True,
    /// Finished with a failure (including cancellation and validation errors).
    False,
}

impl ConditionStatus {
    /// Returns true once the condition has settled on an outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::True | Self::False)
    }
}

/// A status condition as reported by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, e.g. "Succeeded".
    #[serde(rename = "type")]
    pub kind: String,

    /// Current status.
    pub status: ConditionStatus,

    /// Machine-readable reason for the last transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    /// Create a "Succeeded" condition with the given status.
    pub fn succeeded(status: ConditionStatus) -> Self {
        Self {
            kind: SUCCEEDED_CONDITION.to_string(),
            status,
            reason: None,
            message: None,
        }
    }

    /// Builder method to set the reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Builder method to set the message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// "reason: message" for operator output, whichever parts are set.
    pub fn summary(&self) -> Option<String> {
        let reason = self.reason.as_deref().filter(|r| !r.is_empty());
        let message = self.message.as_deref().filter(|m| !m.is_empty());
        match (reason, message) {
            (Some(r), Some(m)) => Some(format!("{}: {}", r, m)),
            (Some(part), None) | (None, Some(part)) => Some(part.to_string()),
            (None, None) => None,
        }
    }
}

/// Finds the "Succeeded" condition in a condition list.
pub(crate) fn succeeded(conditions: &[Condition]) -> Option<&Condition> {
    conditions.iter().find(|c| c.kind == SUCCEEDED_CONDITION)
}

/// Lifecycle phase of an execution unit (pod).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitPhase {
    /// Accepted but containers are not running yet.
    #[default]
    Pending,
    /// At least one container is running.
    Running,
    /// All containers exited successfully.
    Succeeded,
    /// At least one container failed.
    Failed,
    /// Any phase this client does not know about.
    #[serde(other)]
    Unknown,
}

impl UnitPhase {
    /// Map the platform phase onto output readiness.
    pub fn readiness(&self) -> Readiness {
        match self {
            Self::Pending | Self::Unknown => Readiness::Pending,
            Self::Running => Readiness::Running,
            Self::Succeeded | Self::Failed => Readiness::Terminated,
        }
    }
}

/// Whether an execution unit can produce output yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Readiness {
    /// Output not available yet (environment still being prepared).
    Pending,
    /// Producing output.
    Running,
    /// Finished; output remains readable.
    Terminated,
}
