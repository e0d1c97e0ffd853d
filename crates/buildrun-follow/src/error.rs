//! Errors surfaced by the follow pipeline and the canceller.

use thiserror::Error;

use buildrun_client::ClientError;
use buildrun_core::{CoreError, ResourceKind, RunName, TaskName, UnitName};

/// Errors that end a follow or cancel invocation.
///
/// Every variant names the resource it concerns so messages can be shown
/// to the operator verbatim.
#[derive(Debug, Error)]
pub enum FollowError {
    /// The resource does not exist.
    #[error("{kind} {name} not found")]
    NotFound { kind: ResourceKind, name: String },

    /// The surrounding context was cancelled (interrupt or deadline).
    #[error("cancelled while {0}")]
    Cancelled(String),

    /// The event subscription ended before the awaited state was observed.
    #[error("watch on {kind} {name} closed before the expected state was observed")]
    WatchClosedUnexpectedly { kind: ResourceKind, name: String },

    /// The resource was deleted while being followed.
    #[error("{kind} {name} was deleted before it terminated")]
    DeletedBeforeTermination { kind: ResourceKind, name: String },

    /// The run finished without ever producing a task.
    #[error(
        "build run {name} terminated before task run ref was set{}, inspect build run status for details",
        outcome_suffix(.reason)
    )]
    TerminatedWithoutTaskRef {
        name: RunName,
        /// Reason and message of the terminal condition, when reported.
        reason: Option<String>,
    },

    /// The task finished without ever being scheduled on a unit.
    #[error(
        "task run {name} terminated before pod name was set{}, inspect task run status for details",
        outcome_suffix(.reason)
    )]
    TerminatedWithoutUnitRef {
        name: TaskName,
        reason: Option<String>,
    },

    /// Cancellation requested for a run that already finished.
    #[error("failed to cancel BuildRun {0}: execution has already finished")]
    AlreadyFinished(RunName),

    /// The cancellation patch lost a write race.
    #[error("failed to cancel BuildRun {name}: {message}")]
    PatchConflict { name: RunName, message: String },

    /// The unit stayed not-ready for the whole attach budget.
    #[error("pod {unit} did not become ready for log streaming after {attempts} attempts")]
    AttachRetriesExhausted { unit: UnitName, attempts: u32 },

    /// Any other API or transport failure.
    #[error("{context}: {source}")]
    Client {
        context: String,
        #[source]
        source: ClientError,
    },

    /// An observed object could not be decoded.
    #[error("invalid {kind} {name}: {message}")]
    Decode {
        kind: ResourceKind,
        name: String,
        message: String,
    },

    /// Invalid request input.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Writing to the output sink failed.
    #[error("failed to write build output: {0}")]
    Io(#[from] std::io::Error),
}

fn outcome_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(" ({})", r))
        .unwrap_or_default()
}

impl FollowError {
    /// Wrap a client error, promoting "not found" to [`FollowError::NotFound`].
    pub(crate) fn from_client(kind: ResourceKind, name: &str, source: ClientError) -> Self {
        match source {
            ClientError::NotFound(_) => Self::NotFound {
                kind,
                name: name.to_string(),
            },
            ClientError::Serialization(message) => Self::Decode {
                kind,
                name: name.to_string(),
                message,
            },
            source => Self::Client {
                context: format!("{} {}", kind, name),
                source,
            },
        }
    }
}
