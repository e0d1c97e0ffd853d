//! Run canceller.

use tracing::{debug, info};

use buildrun_client::{get_typed, ClientError, ResourceApi};
use buildrun_core::{JsonPatch, ResourceKind, Run, RunName};

use crate::error::FollowError;

/// Request cancellation of a run that has not finished yet.
///
/// A finished run is rejected without touching it. Otherwise a single
/// state-transition patch is issued; reapplying it is a no-op, and success
/// only means the request was accepted, not that the run has stopped.
pub async fn cancel_run(
    api: &dyn ResourceApi,
    namespace: &str,
    run: &RunName,
) -> Result<RunName, FollowError> {
    let current: Run = get_typed(api, namespace, run.as_str())
        .await
        .map_err(|e| FollowError::from_client(ResourceKind::BuildRun, run.as_str(), e))?;

    if current.is_finished() {
        debug!(run = %run, condition = ?current.terminal_condition(), "Run already finished");
        return Err(FollowError::AlreadyFinished(run.clone()));
    }

    let patch = JsonPatch::cancel_run();
    api.patch(ResourceKind::BuildRun, namespace, run.as_str(), &patch)
        .await
        .map_err(|e| match e {
            ClientError::Conflict(message) => FollowError::PatchConflict {
                name: run.clone(),
                message,
            },
            other => FollowError::from_client(ResourceKind::BuildRun, run.as_str(), other),
        })?;

    info!(run = %run, "Cancellation requested");
    Ok(run.clone())
}
