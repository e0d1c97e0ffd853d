//! Run and task trackers.
//!
//! Both trackers wait on one watch until the followed object exposes the
//! name of the next object in the chain (run → task → unit), or until it is
//! deleted or finishes without ever doing so. There are no retries here:
//! a deleted or finished-without-progress object is a final outcome.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use buildrun_client::ResourceApi;
use buildrun_core::{Condition, Resource, Run, RunName, Task, TaskName, UnitName};

use crate::error::FollowError;
use crate::watch::wait_for;

/// A resource that eventually references the next object of the chain.
pub trait Trackable: Resource {
    /// Typed name of the referenced object.
    type Ref: std::fmt::Debug + Clone + Send;

    /// The reference, once set. Never cleared afterwards.
    fn dependent_ref(&self) -> Option<Self::Ref>;

    /// Returns true once the object has finished one way or another.
    fn is_finished(&self) -> bool;

    /// Error for an object that finished without setting the reference.
    fn terminated_without_ref(&self) -> FollowError;
}

impl Trackable for Run {
    type Ref = TaskName;

    fn dependent_ref(&self) -> Option<TaskName> {
        self.task_ref()
    }

    fn is_finished(&self) -> bool {
        Run::is_finished(self)
    }

    fn terminated_without_ref(&self) -> FollowError {
        FollowError::TerminatedWithoutTaskRef {
            name: self.run_name(),
            reason: self.succeeded_condition().and_then(Condition::summary),
        }
    }
}

impl Trackable for Task {
    type Ref = UnitName;

    fn dependent_ref(&self) -> Option<UnitName> {
        self.unit_ref()
    }

    fn is_finished(&self) -> bool {
        Task::is_finished(self)
    }

    fn terminated_without_ref(&self) -> FollowError {
        FollowError::TerminatedWithoutUnitRef {
            name: self.task_name(),
            reason: self.succeeded_condition().and_then(Condition::summary),
        }
    }
}

/// An object together with the reference it was tracked for.
#[derive(Debug, Clone)]
pub struct Tracked<T: Trackable> {
    /// State of the object when the wait ended.
    pub object: T,
    /// Name of the next object in the chain.
    pub reference: T::Ref,
}

/// Wait for `name` to reference its dependent object.
pub async fn track<T: Trackable>(
    api: &dyn ResourceApi,
    namespace: &str,
    name: &str,
    cancel: &CancellationToken,
) -> Result<Tracked<T>, FollowError> {
    let event = wait_for::<T, _>(
        api,
        namespace,
        name,
        |event| {
            let object = event.object();
            event.is_deleted()
                || object.deletion_requested()
                || object.dependent_ref().is_some()
                || object.is_finished()
        },
        cancel,
    )
    .await?;

    let deleted = event.is_deleted();
    let object = event.into_object();

    // A deleted object is never followed, even if it carries a reference.
    if deleted || object.deletion_requested() {
        return Err(FollowError::DeletedBeforeTermination {
            kind: T::KIND,
            name: name.to_string(),
        });
    }

    match object.dependent_ref() {
        Some(reference) => Ok(Tracked { object, reference }),
        None => {
            debug!(kind = %T::KIND, name = %name, "Finished without reference");
            Err(object.terminated_without_ref())
        }
    }
}

/// Run tracker: wait until the run references its task.
pub async fn wait_for_task(
    api: &dyn ResourceApi,
    namespace: &str,
    run: &RunName,
    cancel: &CancellationToken,
) -> Result<Tracked<Run>, FollowError> {
    let tracked = track::<Run>(api, namespace, run.as_str(), cancel).await?;
    info!(run = %run, task = %tracked.reference, "BuildRun references TaskRun");
    Ok(tracked)
}

/// Task tracker: wait until the task references its execution unit.
pub async fn wait_for_unit(
    api: &dyn ResourceApi,
    namespace: &str,
    task: &TaskName,
    cancel: &CancellationToken,
) -> Result<Tracked<Task>, FollowError> {
    let tracked = track::<Task>(api, namespace, task.as_str(), cancel).await?;
    info!(task = %task, pod = %tracked.reference, "TaskRun scheduled on pod");
    Ok(tracked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildrun_core::{ConditionStatus, ResourceKind, WatchEvent};

    use crate::fake::FakeApi;

    #[tokio::test]
    async fn test_run_returns_event_that_set_task_ref() {
        let api = FakeApi::new().with_watch(
            ResourceKind::BuildRun,
            "demo-xyz",
            vec![
                WatchEvent::Updated(Run::new("demo-xyz")),
                WatchEvent::Updated(Run::new("demo-xyz").with_condition(ConditionStatus::Unknown)),
                WatchEvent::Updated(
                    Run::new("demo-xyz")
                        .with_condition(ConditionStatus::Unknown)
                        .with_task_ref("demo-xyz-task"),
                ),
                // Later refresh that must not be returned.
                WatchEvent::Updated(
                    Run::new("demo-xyz")
                        .with_condition(ConditionStatus::True)
                        .with_task_ref("demo-xyz-task"),
                ),
            ],
            true,
        );

        let tracked = wait_for_task(
            &api,
            "default",
            &RunName::new("demo-xyz"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(tracked.reference, TaskName::new("demo-xyz-task"));
        assert_eq!(tracked.object.terminal_condition(), Some(ConditionStatus::Unknown));
    }

    #[tokio::test]
    async fn test_run_terminated_without_task_ref() {
        let mut failed = Run::new("demo-xyz");
        failed.status.conditions = vec![Condition::succeeded(ConditionStatus::False)
            .with_reason("BuildNotFound")
            .with_message("build.shipwright.io \"demo\" not found")];

        let api = FakeApi::new().with_watch(
            ResourceKind::BuildRun,
            "demo-xyz",
            vec![
                WatchEvent::Updated(Run::new("demo-xyz")),
                WatchEvent::Updated(failed),
            ],
            true,
        );

        let err = wait_for_task(
            &api,
            "default",
            &RunName::new("demo-xyz"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        match &err {
            FollowError::TerminatedWithoutTaskRef { name, reason } => {
                assert_eq!(name.as_str(), "demo-xyz");
                assert_eq!(
                    reason.as_deref(),
                    Some("BuildNotFound: build.shipwright.io \"demo\" not found")
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("(BuildNotFound: "));
    }

    #[tokio::test]
    async fn test_run_deleted_before_termination() {
        let api = FakeApi::new().with_watch(
            ResourceKind::BuildRun,
            "demo-xyz",
            vec![
                WatchEvent::Updated(Run::new("demo-xyz")),
                WatchEvent::Deleted(Run::new("demo-xyz")),
            ],
            false,
        );

        let err = wait_for_task(
            &api,
            "default",
            &RunName::new("demo-xyz"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            FollowError::DeletedBeforeTermination { kind: ResourceKind::BuildRun, .. }
        ));
    }

    #[tokio::test]
    async fn test_deletion_wins_over_reference() {
        let api = FakeApi::new().with_watch(
            ResourceKind::BuildRun,
            "demo-xyz",
            vec![WatchEvent::Updated(
                Run::new("demo-xyz")
                    .with_task_ref("demo-xyz-task")
                    .with_deletion_requested(),
            )],
            true,
        );

        let err = wait_for_task(
            &api,
            "default",
            &RunName::new("demo-xyz"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FollowError::DeletedBeforeTermination { .. }));
    }

    #[tokio::test]
    async fn test_task_exposes_unit() {
        let api = FakeApi::new().with_watch(
            ResourceKind::TaskRun,
            "demo-xyz-task",
            vec![
                WatchEvent::Updated(Task::new("demo-xyz-task")),
                WatchEvent::Updated(Task::new("demo-xyz-task").with_unit_ref("pod-1")),
            ],
            true,
        );

        let tracked = wait_for_unit(
            &api,
            "default",
            &TaskName::new("demo-xyz-task"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(tracked.reference, UnitName::new("pod-1"));
    }

    #[tokio::test]
    async fn test_task_terminated_without_unit() {
        let api = FakeApi::new().with_watch(
            ResourceKind::TaskRun,
            "demo-xyz-task",
            vec![WatchEvent::Updated(
                Task::new("demo-xyz-task").with_condition(ConditionStatus::False),
            )],
            true,
        );

        let err = wait_for_unit(
            &api,
            "default",
            &TaskName::new("demo-xyz-task"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            FollowError::TerminatedWithoutUnitRef { ref name, reason: None } if name.as_str() == "demo-xyz-task"
        ));
    }

    #[tokio::test]
    async fn test_task_deletion_requested_wins_over_unit_ref() {
        let api = FakeApi::new().with_watch(
            ResourceKind::TaskRun,
            "demo-xyz-task",
            vec![
                WatchEvent::Updated(Task::new("demo-xyz-task")),
                WatchEvent::Updated(
                    Task::new("demo-xyz-task")
                        .with_condition(ConditionStatus::Unknown)
                        .with_unit_ref("pod-1")
                        .with_deletion_requested(),
                ),
            ],
            true,
        );

        let err = wait_for_unit(
            &api,
            "default",
            &TaskName::new("demo-xyz-task"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            FollowError::DeletedBeforeTermination { kind: ResourceKind::TaskRun, ref name } if name == "demo-xyz-task"
        ));
        assert_eq!(api.get_count(ResourceKind::Pod), 0);
    }

    #[tokio::test]
    async fn test_task_deleted() {
        let api = FakeApi::new().with_watch(
            ResourceKind::TaskRun,
            "demo-xyz-task",
            vec![WatchEvent::Deleted(Task::new("demo-xyz-task"))],
            false,
        );

        let err = wait_for_unit(
            &api,
            "default",
            &TaskName::new("demo-xyz-task"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            FollowError::DeletedBeforeTermination { kind: ResourceKind::TaskRun, .. }
        ));
    }
}
