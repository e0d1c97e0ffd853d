//! Predicate-driven wait over a single resource's watch.
//!
//! [`wait_for`] opens one subscription, feeds every event (deletion
//! included) to the caller's predicate in arrival order and returns the
//! first event it accepts. The subscription is pumped by a producer task
//! into a bounded queue; the consumer selects on that queue and the
//! cancellation token, so an interrupt unblocks the wait immediately.
//!
//! There is no built-in deadline: without cancellation a wait may block for
//! as long as the followed build takes.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use buildrun_client::{decode, ClientError, ResourceApi, WatchStream};
use buildrun_core::{Resource, WatchEvent};

use crate::error::FollowError;

/// Events buffered between the subscription and the predicate loop.
const EVENT_QUEUE_CAPACITY: usize = 16;

type RawEvent = Result<WatchEvent<Value>, ClientError>;

/// Wait until `predicate` accepts an event of the named resource.
///
/// Returns the first accepted event, never a later one. Fails with
/// [`FollowError::WatchClosedUnexpectedly`] when the subscription ends
/// first and [`FollowError::Cancelled`] when `cancel` fires first. The
/// subscription is released on every exit path.
pub async fn wait_for<T, P>(
    api: &dyn ResourceApi,
    namespace: &str,
    name: &str,
    predicate: P,
    cancel: &CancellationToken,
) -> Result<WatchEvent<T>, FollowError>
where
    T: Resource,
    P: FnMut(&WatchEvent<T>) -> bool,
{
    let kind = T::KIND;
    debug!(kind = %kind, namespace = %namespace, name = %name, "Opening watch");

    let stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(FollowError::Cancelled(format!("waiting for {} {}", kind, name)));
        }
        stream = api.watch(kind, namespace, name) => {
            stream.map_err(|e| FollowError::from_client(kind, name, e))?
        }
    };

    let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let subscription = Subscription::spawn(stream, tx);

    let result = consume(rx, name, predicate, cancel).await;
    subscription.release().await;

    debug!(kind = %kind, name = %name, ok = result.is_ok(), "Watch released");
    result
}

async fn consume<T, P>(
    mut rx: mpsc::Receiver<RawEvent>,
    name: &str,
    mut predicate: P,
    cancel: &CancellationToken,
) -> Result<WatchEvent<T>, FollowError>
where
    T: Resource,
    P: FnMut(&WatchEvent<T>) -> bool,
{
    let kind = T::KIND;
    let mut seen = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(FollowError::Cancelled(format!("waiting for {} {}", kind, name)));
            }
            next = rx.recv() => next,
        };

        let Some(raw) = next else {
            return Err(FollowError::WatchClosedUnexpectedly {
                kind,
                name: name.to_string(),
            });
        };

        let event = raw
            .map_err(|e| FollowError::from_client(kind, name, e))?
            .try_map(decode::<T>)
            .map_err(|e| FollowError::from_client(kind, name, e))?;

        seen += 1;
        trace!(kind = %kind, name = %name, seen, deleted = event.is_deleted(), "Watch event");

        if predicate(&event) {
            debug!(kind = %kind, name = %name, seen, "Watch predicate satisfied");
            return Ok(event);
        }
    }
}

/// Producer half of a watch: pumps the subscription into the queue.
///
/// Dropping it aborts the producer, which drops the subscription.
struct Subscription {
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    fn spawn(mut stream: WatchStream, tx: mpsc::Sender<RawEvent>) -> Self {
        let handle = tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Self {
            handle: Some(handle),
        }
    }

    /// Abort the producer and wait until the subscription is dropped.
    async fn release(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use buildrun_core::{ResourceKind, Run};
    use serde_json::json;

    use crate::fake::FakeApi;

    fn marked(task_ref: Option<&str>, marker: &str) -> Run {
        let run = Run::new(format!("demo-xyz-{}", marker));
        match task_ref {
            Some(r) => run.with_task_ref(r),
            None => run,
        }
    }

    #[tokio::test]
    async fn test_returns_first_satisfying_event() {
        let api = FakeApi::new().with_raw_watch(
            ResourceKind::BuildRun,
            "demo-xyz",
            vec![
                WatchEvent::Updated(serde_json::to_value(marked(None, "1")).unwrap()),
                WatchEvent::Updated(serde_json::to_value(marked(Some("task-a"), "2")).unwrap()),
                WatchEvent::Updated(serde_json::to_value(marked(Some("task-b"), "3")).unwrap()),
                // Undecodable; must never be looked at.
                WatchEvent::Updated(json!({ "metadata": 42 })),
            ],
            false,
        );

        let event = wait_for::<Run, _>(
            &api,
            "default",
            "demo-xyz",
            |e| e.object().task_ref().is_some(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(event.object().name(), "demo-xyz-2");
        assert_eq!(event.object().task_ref().unwrap().as_str(), "task-a");
        assert_eq!(api.released_watches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_open_watch_released_once_satisfied() {
        let api = FakeApi::new().with_watch(
            ResourceKind::BuildRun,
            "demo-xyz",
            vec![
                WatchEvent::Updated(Run::new("demo-xyz")),
                WatchEvent::Updated(Run::new("demo-xyz").with_task_ref("demo-xyz-task")),
            ],
            true,
        );

        let event = wait_for::<Run, _>(
            &api,
            "default",
            "demo-xyz",
            |e| e.object().task_ref().is_some(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(event.object().task_ref().unwrap().as_str(), "demo-xyz-task");
        // The stream never ends on its own; only the release drops it.
        assert_eq!(api.released_watches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deletion_is_visible_to_predicate() {
        let in_progress = Run::new("demo-xyz").with_condition(buildrun_core::ConditionStatus::Unknown);
        let api = FakeApi::new().with_watch(
            ResourceKind::BuildRun,
            "demo-xyz",
            vec![
                WatchEvent::Updated(in_progress.clone()),
                WatchEvent::Deleted(in_progress),
            ],
            true,
        );

        let mut evaluated = Vec::new();
        let event = wait_for::<Run, _>(
            &api,
            "default",
            "demo-xyz",
            |e| {
                evaluated.push(e.is_deleted());
                e.is_deleted()
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(event.is_deleted());
        assert!(!event.object().is_finished());
        assert_eq!(evaluated, vec![false, true]);
    }

    #[tokio::test]
    async fn test_closed_watch_fails() {
        let api = FakeApi::new().with_watch(
            ResourceKind::BuildRun,
            "demo-xyz",
            vec![WatchEvent::Updated(Run::new("demo-xyz"))],
            false,
        );

        let err = wait_for::<Run, _>(&api, "default", "demo-xyz", |_| false, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, FollowError::WatchClosedUnexpectedly { kind: ResourceKind::BuildRun, .. }));
        assert_eq!(api.released_watches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_unblocks_and_releases() {
        let api = FakeApi::new().with_watch(
            ResourceKind::BuildRun,
            "demo-xyz",
            vec![WatchEvent::Updated(Run::new("demo-xyz"))],
            true,
        );

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = wait_for::<Run, _>(&api, "default", "demo-xyz", |_| false, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, FollowError::Cancelled(_)));
        assert_eq!(api.released_watches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_resource() {
        let api = FakeApi::new();
        let err = wait_for::<Run, _>(&api, "default", "nope", |_| true, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FollowError::NotFound { .. }));
    }
}
