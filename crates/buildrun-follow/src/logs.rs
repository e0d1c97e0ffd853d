//! Log attacher: follow an execution unit's output into a sink.
//!
//! Attaching happens in two phases:
//! - a readiness gate with a bounded, fixed-delay retry while the unit is
//!   still pending (its environment is being prepared);
//! - a copy loop that forwards bytes verbatim until the stream closes or the
//!   invocation is cancelled.
//!
//! Delivery is best effort. A transport failure while copying is reported
//! in [`AttachOutcome::interrupted`] and never fails the invocation. Once a
//! stream has opened there are no further retries.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use buildrun_client::{get_typed, ClientError, LogStream, ResourceApi};
use buildrun_core::{ExecutionUnit, Readiness, ResourceKind, UnitName};

use crate::error::FollowError;

/// Attach attempts made before giving up on a pod that is not ready.
pub const DEFAULT_ATTACH_ATTEMPTS: u32 = 10;

/// Seconds between attach attempts.
pub const DEFAULT_ATTACH_DELAY_SECS: u64 = 3;

/// Readiness retry policy for attaching to a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachPolicy {
    /// Attempts before giving up, the first one included.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for AttachPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_ATTACH_ATTEMPTS,
            retry_delay: Duration::from_secs(DEFAULT_ATTACH_DELAY_SECS),
        }
    }
}

/// What happened while following a unit's output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachOutcome {
    /// Not-ready attempts before the stream opened.
    pub retries: u32,
    /// Bytes written to the sink.
    pub bytes_copied: u64,
    /// Set when the stream broke before closing normally.
    pub interrupted: Option<String>,
}

/// How one copy loop ended.
enum CopyEnd {
    Closed,
    Interrupted(String),
}

/// Attach to `unit` and copy its output to `sink`.
pub async fn attach<W>(
    api: &dyn ResourceApi,
    namespace: &str,
    unit: &UnitName,
    sink: &mut W,
    policy: &AttachPolicy,
    cancel: &CancellationToken,
) -> Result<AttachOutcome, FollowError>
where
    W: AsyncWrite + Unpin + Send,
{
    let (opened, retries) = open_when_ready(api, namespace, unit, policy, cancel).await?;
    let mut outcome = AttachOutcome {
        retries,
        ..AttachOutcome::default()
    };

    let mut containers = opened.remaining.into_iter();
    let mut stream = opened.stream;
    let mut source = opened.container;

    loop {
        info!(pod = %unit, container = ?source, "Streaming output");

        match copy_stream(stream, sink, &mut outcome.bytes_copied, unit, cancel).await? {
            CopyEnd::Closed => debug!(pod = %unit, container = ?source, "Output stream closed"),
            CopyEnd::Interrupted(reason) => {
                warn!(pod = %unit, container = ?source, reason = %reason, "Output stream interrupted");
                outcome.interrupted = Some(reason);
                return Ok(outcome);
            }
        }

        let Some(next) = containers.next() else {
            return Ok(outcome);
        };

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(FollowError::Cancelled(format!("opening output of pod {}", unit)));
            }
            opened = api.open_log(namespace, unit.as_str(), Some(&next)) => opened,
        };

        stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                warn!(pod = %unit, container = %next, error = %e, "Could not open next output source");
                outcome.interrupted = Some(e.to_string());
                return Ok(outcome);
            }
        };
        source = Some(next);
    }
}

/// First successfully opened output source of a unit.
struct Opened {
    stream: LogStream,
    container: Option<String>,
    remaining: Vec<String>,
}

async fn open_when_ready(
    api: &dyn ResourceApi,
    namespace: &str,
    unit: &UnitName,
    policy: &AttachPolicy,
    cancel: &CancellationToken,
) -> Result<(Opened, u32), FollowError> {
    let cancelled = || FollowError::Cancelled(format!("attaching to pod {}", unit));
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            opened = try_open(api, namespace, unit) => opened?,
        };

        if let Some(opened) = opened {
            return Ok((opened, attempt - 1));
        }

        if attempt >= policy.max_attempts.max(1) {
            return Err(FollowError::AttachRetriesExhausted {
                unit: unit.clone(),
                attempts: attempt,
            });
        }

        debug!(
            pod = %unit,
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = policy.retry_delay.as_millis() as u64,
            "Pod not ready for log streaming, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = tokio::time::sleep(policy.retry_delay) => {}
        }
    }
}

/// One attach attempt; `None` while the unit is not ready yet.
async fn try_open(
    api: &dyn ResourceApi,
    namespace: &str,
    unit: &UnitName,
) -> Result<Option<Opened>, FollowError> {
    let state: ExecutionUnit = match get_typed(api, namespace, unit.as_str()).await {
        Ok(state) => state,
        // The reference can be visible before the unit itself.
        Err(ClientError::NotFound(_)) => return Ok(None),
        Err(e) => return Err(FollowError::from_client(ResourceKind::Pod, unit.as_str(), e)),
    };

    if state.status.phase.readiness() == Readiness::Pending {
        return Ok(None);
    }

    let mut containers: Vec<String> = state.container_names().map(str::to_string).collect();
    let container = if containers.is_empty() {
        None
    } else {
        Some(containers.remove(0))
    };

    match api.open_log(namespace, unit.as_str(), container.as_deref()).await {
        Ok(stream) => Ok(Some(Opened {
            stream,
            container,
            remaining: containers,
        })),
        Err(ClientError::NotReady(reason)) => {
            debug!(pod = %unit, reason = %reason, "Log endpoint not ready");
            Ok(None)
        }
        Err(e) => Err(FollowError::from_client(ResourceKind::Pod, unit.as_str(), e)),
    }
}

async fn copy_stream<W>(
    mut stream: LogStream,
    sink: &mut W,
    copied: &mut u64,
    unit: &UnitName,
    cancel: &CancellationToken,
) -> Result<CopyEnd, FollowError>
where
    W: AsyncWrite + Unpin + Send,
{
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(FollowError::Cancelled(format!("streaming output of pod {}", unit)));
            }
            chunk = stream.next() => chunk,
        };

        match chunk {
            None => return Ok(CopyEnd::Closed),
            Some(Ok(bytes)) => {
                sink.write_all(&bytes).await?;
                sink.flush().await?;
                *copied += bytes.len() as u64;
            }
            Some(Err(e)) => return Ok(CopyEnd::Interrupted(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildrun_core::UnitPhase;

    use crate::fake::FakeApi;

    fn pending() -> ExecutionUnit {
        ExecutionUnit::new("pod-1").with_phase(UnitPhase::Pending)
    }

    fn running() -> ExecutionUnit {
        ExecutionUnit::new("pod-1").with_phase(UnitPhase::Running)
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_after_pending_attempts() {
        let api = FakeApi::new()
            .with_states(
                ResourceKind::Pod,
                "pod-1",
                vec![pending(), pending(), pending(), pending(), running()],
            )
            .with_log("pod-1", None, vec![Ok("hello\n")]);

        let mut sink = Vec::new();
        let outcome = attach(
            &api,
            "default",
            &UnitName::new("pod-1"),
            &mut sink,
            &AttachPolicy::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.retries, 4);
        assert_eq!(outcome.bytes_copied, 6);
        assert!(outcome.interrupted.is_none());
        assert_eq!(sink, b"hello\n");
        assert_eq!(api.get_count(ResourceKind::Pod), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_retries_exhausted() {
        let api = FakeApi::new().with_states(ResourceKind::Pod, "pod-1", vec![pending()]);

        let policy = AttachPolicy::default();
        let mut sink = Vec::new();
        let err = attach(
            &api,
            "default",
            &UnitName::new("pod-1"),
            &mut sink,
            &policy,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            FollowError::AttachRetriesExhausted { attempts: 10, .. }
        ));
        assert_eq!(api.get_count(ResourceKind::Pod), policy.max_attempts as usize);
        assert!(sink.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_endpoint_not_ready_counts_as_retry() {
        let api = FakeApi::new()
            .with_states(ResourceKind::Pod, "pod-1", vec![running()])
            .with_log_not_ready(2)
            .with_log("pod-1", None, vec![Ok("ok\n")]);

        let mut sink = Vec::new();
        let outcome = attach(
            &api,
            "default",
            &UnitName::new("pod-1"),
            &mut sink,
            &AttachPolicy::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.retries, 2);
        assert_eq!(sink, b"ok\n");
    }

    #[tokio::test]
    async fn test_interruption_is_not_fatal() {
        let api = FakeApi::new()
            .with_states(ResourceKind::Pod, "pod-1", vec![running()])
            .with_log(
                "pod-1",
                None,
                vec![Ok("step 1\n"), Err("connection reset"), Ok("never\n")],
            );

        let mut sink = Vec::new();
        let outcome = attach(
            &api,
            "default",
            &UnitName::new("pod-1"),
            &mut sink,
            &AttachPolicy::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(sink, b"step 1\n");
        assert!(outcome.interrupted.unwrap().contains("connection reset"));
        // No reopen after the first successful open.
        assert_eq!(api.log_opens.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_containers_followed_in_order() {
        let unit = running().with_container("step-source").with_container("step-build");
        let api = FakeApi::new()
            .with_states(ResourceKind::Pod, "pod-1", vec![unit])
            .with_log("pod-1", Some("step-source"), vec![Ok("cloned\n")])
            .with_log("pod-1", Some("step-build"), vec![Ok("built\n")]);

        let mut sink = Vec::new();
        let outcome = attach(
            &api,
            "default",
            &UnitName::new("pod-1"),
            &mut sink,
            &AttachPolicy::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(sink, b"cloned\nbuilt\n");
        assert_eq!(outcome.bytes_copied, 13);
        assert_eq!(
            *api.log_opens.lock().unwrap(),
            vec![Some("step-source".to_string()), Some("step-build".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_opening_next_container() {
        let unit = running().with_container("step-source").with_container("step-build");
        let api = FakeApi::new()
            .with_states(ResourceKind::Pod, "pod-1", vec![unit])
            .with_log("pod-1", Some("step-source"), vec![Ok("cloned\n")])
            .with_log("pod-1", Some("step-build"), vec![Ok("built\n")])
            .with_log_open_delay("step-build", Duration::from_secs(60));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let mut sink = Vec::new();
        let err = attach(
            &api,
            "default",
            &UnitName::new("pod-1"),
            &mut sink,
            &AttachPolicy::default(),
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FollowError::Cancelled(ref what) if what.contains("opening output")));
        assert_eq!(sink, b"cloned\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_retry_delay() {
        let api = FakeApi::new().with_states(ResourceKind::Pod, "pod-1", vec![pending()]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(4)).await;
            trigger.cancel();
        });

        let mut sink = Vec::new();
        let err = attach(
            &api,
            "default",
            &UnitName::new("pod-1"),
            &mut sink,
            &AttachPolicy::default(),
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FollowError::Cancelled(_)));
        assert_eq!(api.get_count(ResourceKind::Pod), 2);
    }
}
