//! Submission and the sequential follow pipeline.
//!
//! Following a run is strictly sequential: the run tracker, then the task
//! tracker, then the log attacher. Each stage starts only after the
//! previous one returned its reference.

use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::info;

use buildrun_client::{decode, ResourceApi};
use buildrun_core::{BuildRequest, CoreError, Resource, ResourceKind, Run, RunName, TaskName, UnitName};

use crate::cancel::cancel_run;
use crate::error::FollowError;
use crate::logs::{attach, AttachOutcome, AttachPolicy};
use crate::tracker::{wait_for_task, wait_for_unit};

/// Everything observed while following one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowReport {
    pub run: RunName,
    pub task: TaskName,
    pub unit: UnitName,
    pub attach: AttachOutcome,
}

/// Create a run for `request`; returns the server-assigned name.
pub async fn submit(
    api: &dyn ResourceApi,
    namespace: &str,
    request: &BuildRequest,
) -> Result<RunName, FollowError> {
    let manifest = request.to_manifest()?;
    let body = serde_json::to_value(&manifest).map_err(CoreError::from)?;

    let created = api
        .create(ResourceKind::BuildRun, namespace, body)
        .await
        .map_err(|e| FollowError::Client {
            context: format!("failed to create BuildRun for build {}", request.build_name),
            source: e,
        })?;

    let run: Run = decode(created).map_err(|e| FollowError::Decode {
        kind: ResourceKind::BuildRun,
        name: request.build_name.clone(),
        message: e.to_string(),
    })?;

    if run.name().is_empty() {
        return Err(FollowError::Decode {
            kind: ResourceKind::BuildRun,
            name: request.build_name.clone(),
            message: "created object carries no name".to_string(),
        });
    }

    let name = run.run_name();
    info!(run = %name, build = %request.build_name, "BuildRun created");
    Ok(name)
}

/// Follow an existing run until its unit's output closes.
pub async fn follow_run<W>(
    api: &dyn ResourceApi,
    namespace: &str,
    run: &RunName,
    sink: &mut W,
    policy: &AttachPolicy,
    cancel: &CancellationToken,
) -> Result<FollowReport, FollowError>
where
    W: AsyncWrite + Unpin + Send,
{
    let task = wait_for_task(api, namespace, run, cancel).await?.reference;
    let unit = wait_for_unit(api, namespace, &task, cancel).await?.reference;
    let outcome = attach(api, namespace, &unit, sink, policy, cancel).await?;

    Ok(FollowReport {
        run: run.clone(),
        task,
        unit,
        attach: outcome,
    })
}

/// Submit a request, then follow the created run.
pub async fn submit_and_follow<W>(
    api: &dyn ResourceApi,
    namespace: &str,
    request: &BuildRequest,
    sink: &mut W,
    policy: &AttachPolicy,
    cancel: &CancellationToken,
) -> Result<FollowReport, FollowError>
where
    W: AsyncWrite + Unpin + Send,
{
    let run = submit(api, namespace, request).await?;
    follow_run(api, namespace, &run, sink, policy, cancel).await
}

/// One namespace's worth of build operations sharing an API handle, attach
/// policy and cancellation token.
#[derive(Clone)]
pub struct BuildFollower {
    api: Arc<dyn ResourceApi>,
    namespace: String,
    policy: AttachPolicy,
    cancel: CancellationToken,
}

impl BuildFollower {
    pub fn new(api: Arc<dyn ResourceApi>, namespace: impl Into<String>) -> Self {
        Self {
            api,
            namespace: namespace.into(),
            policy: AttachPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Builder method to set the attach policy.
    pub fn with_policy(mut self, policy: AttachPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builder method to share an existing cancellation token.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Token that aborts any wait or copy in progress.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn submit(&self, request: &BuildRequest) -> Result<RunName, FollowError> {
        submit(self.api.as_ref(), &self.namespace, request).await
    }

    pub async fn follow<W>(&self, run: &RunName, sink: &mut W) -> Result<FollowReport, FollowError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        follow_run(self.api.as_ref(), &self.namespace, run, sink, &self.policy, &self.cancel).await
    }

    pub async fn submit_and_follow<W>(
        &self,
        request: &BuildRequest,
        sink: &mut W,
    ) -> Result<FollowReport, FollowError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        submit_and_follow(
            self.api.as_ref(),
            &self.namespace,
            request,
            sink,
            &self.policy,
            &self.cancel,
        )
        .await
    }

    /// Request cancellation of a run.
    pub async fn cancel(&self, run: &RunName) -> Result<RunName, FollowError> {
        cancel_run(self.api.as_ref(), &self.namespace, run).await
    }
}
