//! Typed views of the request, run, task and execution unit.
//!
//! Only the fields this tool reads are modelled; everything else in the
//! platform objects is ignored on decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::{RunName, TaskName, UnitName};
use crate::resource::{Resource, ResourceKind};
use crate::status::{self, Condition, ConditionStatus, UnitPhase};

/// Object metadata shared by all kinds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Object name (empty on submission when `generate_name` is used).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Namespace the object lives in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Prefix for a server-generated name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_name: Option<String>,

    /// Set once deletion has been requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    /// Metadata for a named object.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// What the operator asks to build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildRequest {
    /// Name of the Build to run.
    pub build_name: String,

    /// Service account the build runs as.
    pub service_account: Option<String>,

    /// Build timeout as a duration string, e.g. "10m".
    pub timeout: Option<String>,

    /// Output image override.
    pub output_image: Option<String>,
}

impl BuildRequest {
    /// Create a request for the given build.
    pub fn new(build_name: impl Into<String>) -> Self {
        Self {
            build_name: build_name.into(),
            ..Self::default()
        }
    }

    /// Builder method to set the service account.
    pub fn with_service_account(mut self, name: impl Into<String>) -> Self {
        self.service_account = Some(name.into());
        self
    }

    /// Builder method to set the timeout.
    pub fn with_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    /// Builder method to set the output image.
    pub fn with_output_image(mut self, image: impl Into<String>) -> Self {
        self.output_image = Some(image.into());
        self
    }

    /// Build the BuildRun manifest to submit.
    ///
    /// The name is generated server side from `"<build>-"`; empty optional
    /// fields are dropped so the controller applies its defaults.
    pub fn to_manifest(&self) -> Result<BuildRunManifest, CoreError> {
        let build_name = self.build_name.trim();
        if build_name.is_empty() {
            return Err(CoreError::InvalidInput("build name is not informed".to_string()));
        }

        Ok(BuildRunManifest {
            api_version: ResourceKind::BuildRun.api_version().to_string(),
            kind: ResourceKind::BuildRun.as_str().to_string(),
            metadata: ObjectMeta {
                generate_name: Some(format!("{}-", build_name)),
                ..ObjectMeta::default()
            },
            spec: BuildRunSpec {
                build_ref: BuildRef {
                    name: build_name.to_string(),
                },
                service_account: non_empty(&self.service_account)
                    .map(|name| ServiceAccountRef { name }),
                timeout: non_empty(&self.timeout),
                output: non_empty(&self.output_image).map(|image| OutputImage { image }),
            },
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Manifest submitted to create a BuildRun.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRunManifest {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: BuildRunSpec,
}

/// Desired state of a BuildRun.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRunSpec {
    pub build_ref: BuildRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account: Option<ServiceAccountRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceAccountRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputImage {
    pub image: String,
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// The controller-managed record of one execution attempt (BuildRun).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: RunStatus,
}

/// Observed state of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Task derived from this run; never cleared once set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_task_run_ref: Option<String>,
}

impl Run {
    /// Create a run with no status yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
            status: RunStatus::default(),
        }
    }

    /// Builder method to set the derived task reference.
    pub fn with_task_ref(mut self, task: impl Into<String>) -> Self {
        self.status.latest_task_run_ref = Some(task.into());
        self
    }

    /// Builder method to set the "Succeeded" condition status.
    pub fn with_condition(mut self, status: ConditionStatus) -> Self {
        self.status.conditions = vec![Condition::succeeded(status)];
        self
    }

    /// Builder method to mark the run as being deleted.
    pub fn with_deletion_requested(mut self) -> Self {
        self.metadata.deletion_timestamp = Some(Utc::now());
        self
    }

    /// Typed name of this run.
    pub fn run_name(&self) -> RunName {
        RunName::new(self.metadata.name.clone())
    }

    /// Status of the "Succeeded" condition, absent while the controller has
    /// not reported anything.
    pub fn terminal_condition(&self) -> Option<ConditionStatus> {
        status::succeeded(&self.status.conditions).map(|c| c.status)
    }

    /// The "Succeeded" condition itself, for reason/message reporting.
    pub fn succeeded_condition(&self) -> Option<&Condition> {
        status::succeeded(&self.status.conditions)
    }

    /// Returns true once the run has finished one way or another.
    pub fn is_finished(&self) -> bool {
        self.terminal_condition().is_some_and(|s| s.is_terminal())
    }

    /// Reference to the derived task, once the controller has created it.
    pub fn task_ref(&self) -> Option<TaskName> {
        self.status
            .latest_task_run_ref
            .as_deref()
            .filter(|r| !r.is_empty())
            .map(TaskName::from)
    }
}

impl Resource for Run {
    const KIND: ResourceKind = ResourceKind::BuildRun;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// The controller-managed execution plan derived from a run (TaskRun).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: TaskStatus,
}

/// Observed state of a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Execution unit running this task; immutable once set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,
}

impl Task {
    /// Create a task with no status yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
            status: TaskStatus::default(),
        }
    }

    /// Builder method to set the execution unit reference.
    pub fn with_unit_ref(mut self, unit: impl Into<String>) -> Self {
        self.status.pod_name = Some(unit.into());
        self
    }

    /// Builder method to set the "Succeeded" condition status.
    pub fn with_condition(mut self, status: ConditionStatus) -> Self {
        self.status.conditions = vec![Condition::succeeded(status)];
        self
    }

    /// Builder method to mark the task as being deleted.
    pub fn with_deletion_requested(mut self) -> Self {
        self.metadata.deletion_timestamp = Some(Utc::now());
        self
    }

    /// Typed name of this task.
    pub fn task_name(&self) -> TaskName {
        TaskName::new(self.metadata.name.clone())
    }

    /// Status of the "Succeeded" condition.
    pub fn terminal_condition(&self) -> Option<ConditionStatus> {
        status::succeeded(&self.status.conditions).map(|c| c.status)
    }

    /// The "Succeeded" condition itself, for reason/message reporting.
    pub fn succeeded_condition(&self) -> Option<&Condition> {
        status::succeeded(&self.status.conditions)
    }

    /// Returns true once the task has finished one way or another.
    pub fn is_finished(&self) -> bool {
        self.terminal_condition().is_some_and(|s| s.is_terminal())
    }

    /// Identifier of the execution unit, once scheduled.
    pub fn unit_ref(&self) -> Option<UnitName> {
        self.status
            .pod_name
            .as_deref()
            .filter(|r| !r.is_empty())
            .map(UnitName::from)
    }
}

impl Resource for Task {
    const KIND: ResourceKind = ResourceKind::TaskRun;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

// ---------------------------------------------------------------------------
// Execution unit
// ---------------------------------------------------------------------------

/// The runtime unit (pod) producing the build output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionUnit {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: UnitSpec,
    #[serde(default)]
    pub status: UnitStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitSpec {
    /// Output sources, in execution order.
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitStatus {
    #[serde(default)]
    pub phase: UnitPhase,
}

impl ExecutionUnit {
    /// Create a pending unit.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
            spec: UnitSpec::default(),
            status: UnitStatus::default(),
        }
    }

    /// Builder method to set the phase.
    pub fn with_phase(mut self, phase: UnitPhase) -> Self {
        self.status.phase = phase;
        self
    }

    /// Builder method to append a container.
    pub fn with_container(mut self, name: impl Into<String>) -> Self {
        self.spec.containers.push(ContainerSpec { name: name.into() });
        self
    }

    /// Container names in declaration order.
    pub fn container_names(&self) -> impl Iterator<Item = &str> {
        self.spec.containers.iter().map(|c| c.name.as_str())
    }
}

impl Resource for ExecutionUnit {
    const KIND: ResourceKind = ResourceKind::Pod;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}
