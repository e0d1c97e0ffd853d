//! Resource kinds and the trait shared by every typed resource view.

use std::fmt;

use serde::de::DeserializeOwned;

use crate::model::ObjectMeta;

/// Kinds of platform resources this tool reads, watches or patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Run record created from a build request.
    BuildRun,
    /// Task derived from a run by the controller.
    TaskRun,
    /// Execution unit running a task.
    Pod,
}

impl ResourceKind {
    /// Kind name as it appears in manifests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BuildRun => "BuildRun",
            Self::TaskRun => "TaskRun",
            Self::Pod => "Pod",
        }
    }

    /// API group/version serving this kind ("v1" for the core group).
    pub fn api_version(&self) -> &'static str {
        match self {
            Self::BuildRun => "shipwright.io/v1alpha1",
            Self::TaskRun => "tekton.dev/v1beta1",
            Self::Pod => "v1",
        }
    }

    /// Lower-case plural used in collection URLs.
    pub fn plural(&self) -> &'static str {
        match self {
            Self::BuildRun => "buildruns",
            Self::TaskRun => "taskruns",
            Self::Pod => "pods",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed, decodable view of one platform resource kind.
pub trait Resource: DeserializeOwned + Send + 'static {
    /// Kind served by this view.
    const KIND: ResourceKind;

    /// Object metadata.
    fn metadata(&self) -> &ObjectMeta;

    /// Object name.
    fn name(&self) -> &str {
        &self.metadata().name
    }

    /// Returns true once deletion of the object has been requested.
    fn deletion_requested(&self) -> bool {
        self.metadata().deletion_timestamp.is_some()
    }
}
