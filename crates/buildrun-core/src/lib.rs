//! BuildRun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Runtime specifics
//!
//! All types here are typed, read-mostly views of the objects owned by the
//! orchestration platform: the submitted request, the run record, the task
//! and the execution unit (pod), plus the watch event and patch documents
//! exchanged with the platform.

pub mod error;
pub mod event;
pub mod ids;
pub mod model;
pub mod patch;
pub mod resource;
pub mod status;

// Re-export commonly used types
pub use error::CoreError;
pub use event::WatchEvent;
pub use ids::{RunName, TaskName, UnitName};
pub use model::{
    BuildRequest, BuildRunManifest, ContainerSpec, ExecutionUnit, ObjectMeta, Run, Task,
};
pub use patch::{JsonPatch, PatchOp, PatchOperation, JSON_PATCH_CONTENT_TYPE, RUN_STATE_CANCEL};
pub use resource::{Resource, ResourceKind};
pub use status::{Condition, ConditionStatus, Readiness, UnitPhase};
