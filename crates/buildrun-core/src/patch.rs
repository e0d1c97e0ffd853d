//! JSON-Patch documents sent to the platform.

use serde::Serialize;
use serde_json::Value;

use crate::error::CoreError;

/// Content type for RFC 6902 JSON-Patch request bodies.
pub const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";

/// Desired run state the controller interprets as "cancel requested".
pub const RUN_STATE_CANCEL: &str = "BuildRunCanceled";

/// Path of the desired run state in a BuildRun.
const RUN_STATE_PATH: &str = "/spec/state";

/// A single JSON-Patch operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Replace,
}

/// An ordered list of patch operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct JsonPatch(pub Vec<PatchOperation>);

impl JsonPatch {
    /// Patch requesting cancellation of a BuildRun.
    ///
    /// Replacing the field with its current value is a server-side no-op,
    /// so the patch can be reapplied safely.
    pub fn cancel_run() -> Self {
        Self(vec![PatchOperation {
            op: PatchOp::Replace,
            path: RUN_STATE_PATH.to_string(),
            value: Value::String(RUN_STATE_CANCEL.to_string()),
        }])
    }

    /// Serialize to the request body.
    pub fn to_vec(&self) -> Result<Vec<u8>, CoreError> {
        Ok(serde_json::to_vec(self)?)
    }
}
