//! The resource access capability consumed by the follow pipeline.
//!
//! Everything that touches the platform goes through [`ResourceApi`], passed
//! explicitly as `&dyn ResourceApi`. Production code uses
//! [`crate::HttpResourceApi`]; tests provide fakes that replay scripted
//! event sequences.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio_stream::Stream;

use buildrun_core::{JsonPatch, Resource, ResourceKind, WatchEvent};

use crate::error::ClientError;

/// Live change events for one named resource, objects still undecoded.
///
/// Dropping the stream releases the subscription.
pub type WatchStream =
    Pin<Box<dyn Stream<Item = Result<WatchEvent<Value>, ClientError>> + Send + 'static>>;

/// Raw output of an execution unit.
pub type LogStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send + 'static>>;

/// Resource access keyed by kind, namespace and name.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// Read the current state of an object.
    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str)
        -> Result<Value, ClientError>;

    /// Subscribe to changes of one named object.
    ///
    /// The first event reflects the state at subscription time.
    async fn watch(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<WatchStream, ClientError>;

    /// Apply a JSON-Patch document to an object.
    async fn patch(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        patch: &JsonPatch,
    ) -> Result<Value, ClientError>;

    /// Create an object; returns it as stored, including any generated name.
    async fn create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        body: Value,
    ) -> Result<Value, ClientError>;

    /// Open the followed output stream of an execution unit.
    ///
    /// `container` selects one output source of a multi-container unit.
    async fn open_log(
        &self,
        namespace: &str,
        unit: &str,
        container: Option<&str>,
    ) -> Result<LogStream, ClientError>;
}

/// Decode an untyped object into its typed view.
pub fn decode<T: Resource>(value: Value) -> Result<T, ClientError> {
    serde_json::from_value(value)
        .map_err(|e| ClientError::Serialization(format!("invalid {}: {}", T::KIND, e)))
}

/// Read and decode an object.
pub async fn get_typed<T: Resource>(
    api: &dyn ResourceApi,
    namespace: &str,
    name: &str,
) -> Result<T, ClientError> {
    let value = api.get(T::KIND, namespace, name).await?;
    decode(value)
}
