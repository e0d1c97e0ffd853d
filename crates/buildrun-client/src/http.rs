//! HTTP implementation of [`ResourceApi`] for the platform REST API.
//!
//! Talks to an already-authenticated endpoint (for example a local API
//! proxy). Watches use the newline-delimited JSON watch protocol; logs are
//! followed as a raw byte stream.
//!
//! Every watch event is terminated by a newline. A trailing fragment left by
//! a connection dropped mid-event is discarded, so the stream simply ends
//! and callers see a closed watch.

use async_trait::async_trait;
use bytes::BytesMut;
use reqwest::header::CONTENT_TYPE;
use reqwest::Response;
use serde::Deserialize;
use serde_json::Value;
use tokio_stream::StreamExt;
use tokio_util::codec::{Decoder, FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;
use tracing::{debug, trace};

use buildrun_core::{JsonPatch, ResourceKind, WatchEvent, JSON_PATCH_CONTENT_TYPE};

use crate::api::{LogStream, ResourceApi, WatchStream};
use crate::error::ClientError;

/// Fragments of a log request rejection meaning "container not started yet".
const NOT_READY_HINTS: &[&str] = &["waiting to start", "ContainerCreating", "PodInitializing"];

/// HTTP client for the platform REST API.
#[derive(Debug, Clone)]
pub struct HttpResourceApi {
    inner: reqwest::Client,
    base_url: String,
}

impl HttpResourceApi {
    /// Create a new HTTP client.
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, kind: ResourceKind, namespace: &str) -> String {
        match kind {
            ResourceKind::Pod => format!("{}/api/v1/namespaces/{}/pods", self.base_url, namespace),
            _ => format!(
                "{}/apis/{}/namespaces/{}/{}",
                self.base_url,
                kind.api_version(),
                namespace,
                kind.plural()
            ),
        }
    }

    fn object_url(&self, kind: ResourceKind, namespace: &str, name: &str) -> String {
        format!("{}/{}", self.collection_url(kind, namespace), name)
    }
}

#[async_trait]
impl ResourceApi for HttpResourceApi {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Value, ClientError> {
        let url = self.object_url(kind, namespace, name);
        debug!(url = %url, "GET request");

        let response = self.inner.get(&url).send().await?;
        let response = check(response, &describe(kind, namespace, name)).await?;
        json_body(response).await
    }

    async fn watch(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<WatchStream, ClientError> {
        let url = self.collection_url(kind, namespace);
        let selector = format!("metadata.name={}", name);
        debug!(url = %url, selector = %selector, "WATCH request");

        let response = self
            .inner
            .get(&url)
            .query(&[("watch", "true"), ("fieldSelector", selector.as_str())])
            .send()
            .await?;
        let response = check(response, &describe(kind, namespace, name)).await?;

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        let lines = FramedRead::new(StreamReader::new(bytes), WatchLineCodec::new());

        Ok(Box::pin(lines.filter_map(decode_watch_line)))
    }

    async fn patch(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        patch: &JsonPatch,
    ) -> Result<Value, ClientError> {
        let url = self.object_url(kind, namespace, name);
        debug!(url = %url, "PATCH request");

        let response = self
            .inner
            .patch(&url)
            .header(CONTENT_TYPE, JSON_PATCH_CONTENT_TYPE)
            .body(patch.to_vec()?)
            .send()
            .await?;
        let response = check(response, &describe(kind, namespace, name)).await?;
        json_body(response).await
    }

    async fn create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        body: Value,
    ) -> Result<Value, ClientError> {
        let url = self.collection_url(kind, namespace);
        debug!(url = %url, "POST request");

        let response = self.inner.post(&url).json(&body).send().await?;
        let response = check(response, &format!("{} in namespace {}", kind, namespace)).await?;
        json_body(response).await
    }

    async fn open_log(
        &self,
        namespace: &str,
        unit: &str,
        container: Option<&str>,
    ) -> Result<LogStream, ClientError> {
        let url = format!("{}/log", self.object_url(ResourceKind::Pod, namespace, unit));
        debug!(url = %url, container = ?container, "LOG request");

        let mut request = self.inner.get(&url).query(&[("follow", "true")]);
        if let Some(container) = container {
            request = request.query(&[("container", container)]);
        }

        let response = request.send().await?;
        let response = check(response, &describe(ResourceKind::Pod, namespace, unit)).await?;

        Ok(Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(ClientError::from)),
        ))
    }
}

fn describe(kind: ResourceKind, namespace: &str, name: &str) -> String {
    format!("{} {}/{}", kind, namespace, name)
}

async fn json_body(response: Response) -> Result<Value, ClientError> {
    response
        .json()
        .await
        .map_err(|e| ClientError::Serialization(e.to_string()))
}

/// Status object the API returns on failures and in watch ERROR events.
#[derive(Debug, Default, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<u16>,
}

async fn check(response: Response, what: &str) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status.as_u16(), &body, what))
}

fn classify_status(code: u16, body: &str, what: &str) -> ClientError {
    let message = serde_json::from_str::<ApiStatus>(body)
        .ok()
        .and_then(|s| s.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string());

    match code {
        404 => ClientError::NotFound(what.to_string()),
        409 => ClientError::Conflict(format!("{}: {}", what, message)),
        400 if NOT_READY_HINTS.iter().any(|hint| message.contains(hint)) => {
            ClientError::NotReady(format!("{}: {}", what, message))
        }
        _ => ClientError::Status { code, message },
    }
}

/// Newline framing for watch bodies that drops an unterminated tail.
#[derive(Debug)]
struct WatchLineCodec {
    lines: LinesCodec,
}

impl WatchLineCodec {
    fn new() -> Self {
        Self {
            lines: LinesCodec::new(),
        }
    }
}

impl Decoder for WatchLineCodec {
    type Item = String;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, LinesCodecError> {
        self.lines.decode(buf)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, LinesCodecError> {
        if let Some(line) = self.lines.decode(buf)? {
            return Ok(Some(line));
        }
        if !buf.is_empty() {
            debug!(bytes = buf.len(), "Dropping truncated watch event");
            buf.clear();
        }
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
struct RawWatchEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    object: Value,
}

fn decode_watch_line(
    line: Result<String, LinesCodecError>,
) -> Option<Result<WatchEvent<Value>, ClientError>> {
    let line = match line {
        Ok(line) => line,
        Err(e) => return Some(Err(ClientError::Connection(e.to_string()))),
    };
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let raw: RawWatchEvent = match serde_json::from_str(line) {
        Ok(raw) => raw,
        Err(e) => return Some(Err(ClientError::Serialization(e.to_string()))),
    };

    match raw.event_type.as_str() {
        "ADDED" | "MODIFIED" => Some(Ok(WatchEvent::Updated(raw.object))),
        "DELETED" => Some(Ok(WatchEvent::Deleted(raw.object))),
        "ERROR" => {
            let status: ApiStatus = serde_json::from_value(raw.object).unwrap_or_default();
            Some(Err(ClientError::Status {
                code: status.code.unwrap_or(500),
                message: status.message.unwrap_or_else(|| "watch error".to_string()),
            }))
        }
        other => {
            trace!(event_type = %other, "Ignoring watch event");
            None
        }
    }
}
