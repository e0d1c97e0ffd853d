//! Scripted in-memory [`ResourceApi`] for tests.
//!
//! - `get` answers from a per-object queue; the last state sticks.
//! - `watch` replays a scripted event list, then either closes or stays open.
//! - `open_log` serves scripted chunks, optionally refusing the first opens
//!   as not ready.
//! - `patch` and `create` are recorded.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};
use tokio_stream::{Stream, StreamExt};

use buildrun_client::{ClientError, LogStream, ResourceApi, WatchStream};
use buildrun_core::{JsonPatch, ResourceKind, WatchEvent};

type Key = (ResourceKind, String);

struct WatchScript {
    events: Vec<WatchEvent<Value>>,
    hold_open: bool,
}

#[derive(Default)]
pub struct FakeApi {
    objects: Mutex<HashMap<Key, VecDeque<Value>>>,
    watches: Mutex<HashMap<Key, WatchScript>>,
    logs: Mutex<HashMap<(String, Option<String>), Vec<Result<String, String>>>>,
    log_not_ready: AtomicUsize,
    log_open_delays: Mutex<HashMap<String, Duration>>,
    patch_error: Mutex<Option<ClientError>>,
    created_name: Mutex<Option<String>>,

    pub gets: Mutex<Vec<Key>>,
    pub patches: Mutex<Vec<(Key, JsonPatch)>>,
    pub created: Mutex<Vec<Value>>,
    pub log_opens: Mutex<Vec<Option<String>>>,
    pub released_watches: Arc<AtomicUsize>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue successive `get` answers for an object.
    pub fn with_states<T: serde::Serialize>(self, kind: ResourceKind, name: &str, states: Vec<T>) -> Self {
        let states = states
            .into_iter()
            .map(|s| serde_json::to_value(s).expect("serializable state"))
            .collect();
        self.objects
            .lock()
            .unwrap()
            .insert((kind, name.to_string()), states);
        self
    }

    /// Script the events of a watch on one object.
    pub fn with_watch<T: serde::Serialize>(
        self,
        kind: ResourceKind,
        name: &str,
        events: Vec<WatchEvent<T>>,
        hold_open: bool,
    ) -> Self {
        let events = events
            .into_iter()
            .map(|e| e.map(|obj| serde_json::to_value(obj).expect("serializable object")))
            .collect();
        self.with_raw_watch(kind, name, events, hold_open)
    }

    /// Script watch events with untyped objects.
    pub fn with_raw_watch(
        self,
        kind: ResourceKind,
        name: &str,
        events: Vec<WatchEvent<Value>>,
        hold_open: bool,
    ) -> Self {
        self.watches
            .lock()
            .unwrap()
            .insert((kind, name.to_string()), WatchScript { events, hold_open });
        self
    }

    /// Script the output of one unit container; `Err` chunks break the stream.
    pub fn with_log(self, unit: &str, container: Option<&str>, chunks: Vec<Result<&str, &str>>) -> Self {
        let chunks = chunks
            .into_iter()
            .map(|c| c.map(str::to_string).map_err(str::to_string))
            .collect();
        self.logs
            .lock()
            .unwrap()
            .insert((unit.to_string(), container.map(str::to_string)), chunks);
        self
    }

    /// Refuse the first `n` log opens as not ready.
    pub fn with_log_not_ready(self, n: usize) -> Self {
        self.log_not_ready.store(n, Ordering::SeqCst);
        self
    }

    /// Answer opens of `container` only after `delay`.
    pub fn with_log_open_delay(self, container: &str, delay: Duration) -> Self {
        self.log_open_delays
            .lock()
            .unwrap()
            .insert(container.to_string(), delay);
        self
    }

    /// Fail every patch with the given error.
    pub fn with_patch_error(self, error: ClientError) -> Self {
        *self.patch_error.lock().unwrap() = Some(error);
        self
    }

    /// Name the server assigns on create.
    pub fn with_created_name(self, name: &str) -> Self {
        *self.created_name.lock().unwrap() = Some(name.to_string());
        self
    }

    pub fn get_count(&self, kind: ResourceKind) -> usize {
        self.gets.lock().unwrap().iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn patch_count(&self) -> usize {
        self.patches.lock().unwrap().len()
    }
}

#[async_trait]
impl ResourceApi for FakeApi {
    async fn get(&self, kind: ResourceKind, _namespace: &str, name: &str) -> Result<Value, ClientError> {
        let key = (kind, name.to_string());
        self.gets.lock().unwrap().push(key.clone());

        let mut objects = self.objects.lock().unwrap();
        let states = objects
            .get_mut(&key)
            .ok_or_else(|| ClientError::NotFound(format!("{} {}", kind, name)))?;
        let state = if states.len() > 1 {
            states.pop_front()
        } else {
            states.front().cloned()
        };
        state.ok_or_else(|| ClientError::NotFound(format!("{} {}", kind, name)))
    }

    async fn watch(&self, kind: ResourceKind, _namespace: &str, name: &str) -> Result<WatchStream, ClientError> {
        let script = self
            .watches
            .lock()
            .unwrap()
            .remove(&(kind, name.to_string()))
            .ok_or_else(|| ClientError::NotFound(format!("{} {}", kind, name)))?;

        let events = tokio_stream::iter(script.events.into_iter().map(Ok::<_, ClientError>));
        let inner: WatchStream = if script.hold_open {
            Box::pin(events.chain(tokio_stream::pending()))
        } else {
            Box::pin(events)
        };

        Ok(Box::pin(ReleaseTracked {
            inner,
            released: Arc::clone(&self.released_watches),
        }))
    }

    async fn patch(
        &self,
        kind: ResourceKind,
        _namespace: &str,
        name: &str,
        patch: &JsonPatch,
    ) -> Result<Value, ClientError> {
        if let Some(error) = self.patch_error.lock().unwrap().take() {
            return Err(error);
        }
        self.patches
            .lock()
            .unwrap()
            .push(((kind, name.to_string()), patch.clone()));
        Ok(json!({ "metadata": { "name": name } }))
    }

    async fn create(&self, _kind: ResourceKind, _namespace: &str, mut body: Value) -> Result<Value, ClientError> {
        self.created.lock().unwrap().push(body.clone());
        if let Some(name) = self.created_name.lock().unwrap().clone() {
            body["metadata"]["name"] = json!(name);
        }
        Ok(body)
    }

    async fn open_log(
        &self,
        _namespace: &str,
        unit: &str,
        container: Option<&str>,
    ) -> Result<LogStream, ClientError> {
        self.log_opens.lock().unwrap().push(container.map(str::to_string));

        let delay = container.and_then(|c| self.log_open_delays.lock().unwrap().get(c).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let refused = self
            .log_not_ready
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(ClientError::NotReady(format!("pod {} is waiting to start", unit)));
        }

        let chunks = self
            .logs
            .lock()
            .unwrap()
            .remove(&(unit.to_string(), container.map(str::to_string)))
            .ok_or_else(|| ClientError::NotFound(format!("log of {}", unit)))?;

        Ok(Box::pin(tokio_stream::iter(chunks.into_iter().map(|c| {
            c.map(Bytes::from).map_err(ClientError::Connection)
        }))))
    }
}

/// Counts released subscriptions.
struct ReleaseTracked {
    inner: WatchStream,
    released: Arc<AtomicUsize>,
}

impl Stream for ReleaseTracked {
    type Item = Result<WatchEvent<Value>, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for ReleaseTracked {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}
