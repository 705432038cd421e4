//! Per-`Context` owner of the HTTP session, auth, cursor, and the set of
//! active watch/log-stream tasks. Grounded on
//! `original_source/kube/cluster_loop.py`'s `AsyncClusterLoop`: an
//! `initialized_event`, a lazily-built client, a lock-guarded `watches` map,
//! and a `mainloop` that ticks `detect_stopped_watches` once a second. The
//! log-stream half and the request/response split between `start_*`/`stop_*`
//! and a background supervisor follow the same shape, extended to also
//! track log streams, matching kube-runtime's `coordination.rs`
//! background-task-with-handle style for `JoinHandle` lifecycle management.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use kubescope_client::{ApiClient, BuildError, ClientError};
use kubescope_core::{ApiGroup, ApiResource, Context, ObjectEvent, ObjectSelector, Sender};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::log_task::LogTaskHandle;
use crate::watch_task::WatchTaskHandle;

#[derive(Debug, thiserror::Error)]
#[error("no watch registered for selector {0:?}")]
pub struct NoSuchWatchError(pub String);

#[derive(Debug, thiserror::Error)]
#[error("no log stream registered for selector {0:?}")]
pub struct NoSuchLogStreamError(pub String);

pub struct ClusterLoop {
    context: Arc<Context>,
    client: Arc<ApiClient>,
    watches: Mutex<HashMap<ObjectSelector, WatchTaskHandle>>,
    log_streams: Mutex<HashMap<ObjectSelector, LogTaskHandle>>,
    supervisor: StdMutex<Option<JoinHandle<()>>>,
    /// Fires once the cluster loop is ready to serve requests. Today that's
    /// immediately after construction (building an `ApiClient` is pure CPU
    /// work), but keeping this as a real signal — rather than assuming
    /// construction never blocks — means a future discovery warm-up pass
    /// doesn't silently race callers.
    initialized: watch::Receiver<bool>,
}

impl ClusterLoop {
    pub fn new(context: Arc<Context>) -> Result<Self, BuildError> {
        let client = Arc::new(ApiClient::new(context.clone())?);
        let (tx, rx) = watch::channel(false);
        let _ = tx.send(true);
        Ok(Self {
            context,
            client,
            watches: Mutex::new(HashMap::new()),
            log_streams: Mutex::new(HashMap::new()),
            supervisor: StdMutex::new(None),
            initialized: rx,
        })
    }

    async fn wait_initialized(&self) {
        let mut rx = self.initialized.clone();
        let _ = rx.wait_for(|ready| *ready).await;
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Start the 1-second supervisor tick that logs completed watch/log
    /// tasks. Idempotent. Requires `self` to already be wrapped in an `Arc`
    /// since the tick runs as its own background task.
    pub fn start_supervisor(self: &Arc<Self>) {
        let mut guard = self.supervisor.lock().expect("supervisor mutex poisoned");
        if guard.is_some() {
            return;
        }
        let cluster_loop = self.clone();
        *guard = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                cluster_loop.scan_finished_tasks().await;
            }
        }));
    }

    async fn scan_finished_tasks(&self) {
        for (selector, handle) in self.watches.lock().await.iter() {
            if handle.is_finished() {
                tracing::info!(
                    context = %self.context.short_name,
                    selector = %selector.pretty(),
                    "watch task completed; leaving registered until stop_watch is called"
                );
            }
        }
        for (selector, handle) in self.log_streams.lock().await.iter() {
            if handle.is_finished() {
                tracing::info!(
                    context = %self.context.short_name,
                    selector = %selector.pretty(),
                    "log stream task completed; leaving registered until stop_stream_pod_logs is called"
                );
            }
        }
    }

    pub async fn get_client(&self) -> Arc<ApiClient> {
        self.wait_initialized().await;
        self.client.clone()
    }

    pub async fn list_objects(&self, selector: &ObjectSelector) -> Result<Vec<serde_json::Value>, ClientError> {
        self.wait_initialized().await;
        self.client.list(selector).await
    }

    pub async fn list_api_groups(&self) -> Result<Vec<ApiGroup>, ClientError> {
        self.wait_initialized().await;
        self.client.list_api_groups().await
    }

    pub async fn list_api_resources(&self, group: &ApiGroup) -> Result<Vec<ApiResource>, ClientError> {
        self.wait_initialized().await;
        self.client.list_api_resources(group).await
    }

    /// Register a watch task for `selector`, feeding events to `sender`.
    /// Idempotent: a second call for an already-watched selector is a no-op,
    /// leaving the existing task (and its original channel) in place.
    pub async fn start_watch(&self, selector: ObjectSelector, sender: Sender<ObjectEvent>) {
        self.wait_initialized().await;
        let mut watches = self.watches.lock().await;
        if watches.contains_key(&selector) {
            return;
        }
        let handle = WatchTaskHandle::spawn(self.context.clone(), self.client.clone(), selector.clone(), sender);
        watches.insert(selector, handle);
    }

    pub async fn stop_watch(&self, selector: &ObjectSelector) -> Result<(), NoSuchWatchError> {
        let handle = self
            .watches
            .lock()
            .await
            .remove(selector)
            .ok_or_else(|| NoSuchWatchError(selector.pretty()))?;
        handle.stop().await;
        Ok(())
    }

    pub async fn start_stream_pod_logs(&self, selector: ObjectSelector, tail_lines: u32, sender: Sender<ObjectEvent>) {
        self.wait_initialized().await;
        let mut streams = self.log_streams.lock().await;
        if streams.contains_key(&selector) {
            return;
        }
        let handle = LogTaskHandle::spawn(self.context.clone(), self.client.clone(), selector.clone(), tail_lines, sender);
        streams.insert(selector, handle);
    }

    pub async fn stop_stream_pod_logs(&self, selector: &ObjectSelector) -> Result<(), NoSuchLogStreamError> {
        let handle = self
            .log_streams
            .lock()
            .await
            .remove(selector)
            .ok_or_else(|| NoSuchLogStreamError(selector.pretty()))?;
        handle.stop().await;
        Ok(())
    }

    /// Cancel every watch and log-stream task and stop the supervisor tick.
    /// Idempotent.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.supervisor.lock().expect("supervisor mutex poisoned").take() {
            handle.abort();
        }
        let watches: Vec<_> = self.watches.lock().await.drain().collect();
        for (_, handle) in watches {
            handle.stop().await;
        }
        let streams: Vec<_> = self.log_streams.lock().await.drain().collect();
        for (_, handle) in streams {
            handle.stop().await;
        }
    }
}
