//! The synchronous, per-cluster API a UI thread drives. Grounded on
//! `original_source/kube/cluster_facade.py`'s `SyncClusterFacade`: every
//! method here builds a future, dispatches it onto the engine through
//! `run_until_complete`/`launch`, and hands back a plain value or a
//! receiver a caller can poll from its own thread.

use std::sync::Arc;

use futures::future::try_join_all;
use kubescope_client::ClientError;
use kubescope_core::{ApiGroup, ApiResource, Context, EventError, ObjectEvent, ObjectSelector, Receiver};

use crate::cluster_loop::{NoSuchLogStreamError, NoSuchWatchError};
use crate::engine::{AsyncEngine, Cancelled, EngineError};

#[derive(Debug, thiserror::Error)]
pub enum FacadeError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    NoSuchWatch(#[from] NoSuchWatchError),
    #[error(transparent)]
    NoSuchLogStream(#[from] NoSuchLogStreamError),
}

/// A synchronous facade for one cluster `Context`, backed by a shared
/// [`AsyncEngine`]. Cheap to clone; every method blocks the calling thread
/// only for as long as its one round trip to the engine thread takes.
#[derive(Clone)]
pub struct Facade {
    engine: Arc<AsyncEngine>,
    context: Arc<Context>,
}

impl Facade {
    pub fn new(engine: Arc<AsyncEngine>, context: Arc<Context>) -> Self {
        Self { engine, context }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// CoreV1 plus every resource kind discovered under every non-core API
    /// group, deduplicated by qualified name.
    pub fn list_api_resources(&self) -> Result<Vec<ApiResource>, FacadeError> {
        let context = self.context.clone();
        let cluster_loop = self.engine.get_cluster_loop(context)?;

        let resources = self.engine.run_until_complete(async move {
            let client = cluster_loop.get_client().await;

            let mut groups = vec![ApiGroup::core_v1()];
            groups.extend(client.list_api_groups().await?);

            let resource_lists = try_join_all(groups.iter().map(|group| client.list_api_resources(group))).await?;

            let mut seen = std::collections::HashSet::new();
            let mut all_resources = Vec::new();
            for resources in resource_lists {
                for resource in resources {
                    if seen.insert(resource.qualified_name()) {
                        all_resources.push(resource);
                    }
                }
            }
            Ok::<_, ClientError>(all_resources)
        })??;

        Ok(resources)
    }

    pub fn list_objects(&self, selector: ObjectSelector) -> Result<Vec<serde_json::Value>, FacadeError> {
        let context = self.context.clone();
        let cluster_loop = self.engine.get_cluster_loop(context)?;
        let items = self
            .engine
            .run_until_complete(async move { cluster_loop.list_objects(&selector).await })??;
        Ok(items)
    }

    /// Register a watch for `selector` and return its event receiver. The
    /// receiver carries no `Listed` events: the caller already has whatever
    /// state it had before calling this, or should use
    /// [`Facade::list_then_watch`] to get both.
    pub fn start_watching(&self, selector: ObjectSelector) -> Result<Receiver<ObjectEvent>, FacadeError> {
        let context = self.context.clone();
        let cluster_loop = self.engine.get_cluster_loop(context)?;
        let (sender, receiver) = kubescope_core::object_event_channel();

        self.engine
            .run_until_complete(async move { cluster_loop.start_watch(selector, sender).await })?;
        Ok(receiver)
    }

    pub fn stop_watching(&self, selector: ObjectSelector) -> Result<(), FacadeError> {
        let context = self.context.clone();
        let cluster_loop = self.engine.get_cluster_loop(context)?;
        self.engine
            .run_until_complete(async move { cluster_loop.stop_watch(&selector).await })??;
        Ok(())
    }

    /// List `selector` now, emit each item as a `Listed` event on a fresh
    /// channel, then start watching on that same channel. Dispatched as a
    /// fire-and-forget task (matching the original's `launch_coro`, not
    /// `run_coro_until_completion`): the caller gets its receiver back
    /// immediately and the list runs concurrently with whatever it does
    /// next. If the list fails, one error event is pushed and no watch is
    /// registered.
    pub fn list_then_watch(&self, selector: ObjectSelector) -> Result<Receiver<ObjectEvent>, FacadeError> {
        let context = self.context.clone();
        let cluster_loop = self.engine.get_cluster_loop(context.clone())?;
        let (sender, receiver) = kubescope_core::object_event_channel();

        self.engine.launch(async move {
            let items = match cluster_loop.list_objects(&selector).await {
                Ok(items) => items,
                Err(err) => {
                    sender.send(ObjectEvent::error(context, to_event_error(err)));
                    return;
                }
            };

            for item in items {
                sender.send(ObjectEvent::listed(context.clone(), item));
            }

            cluster_loop.start_watch(selector, sender).await;
        });

        Ok(receiver)
    }

    pub fn start_stream_pod_logs(&self, selector: ObjectSelector, tail_lines: u32) -> Result<Receiver<ObjectEvent>, FacadeError> {
        let context = self.context.clone();
        let cluster_loop = self.engine.get_cluster_loop(context)?;
        let (sender, receiver) = kubescope_core::object_event_channel();

        self.engine
            .run_until_complete(async move { cluster_loop.start_stream_pod_logs(selector, tail_lines, sender).await })?;
        Ok(receiver)
    }

    pub fn stop_stream_pod_logs(&self, selector: ObjectSelector) -> Result<(), FacadeError> {
        let context = self.context.clone();
        let cluster_loop = self.engine.get_cluster_loop(context)?;
        self.engine
            .run_until_complete(async move { cluster_loop.stop_stream_pod_logs(&selector).await })??;
        Ok(())
    }
}

fn to_event_error(err: ClientError) -> EventError {
    match err {
        ClientError::Api(api) => EventError::Api(api),
        ClientError::Connection(msg) | ClientError::Protocol(msg) => EventError::Transport(msg),
    }
}
