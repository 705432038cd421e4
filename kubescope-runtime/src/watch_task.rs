//! The watch-only reconnect loop for a single selector on a single cluster.
//! Grounded on `original_source/kube/client.py`'s `AsyncClient.watch_objects`:
//! that coroutine never lists, it only watches from whatever cursor it's
//! handed — listing is `Facade::list_then_watch`'s job, done once before
//! this task is ever registered. For the spawn/handle/cancellation shape,
//! on kube-runtime's `coordination.rs` `LeaderElector::spawn` →
//! `LeaderElectorHandle` pattern.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kubescope_client::{ApiClient, ClientError};
use kubescope_core::{ApiErrorKind, Context, EventError, EventPayload, ObjectEvent, ObjectSelector, Sender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// How long an attempt pauses before reconnecting after a normal close or a
/// retryable failure. Resource-version-too-old recovery skips this delay
/// entirely.
const WATCH_RETRY_DELAY: Duration = Duration::from_secs(1);

enum WatchOutcome {
    /// Server closed the stream (empty line) or the read timed out: expected
    /// steady-state behaviour.
    Normal,
    Retryable,
    TooOld(kubescope_core::ApiError),
    Fatal(ClientError),
}

fn to_event_error(err: ClientError) -> EventError {
    match err {
        ClientError::Api(api) => EventError::Api(api),
        ClientError::Connection(msg) | ClientError::Protocol(msg) => EventError::Transport(msg),
    }
}

async fn run(context: Arc<Context>, client: Arc<ApiClient>, selector: ObjectSelector, sender: Sender<ObjectEvent>, mut cancel: oneshot::Receiver<()>) {
    loop {
        let outcome = tokio::select! {
            _ = &mut cancel => return,
            outcome = watch_attempt(&client, &selector, &sender, &context) => outcome,
        };
        match outcome {
            WatchOutcome::Normal => {
                tracing::debug!(selector = %selector.pretty(), "watch stream closed normally, reconnecting");
                sleep_or_cancel(WATCH_RETRY_DELAY, &mut cancel).await;
            }
            WatchOutcome::Retryable => {
                tracing::warn!(selector = %selector.pretty(), "watch attempt failed with retryable error, reconnecting");
                sleep_or_cancel(WATCH_RETRY_DELAY, &mut cancel).await;
            }
            WatchOutcome::TooOld(api_err) => {
                tracing::info!(selector = %selector.pretty(), error = %api_err, "resource version too old, advancing cursor and retrying immediately");
                client.observe_acceptable_resource_version(&api_err).await;
            }
            WatchOutcome::Fatal(err) => {
                tracing::error!(selector = %selector.pretty(), error = %err, "watch attempt failed with fatal error, terminating watch task");
                sender.send(ObjectEvent::error(context.clone(), to_event_error(err)));
                return;
            }
        }
        if cancel.try_recv().is_ok() {
            return;
        }
    }
}

/// Sleep for `delay`, returning early (without changing state) if cancelled
/// mid-sleep so `stop_watch` doesn't have to wait out a whole backoff.
async fn sleep_or_cancel(delay: Duration, cancel: &mut oneshot::Receiver<()>) {
    tokio::select! {
        _ = &mut *cancel => {},
        _ = tokio::time::sleep(delay) => {},
    }
}

async fn watch_attempt(
    client: &ApiClient,
    selector: &ObjectSelector,
    sender: &Sender<ObjectEvent>,
    context: &Arc<Context>,
) -> WatchOutcome {
    let cursor = client.cursor().get().await;
    let stream = match client.watch_once(selector, cursor).await {
        Ok(stream) => stream,
        Err(err) => return classify(err),
    };
    tokio::pin!(stream);

    while let Some(item) = stream.next().await {
        match item {
            Ok(watch_item) => {
                sender.send(ObjectEvent::new(context.clone(), watch_item.action, EventPayload::Object(watch_item.object)));
            }
            Err(err) => return classify(err),
        }
    }
    WatchOutcome::Normal
}

fn classify(err: ClientError) -> WatchOutcome {
    match err.kind() {
        ApiErrorKind::ResourceVersionTooOld => {
            let ClientError::Api(api) = err else {
                unreachable!("ResourceVersionTooOld is only produced for ClientError::Api")
            };
            WatchOutcome::TooOld(api)
        }
        ApiErrorKind::Retryable => WatchOutcome::Retryable,
        ApiErrorKind::Fatal => WatchOutcome::Fatal(err),
    }
}

/// A handle to a spawned [`WatchTask`](self). Dropping it aborts the task;
/// prefer [`WatchTaskHandle::stop`] to cancel and wait for it to actually
/// finish.
pub struct WatchTaskHandle {
    cancel: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl WatchTaskHandle {
    /// Spawn a new watch task on the current Tokio runtime.
    pub fn spawn(context: Arc<Context>, client: Arc<ApiClient>, selector: ObjectSelector, sender: Sender<ObjectEvent>) -> Self {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let join = tokio::spawn(run(context, client, selector, sender, cancel_rx));
        Self {
            cancel: Some(cancel_tx),
            join,
        }
    }

    /// Cancel the task and wait for it to finish. No further events are
    /// emitted on its channel after this returns.
    pub async fn stop(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        let _ = (&mut self.join).await;
    }

    /// Whether the task has already run to completion (the server-side
    /// stream was torn down for good, or a fatal/cancellation event already
    /// fired) without anyone calling `stop`.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl Drop for WatchTaskHandle {
    fn drop(&mut self) {
        self.join.abort();
    }
}

/// End-to-end scenarios against a mocked API server, following the shape of
/// `original_source/kube/client.py`'s own test suite and kube's
/// `kube/src/mock_tests.rs` (a `tower_test::mock` pair driven by a scenario
/// task, with the real `WatchTaskHandle`/`ApiClient` wired on top of it).
/// `WatchTaskHandle` never lists, so these scenarios drive it straight into
/// watching; listing is `Facade::list_then_watch`'s job, not this task's.
#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use http::{Method, Request, Response};
    use http_body_util::Full;
    use kubescope_client::{ApiClient, Body};
    use kubescope_core::{Action, ApiResource, AuthConfig, Cluster, ObjectSelector, User};
    use tower_test::mock;

    use super::*;

    type MockHandle = mock::Handle<Request<Body>, Response<Full<Bytes>>>;

    fn test_context() -> Arc<Context> {
        let cluster = Cluster::new("test-cluster", "https://cluster.example");
        let user = User::new("test-user", AuthConfig::None);
        Arc::new(Context::new("test", cluster, user))
    }

    fn ndjson_response(lines: &[serde_json::Value]) -> Response<Full<Bytes>> {
        let mut body = Vec::new();
        for line in lines {
            body.extend_from_slice(&serde_json::to_vec(line).unwrap());
            body.push(b'\n');
        }
        Response::new(Full::new(Bytes::from(body)))
    }

    async fn timeout_after(secs: u64, handle: tokio::task::JoinHandle<()>) {
        tokio::time::timeout(Duration::from_secs(secs), handle)
            .await
            .expect("mock server scenario timed out")
            .expect("mock server scenario task panicked");
    }

    /// A watch request followed by one `ADDED` line delivers `Added(c)` and
    /// nothing else: the task never issues a list request of its own.
    #[tokio::test]
    async fn happy_watch_emits_added_with_no_list_request() {
        let (service, handle) = mock::pair::<Request<Body>, Response<Full<Bytes>>>();
        let context = test_context();
        let client = Arc::new(ApiClient::with_service(context.clone(), service));
        let selector = ObjectSelector::new(ApiResource::pods()).in_namespace("default").unwrap();

        let server = tokio::spawn(scenario_happy_path(handle));

        let (sender, mut receiver) = kubescope_core::object_event_channel();
        let task = WatchTaskHandle::spawn(context, client, selector, sender);

        let added_c = receiver.recv_async().await.expect("Added(c) event");
        assert_eq!(added_c.action, Action::Added);
        assert_eq!(added_c.resource_version(), Some(15));

        task.stop().await;
        timeout_after(1, server).await;
    }

    async fn scenario_happy_path(mut handle: MockHandle) {
        let (request, send) = handle.next_request().await.expect("watch request");
        assert_eq!(request.method(), Method::GET);
        assert!(request.uri().to_string().contains("/namespaces/default/pods"));
        assert!(request.uri().to_string().contains("watch=1"));
        send.send_response(ndjson_response(&[serde_json::json!({
            "type": "ADDED",
            "object": {"metadata": {"name": "c", "resourceVersion": "15"}},
        })]));
        // The mock server has nothing more queued; a further request just
        // means the test already asserted what it needed to and is
        // tearing the task down.
    }

    /// S2: a "too old resource version" error advances the cursor and the
    /// very next watch attempt carries the server-suggested version, with no
    /// event emitted for the error itself and no backoff delay before
    /// retrying.
    #[tokio::test]
    async fn too_old_error_advances_cursor_and_retries_with_new_version() {
        let (service, handle) = mock::pair::<Request<Body>, Response<Full<Bytes>>>();
        let context = test_context();
        let client = Arc::new(ApiClient::with_service(context.clone(), service));
        let selector = ObjectSelector::new(ApiResource::namespaces());

        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("first watch attempt");
            assert!(request.uri().to_string().contains("resourceVersion=0"));
            send.send_response(ndjson_response(&[serde_json::json!({
                "type": "ERROR",
                "object": {
                    "kind": "Status",
                    "status": "Failure",
                    "code": 410,
                    "reason": "Expired",
                    "message": "too old resource version: 100 (250)",
                },
            })]));

            let (request, send) = handle.next_request().await.expect("retried watch attempt");
            assert!(request.uri().to_string().contains("resourceVersion=250"));
            send.send_response(ndjson_response(&[]));
        });

        let (sender, mut receiver) = kubescope_core::object_event_channel();
        let task = WatchTaskHandle::spawn(context, client.clone(), selector, sender);

        timeout_after(1, server).await;
        assert_eq!(client.cursor().get().await, 250);
        // No event reached the channel for the too-old error itself.
        assert!(receiver.try_recv().is_none());

        task.stop().await;
    }

    /// S4: stopping a watch mid-stream tears the task down without
    /// delivering anything past what was already in flight, and the channel
    /// produces nothing further afterward.
    #[tokio::test]
    async fn stop_during_watch_ends_task_without_further_events() {
        let (service, handle) = mock::pair::<Request<Body>, Response<Full<Bytes>>>();
        let context = test_context();
        let client = Arc::new(ApiClient::with_service(context.clone(), service));
        let selector = ObjectSelector::new(ApiResource::pods()).in_namespace("default").unwrap();

        let server = tokio::spawn(async move {
            let (_, send) = handle.next_request().await.expect("watch request");
            send.send_response(ndjson_response(&[serde_json::json!({
                "type": "ADDED",
                "object": {"metadata": {"name": "a", "resourceVersion": "1"}},
            })]));
            // Deliberately never answers a further request: the task should
            // be stopped before it reconnects, not leave this hanging.
        });

        let (sender, mut receiver) = kubescope_core::object_event_channel();
        let task = WatchTaskHandle::spawn(context, client, selector, sender);

        let added = receiver.recv_async().await.expect("Added(a) event");
        assert_eq!(added.action, Action::Added);

        task.stop().await;
        assert!(receiver.try_recv().is_none());

        server.abort();
    }
}
