//! Reconnecting pod-log streamer. Structurally identical to
//! [`crate::watch_task`]'s reconnect loop: grounded on
//! `original_source/kube/client.py`'s `stream_pod_logs`/
//! `stream_pod_logs_attempt` pair.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kubescope_client::{ApiClient, ClientError};
use kubescope_core::{Action, ApiErrorKind, Context, EventError, EventPayload, ObjectEvent, ObjectSelector, Sender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const LOG_RETRY_DELAY: Duration = Duration::from_secs(1);

enum LogOutcome {
    /// Stream ended (EOF) or timed out: the server-side connection has a
    /// lifetime just like a watch's, so this is expected.
    Normal,
    Retryable,
    Fatal(ClientError),
}

fn to_event_error(err: ClientError) -> EventError {
    match err {
        ClientError::Api(api) => EventError::Api(api),
        ClientError::Connection(msg) | ClientError::Protocol(msg) => EventError::Transport(msg),
    }
}

fn classify(err: ClientError) -> LogOutcome {
    match err.kind() {
        ApiErrorKind::Retryable => LogOutcome::Retryable,
        // A log stream never carries a resourceVersion, so this can't
        // actually arise here; kept for parity with `watch_task::classify`
        // and with `original_source`, where a non-retryable-code ApiError
        // falls through to the fatal branch.
        ApiErrorKind::ResourceVersionTooOld | ApiErrorKind::Fatal => LogOutcome::Fatal(err),
    }
}

async fn stream_attempt(
    client: &ApiClient,
    selector: &ObjectSelector,
    tail_lines: u32,
    sender: &Sender<ObjectEvent>,
    context: &Arc<Context>,
) -> LogOutcome {
    let stream = match client.stream_pod_logs_once(selector, tail_lines).await {
        Ok(stream) => stream,
        Err(err) => return classify(err),
    };
    tokio::pin!(stream);

    while let Some(line) = stream.next().await {
        match line {
            Ok(bytes) => sender.send(ObjectEvent::new(context.clone(), Action::LogLine, EventPayload::LogLine(bytes))),
            Err(err) => return classify(err),
        }
    }
    LogOutcome::Normal
}

async fn sleep_or_cancel(delay: Duration, cancel: &mut oneshot::Receiver<()>) {
    tokio::select! {
        _ = &mut *cancel => {},
        _ = tokio::time::sleep(delay) => {},
    }
}

async fn run(
    context: Arc<Context>,
    client: Arc<ApiClient>,
    selector: ObjectSelector,
    tail_lines: u32,
    sender: Sender<ObjectEvent>,
    mut cancel: oneshot::Receiver<()>,
) {
    loop {
        let outcome = tokio::select! {
            _ = &mut cancel => return,
            outcome = stream_attempt(&client, &selector, tail_lines, &sender, &context) => outcome,
        };
        match outcome {
            LogOutcome::Normal => {
                tracing::debug!(selector = %selector.pretty(), "log stream closed, reconnecting");
                sleep_or_cancel(LOG_RETRY_DELAY, &mut cancel).await;
            }
            LogOutcome::Retryable => {
                tracing::warn!(selector = %selector.pretty(), "log stream failed with retryable error, reconnecting");
                sleep_or_cancel(LOG_RETRY_DELAY, &mut cancel).await;
            }
            LogOutcome::Fatal(err) => {
                tracing::error!(selector = %selector.pretty(), error = %err, "log stream failed with fatal error, terminating");
                sender.send(ObjectEvent::error(context.clone(), to_event_error(err)));
                return;
            }
        }
        if cancel.try_recv().is_ok() {
            return;
        }
    }
}

/// A handle to a spawned pod-log streaming task. Mirrors
/// [`crate::watch_task::WatchTaskHandle`].
pub struct LogTaskHandle {
    cancel: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl LogTaskHandle {
    pub fn spawn(
        context: Arc<Context>,
        client: Arc<ApiClient>,
        selector: ObjectSelector,
        tail_lines: u32,
        sender: Sender<ObjectEvent>,
    ) -> Self {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let join = tokio::spawn(run(context, client, selector, tail_lines, sender, cancel_rx));
        Self {
            cancel: Some(cancel_tx),
            join,
        }
    }

    pub async fn stop(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        let _ = (&mut self.join).await;
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl Drop for LogTaskHandle {
    fn drop(&mut self) {
        self.join.abort();
    }
}
