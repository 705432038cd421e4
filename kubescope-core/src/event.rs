use std::sync::Arc;
use std::time::SystemTime;

use crate::context::Context;
use crate::error::ApiError;

/// What kind of change an [`ObjectEvent`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Emitted once per item during the initial list.
    Listed,
    Added,
    Modified,
    Deleted,
    /// A line of pod log output.
    LogLine,
    /// A terminal failure for this selector's stream. No further events
    /// follow on this channel for this selector.
    Error,
}

/// The payload carried by an [`ObjectEvent`], shaped by its `Action`.
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// A decoded API object (for `Listed`/`Added`/`Modified`/`Deleted`).
    Object(serde_json::Value),
    /// A line of pod log output (for `LogLine`).
    LogLine(Vec<u8>),
    /// A terminal error (for `Action::Error`).
    Error(EventError),
}

/// The error sentinel payload: either a classified API error or an opaque
/// transport/parse failure message.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EventError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("{0}")]
    Transport(String),
}

/// A single change notification for an object stream, or a log line, or a
/// terminal error — always tagged with the cluster `Context` it came from
/// so a multi-cluster consumer can tell streams apart after fan-in.
#[derive(Debug, Clone)]
pub struct ObjectEvent {
    pub context: Arc<Context>,
    pub action: Action,
    pub payload: EventPayload,
    pub time_created: SystemTime,
}

impl ObjectEvent {
    pub fn new(context: Arc<Context>, action: Action, payload: EventPayload) -> Self {
        Self {
            context,
            action,
            payload,
            time_created: SystemTime::now(),
        }
    }

    pub fn listed(context: Arc<Context>, object: serde_json::Value) -> Self {
        Self::new(context, Action::Listed, EventPayload::Object(object))
    }

    pub fn error(context: Arc<Context>, error: EventError) -> Self {
        Self::new(context, Action::Error, EventPayload::Error(error))
    }

    /// `metadata.resourceVersion` of the carried object, if this event has
    /// one (i.e. it's not a log line or an error sentinel).
    pub fn resource_version(&self) -> Option<u64> {
        match &self.payload {
            EventPayload::Object(value) => value
                .get("metadata")?
                .get("resourceVersion")?
                .as_str()?
                .parse()
                .ok(),
            _ => None,
        }
    }
}

/// A reachability transition for a cluster's API server, produced by an
/// optional `ConnectivityDetector` polling loop.
#[derive(Debug, Clone)]
pub enum ConnectivityEvent {
    BecameReachable {
        context: Arc<Context>,
        time_last_reachable: Option<SystemTime>,
        time_last_unreachable: Option<SystemTime>,
    },
    BecameUnreachable {
        context: Arc<Context>,
        time_last_reachable: Option<SystemTime>,
        time_last_unreachable: Option<SystemTime>,
    },
}
