//! Shared data model for the kubescope async engine.
//!
//! This crate has no network or filesystem I/O of its own: it defines the
//! value types that `kubescope-client` and `kubescope-runtime` pass between
//! each other and across the thread boundary to synchronous consumers
//! (a FUSE tree, a dashboard, a log viewer, ...).

mod channel;
mod context;
mod error;
mod event;
mod resource;
mod selector;

pub use channel::{
    bounded, connectivity_channel, exit_channel, object_event_channel, ExitReceiver, ExitSender,
    Receiver, Sender,
};
pub use context::{AuthConfig, Cluster, Context, ExecConfig, SecretStringEq, TrustMaterial, User};
pub use error::{ApiError, ApiErrorKind};
pub use event::{Action, ConnectivityEvent, EventError, EventPayload, ObjectEvent};
pub use resource::{ApiGroup, ApiResource};
pub use selector::{ClientOperationParams, LogStreamingParams, NotNamespacedError, ObjectSelector};
