//! Multi-cluster Kubernetes observer: re-exports the pieces a consumer
//! (a FUSE tree, a dashboard, a log viewer) needs to stand up an
//! [`AsyncEngine`] and talk to it through per-cluster [`Facade`]s.

pub use kubescope_client::{ApiClient, Auth, AuthProvider, AuthRefreshError, BuildError, ClientError, ResourceVersionCursor, TlsError, WatchItem};
pub use kubescope_core::{
    bounded, connectivity_channel, exit_channel, object_event_channel, Action, ApiError, ApiErrorKind, ApiGroup, ApiResource,
    AuthConfig, ClientOperationParams, Cluster, ConnectivityEvent, Context, EventError, EventPayload, ExecConfig, ExitReceiver,
    ExitSender, LogStreamingParams, NotNamespacedError, ObjectEvent, ObjectSelector, Receiver, SecretStringEq, Sender,
    TrustMaterial, User,
};
pub use kubescope_runtime::{
    AsyncEngine, Cancelled, ClusterLoop, ConnectivityDetectorHandle, EngineError, Facade, FacadeError, LogTaskHandle,
    NoSuchLogStreamError, NoSuchWatchError, WatchTaskHandle,
};
