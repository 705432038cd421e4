//! HTTP client for the kubescope async engine: authentication, TLS,
//! deterministic URL construction, and the single-attempt list/watch/
//! discovery/log-stream primitives the runtime drives its reconnect loops
//! on top of.

mod auth;
mod body;
mod client;
mod cursor;
mod tls;
mod url;

pub use auth::{Auth, AuthProvider, AuthRefreshError};
pub use body::Body;
pub use client::{ApiClient, BuildError, ClientError, WatchItem};
pub use cursor::ResourceVersionCursor;
pub use tls::{client_config, Error as TlsError};
pub use url::{api_groups_url, api_resources_url, list_or_watch_url, pod_log_url};
