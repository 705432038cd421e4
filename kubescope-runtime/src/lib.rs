//! The kubescope async engine: the list-then-watch state machine, the
//! per-cluster task registry, the single background execution context
//! every cluster shares, and the synchronous facade a consuming thread
//! drives it through.

mod cluster_loop;
mod connectivity;
mod engine;
mod facade;
mod log_task;
mod watch_task;

pub use cluster_loop::{ClusterLoop, NoSuchLogStreamError, NoSuchWatchError};
pub use connectivity::ConnectivityDetectorHandle;
pub use engine::{AsyncEngine, Cancelled, EngineError};
pub use facade::{Facade, FacadeError};
pub use log_task::LogTaskHandle;
pub use watch_task::WatchTaskHandle;
