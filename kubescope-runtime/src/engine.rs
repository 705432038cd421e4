//! The single background execution context that owns every cluster loop.
//! Grounded on `original_source/kube/async_loop.py`'s `AsyncLoop`: a
//! thread running its own event loop, a `cluster_loops` map filled in on
//! demand by `get_cluster_loop`, and `launch_coro`/`run_coro_until_completion`
//! helpers for calling async code from a foreign thread. That original
//! `run_coro_until_completion` busy-waits on `future.done()` in a
//! `time.sleep(0.001)` loop; `run_until_complete` here replaces that with a
//! completion signal instead.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use kubescope_client::BuildError;
use kubescope_core::Context;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};

use crate::cluster_loop::ClusterLoop;

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Returned by a dispatch call whose result will never arrive because the
/// engine shut down first.
#[derive(Debug, thiserror::Error)]
#[error("engine shut down before the request completed")]
pub struct Cancelled;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

struct EngineState {
    cluster_loops: Mutex<HashMap<Arc<Context>, Arc<ClusterLoop>>>,
}

async fn get_or_create_cluster_loop(state: &EngineState, context: Arc<Context>) -> Result<Arc<ClusterLoop>, BuildError> {
    let mut loops = state.cluster_loops.lock().await;
    if let Some(existing) = loops.get(&context) {
        return Ok(existing.clone());
    }
    let cluster_loop = Arc::new(ClusterLoop::new(context.clone())?);
    cluster_loop.start_supervisor();
    loops.insert(context, cluster_loop.clone());
    Ok(cluster_loop)
}

async fn driver_loop(mut commands: mpsc::UnboundedReceiver<BoxFuture>, shutdown: Arc<Notify>) {
    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(fut) => {
                    tokio::spawn(fut);
                }
                None => break,
            },
            _ = shutdown.notified() => break,
        }
    }
}

/// Single host of all cluster loops, process-wide. Lives on its own
/// dedicated OS thread running a single-threaded Tokio runtime: every
/// piece of engine state (cluster loops, watch tasks, HTTP connections)
/// only ever runs there, per the spec's single-threaded-cooperative-
/// scheduler requirement. `AsyncEngine` itself is a plain `Send + Sync`
/// value any thread can hold and dispatch through.
pub struct AsyncEngine {
    state: Arc<EngineState>,
    command_tx: mpsc::UnboundedSender<BoxFuture>,
    shutdown_notify: Arc<Notify>,
    shutdown_started: AtomicBool,
    join: StdMutex<Option<std::thread::JoinHandle<()>>>,
}

impl AsyncEngine {
    /// Create the engine, start its driver loop on a new OS thread, and
    /// block the calling thread until the engine's runtime is up and ready
    /// to accept dispatches.
    pub fn launch_in_background_thread() -> Arc<Self> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
        let shutdown_notify = Arc::new(Notify::new());
        let state = Arc::new(EngineState {
            cluster_loops: Mutex::new(HashMap::new()),
        });

        let thread_shutdown = shutdown_notify.clone();
        let join = std::thread::Builder::new()
            .name("kubescope-engine".to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build kubescope engine runtime");
                let _ = ready_tx.send(());
                runtime.block_on(driver_loop(command_rx, thread_shutdown));
            })
            .expect("failed to spawn kubescope engine thread");

        // Block until the engine thread has a runtime up; `command_tx` is
        // an unbounded queue so sends would "succeed" even before this,
        // but callers expect a running engine, not just a mailbox.
        let _ = ready_rx.recv();

        Arc::new(Self {
            state,
            command_tx,
            shutdown_notify,
            shutdown_started: AtomicBool::new(false),
            join: StdMutex::new(Some(join)),
        })
    }

    /// Get-or-create the `ClusterLoop` for `context`, waiting for it to
    /// finish constructing its `ApiClient`.
    pub fn get_cluster_loop(&self, context: Arc<Context>) -> Result<Arc<ClusterLoop>, EngineError> {
        let state = self.state.clone();
        let result = self.run_until_complete(async move { get_or_create_cluster_loop(&state, context).await })?;
        Ok(result?)
    }

    /// Fire-and-forget: schedule `fut` on the engine thread and return
    /// immediately.
    pub fn launch<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let _ = self.command_tx.send(Box::pin(fut));
    }

    /// Block the calling thread until `fut`, run on the engine thread,
    /// resolves. Uses a completion signal, never a busy-wait: the calling
    /// thread parks on a oneshot receiver.
    pub fn run_until_complete<F, T>(&self, fut: F) -> Result<T, Cancelled>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let wrapped = async move {
            let result = fut.await;
            let _ = tx.send(result);
        };
        if self.command_tx.send(Box::pin(wrapped)).is_err() {
            return Err(Cancelled);
        }
        rx.blocking_recv().map_err(|_| Cancelled)
    }

    /// Cancel every outstanding task across every cluster loop and join the
    /// engine thread. Idempotent: a second call is a no-op.
    pub fn shutdown(&self) {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let state = self.state.clone();
        // Wait for every cluster loop to finish tearing down its watch and
        // log-stream tasks before telling the driver loop to stop, so no
        // in-flight cleanup command is dropped on the floor.
        let _ = self.run_until_complete(async move {
            let loops: Vec<_> = state.cluster_loops.lock().await.values().cloned().collect();
            for cluster_loop in loops {
                cluster_loop.shutdown().await;
            }
        });

        self.shutdown_notify.notify_one();
        if let Some(handle) = self.join.lock().expect("engine join mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}
