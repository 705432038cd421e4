//! Periodic reachability probe for a cluster's API server. Grounded on
//! `original_source/kube/connectivity.py`'s `ConnectivityDetector`/
//! `ConnectivityState`: poll a trivial endpoint on an interval, track
//! reachable/unreachable transitions, and emit one event per transition
//! (not one per poll).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use kubescope_core::{Context, Sender};
use tokio::task::JoinHandle;

use crate::cluster_loop::ClusterLoop;

/// `GET /livez` with a short timeout: any response at all — even a 401 —
/// proves there is an HTTP server reachable at the other end. Matches the
/// original's path and rationale exactly.
const PROBE_PATH: &str = "/livez";
const PROBE_TIMEOUT: Duration = Duration::from_secs(4);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

struct ConnectivityState {
    is_reachable: AtomicBool,
    time_last_reachable: std::sync::Mutex<Option<SystemTime>>,
    time_last_unreachable: std::sync::Mutex<Option<SystemTime>>,
}

impl ConnectivityState {
    fn new() -> Self {
        Self {
            // Unreachable until proven otherwise, matching the original's
            // pessimistic starting assumption.
            is_reachable: AtomicBool::new(false),
            time_last_reachable: std::sync::Mutex::new(None),
            time_last_unreachable: std::sync::Mutex::new(None),
        }
    }

    /// Records a probe result and returns the transition event to emit, if
    /// this probe actually changed the state.
    fn report(&self, context: &Arc<Context>, reachable: bool) -> Option<kubescope_core::ConnectivityEvent> {
        let now = SystemTime::now();
        let was_reachable = self.is_reachable.swap(reachable, Ordering::SeqCst);
        let event = if reachable && !was_reachable {
            let last_reachable = *self.time_last_reachable.lock().expect("connectivity state mutex poisoned");
            let last_unreachable = *self.time_last_unreachable.lock().expect("connectivity state mutex poisoned");
            Some(kubescope_core::ConnectivityEvent::BecameReachable {
                context: context.clone(),
                time_last_reachable: last_reachable,
                time_last_unreachable: last_unreachable,
            })
        } else if !reachable && was_reachable {
            let last_reachable = *self.time_last_reachable.lock().expect("connectivity state mutex poisoned");
            let last_unreachable = *self.time_last_unreachable.lock().expect("connectivity state mutex poisoned");
            Some(kubescope_core::ConnectivityEvent::BecameUnreachable {
                context: context.clone(),
                time_last_reachable: last_reachable,
                time_last_unreachable: last_unreachable,
            })
        } else {
            None
        };

        if reachable {
            *self.time_last_reachable.lock().expect("connectivity state mutex poisoned") = Some(now);
        } else {
            *self.time_last_unreachable.lock().expect("connectivity state mutex poisoned") = Some(now);
        }

        event
    }
}

async fn probe_once(cluster_loop: &ClusterLoop) -> bool {
    let client = cluster_loop.get_client().await;
    client.probe(PROBE_PATH, PROBE_TIMEOUT).await
}

/// Polls `cluster_loop`'s API server every `poll_interval` and sends a
/// [`kubescope_core::ConnectivityEvent`] on `sender` whenever reachability
/// changes. Runs until `exit` fires.
pub async fn run(
    context: Arc<Context>,
    cluster_loop: Arc<ClusterLoop>,
    sender: Sender<kubescope_core::ConnectivityEvent>,
    poll_interval: Duration,
    mut exit: kubescope_core::ExitReceiver,
) {
    let state = ConnectivityState::new();

    loop {
        let loop_start = Instant::now();
        let reachable = probe_once(&cluster_loop).await;
        let elapsed = loop_start.elapsed();

        tracing::info!(
            context = %context.short_name,
            outcome = if reachable { "reachable" } else { "unreachable" },
            elapsed_ms = elapsed.as_millis() as u64,
            "completed connectivity probe"
        );

        if let Some(event) = state.report(&context, reachable) {
            sender.send(event);
        }

        let wait = poll_interval.saturating_sub(elapsed).max(Duration::from_secs(1));
        tokio::select! {
            _ = exit.wait_for_exit() => {
                tracing::info!(context = %context.short_name, "connectivity detector shutting down");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

/// Spawn the connectivity probe loop for `cluster_loop`, returning the
/// `ConnectivityEvent` receiver and a handle whose `Drop`/explicit
/// `send_exit` stops it.
pub struct ConnectivityDetectorHandle {
    exit: kubescope_core::ExitSender,
    join: JoinHandle<()>,
}

impl ConnectivityDetectorHandle {
    pub fn spawn(
        context: Arc<Context>,
        cluster_loop: Arc<ClusterLoop>,
        poll_interval: Duration,
    ) -> (Self, kubescope_core::Receiver<kubescope_core::ConnectivityEvent>) {
        let (sender, receiver) = kubescope_core::connectivity_channel();
        let (exit_tx, exit_rx) = kubescope_core::exit_channel();
        let join = tokio::spawn(run(context, cluster_loop, sender, poll_interval, exit_rx));
        (Self { exit: exit_tx, join }, receiver)
    }

    pub fn spawn_default(context: Arc<Context>, cluster_loop: Arc<ClusterLoop>) -> (Self, kubescope_core::Receiver<kubescope_core::ConnectivityEvent>) {
        Self::spawn(context, cluster_loop, DEFAULT_POLL_INTERVAL)
    }

    pub async fn stop(self) {
        self.exit.send_exit();
        let _ = self.join.await;
    }
}

impl Drop for ConnectivityDetectorHandle {
    fn drop(&mut self) {
        self.join.abort();
    }
}
