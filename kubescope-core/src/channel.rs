//! Bounded, multi-producer/single-consumer queues.
//!
//! A [`WatchTask`](../kubescope_runtime/struct.WatchTask.html) producer runs
//! on the engine thread; the matching [`Receiver`] lives with an arbitrary
//! external consumer thread (UI, FUSE, log viewer). `send` never blocks the
//! engine thread: a full queue means a slow consumer, and the producer
//! drops the event rather than stall cluster-loop progress.

use crate::event::{ConnectivityEvent, ObjectEvent};

/// Default bound for event queues. Generous enough to absorb a burst (e.g.
/// an initial list of a few thousand pods) without the consumer having
/// drained anything yet.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Producer half of a bounded channel.
#[derive(Debug, Clone)]
pub struct Sender<T> {
    inner: tokio::sync::mpsc::Sender<T>,
}

impl<T> Sender<T> {
    /// Non-blocking: drops `value` (logging at debug) if the queue is full
    /// or the receiver has gone away, rather than stall the caller.
    pub fn send(&self, value: T) {
        if let Err(err) = self.inner.try_send(value) {
            match err {
                tokio::sync::mpsc::error::TrySendError::Full(_) => {
                    tracing::debug!("event channel full, dropping event");
                }
                tokio::sync::mpsc::error::TrySendError::Closed(_) => {
                    tracing::debug!("event channel closed, dropping event");
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Consumer half of a bounded channel, usable from synchronous or
/// asynchronous callers.
#[derive(Debug)]
pub struct Receiver<T> {
    inner: tokio::sync::mpsc::Receiver<T>,
}

impl<T> Receiver<T> {
    /// Blocks the calling (synchronous) thread until an event arrives or the
    /// channel is closed. Must not be called from within a Tokio worker
    /// thread; it is meant for a plain OS thread driving a UI surface.
    pub fn recv(&mut self) -> Option<T> {
        self.inner.blocking_recv()
    }

    /// Non-blocking poll, for a surface that drains the queue on its own
    /// schedule (e.g. a render loop).
    pub fn try_recv(&mut self) -> Option<T> {
        self.inner.try_recv().ok()
    }

    /// Async `recv`, for callers already on the engine thread.
    pub async fn recv_async(&mut self) -> Option<T> {
        self.inner.recv().await
    }
}

/// Create a bounded channel of the default capacity.
pub fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = tokio::sync::mpsc::channel(capacity);
    (Sender { inner: tx }, Receiver { inner: rx })
}

pub fn object_event_channel() -> (Sender<ObjectEvent>, Receiver<ObjectEvent>) {
    bounded(DEFAULT_CAPACITY)
}

pub fn connectivity_channel() -> (Sender<ConnectivityEvent>, Receiver<ConnectivityEvent>) {
    bounded(DEFAULT_CAPACITY)
}

/// One-shot exit signal used to tell a polling loop (the connectivity
/// detector) to stop at its next wakeup, mirroring the original's
/// `channels/exit.py`.
#[derive(Debug, Clone)]
pub struct ExitSender {
    inner: tokio::sync::watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct ExitReceiver {
    inner: tokio::sync::watch::Receiver<bool>,
}

impl ExitSender {
    pub fn send_exit(&self) {
        // Ignore the error: it only fires if every receiver already
        // dropped, which means nobody is left to care that we exited.
        let _ = self.inner.send(true);
    }
}

impl ExitReceiver {
    pub fn should_exit(&self) -> bool {
        *self.inner.borrow()
    }

    pub async fn wait_for_exit(&mut self) {
        let _ = self.inner.wait_for(|exit| *exit).await;
    }
}

pub fn exit_channel() -> (ExitSender, ExitReceiver) {
    let (tx, rx) = tokio::sync::watch::channel(false);
    (ExitSender { inner: tx }, ExitReceiver { inner: rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_then_recv_blocking() {
        let (tx, mut rx) = bounded::<i32>(4);
        tx.send(1);
        tx.send(2);
        assert_eq!(rx.recv(), Some(1));
        assert_eq!(rx.try_recv(), Some(2));
        assert_eq!(rx.try_recv(), None);
    }

    #[test]
    fn full_queue_drops_rather_than_blocks() {
        let (tx, mut rx) = bounded::<i32>(1);
        tx.send(1);
        tx.send(2); // dropped: queue already holds one item
        assert_eq!(rx.recv(), Some(1));
        assert_eq!(rx.try_recv(), None);
    }

    #[tokio::test]
    async fn exit_channel_wakes_waiter() {
        let (tx, mut rx) = exit_channel();
        assert!(!rx.should_exit());
        tx.send_exit();
        rx.wait_for_exit().await;
        assert!(rx.should_exit());
    }
}
