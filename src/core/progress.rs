//! Thread-safe progress reporting from the deploy worker to observers.
//!
//! The worker never touches observer-owned state: it only appends events to
//! the sink, and each observer drains its own subscription independently.
//! `emit` never blocks, so a stalled observer cannot stall the deploy.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Structured events emitted during a deploy run. Ordered, delivered
/// at-most-once per emission, never replayed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    LogLine { text: String, severity: Severity },
    StatusChange { text: String },
    Completed { success: bool, summary: String },
}

impl ProgressEvent {
    pub fn log(severity: Severity, text: impl Into<String>) -> Self {
        ProgressEvent::LogLine {
            text: text.into(),
            severity,
        }
    }

    pub fn status(text: impl Into<String>) -> Self {
        ProgressEvent::StatusChange { text: text.into() }
    }
}

/// Fan-out sink: one unbounded channel per subscriber. Subscribers only see
/// events emitted after they subscribed.
#[derive(Default)]
pub struct ProgressSink {
    subscribers: Mutex<Vec<Sender<ProgressEvent>>>,
}

impl ProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to every live subscriber. Disconnected subscribers
    /// are pruned.
    pub fn emit(&self, event: ProgressEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = channel();
        self.subscribers.lock().unwrap().push(tx);
        Subscription { rx }
    }
}

/// A lazy, ordered sequence of events from the point of subscription.
pub struct Subscription {
    rx: Receiver<ProgressEvent>,
}

impl Subscription {
    /// Block until the next event, or `None` once the sink is dropped.
    pub fn recv(&self) -> Option<ProgressEvent> {
        self.rx.recv().ok()
    }

    pub fn try_recv(&self) -> Option<ProgressEvent> {
        self.rx.try_recv().ok()
    }
}

impl Iterator for Subscription {
    type Item = ProgressEvent;

    fn next(&mut self) -> Option<ProgressEvent> {
        self.recv()
    }
}
