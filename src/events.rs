//! Engine events and the subscriber registry.
//!
//! Events fire after the transaction that produced them has committed,
//! never before. Subscribers run synchronously on the emitting thread.

use std::sync::{Arc, Mutex};

/// Coordinator role within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// This process holds the ownership row and performs writes.
    Owner,
    /// Another live process owns the store; this one only serves queries.
    Reader,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Owner => write!(f, "owner"),
            Role::Reader => write!(f, "reader"),
        }
    }
}

/// Kind of filesystem change observed for a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// Events emitted by the engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// An index run committed. Paths are project-root-relative.
    Indexed {
        changed: Vec<String>,
        deleted: Vec<String>,
    },
    /// A single file change was observed by the watcher.
    FileChanged { path: String, kind: ChangeKind },
    /// This process changed role.
    RoleChanged(Role),
    /// A recoverable failure that must not be swallowed (watcher I/O,
    /// ownership refresh, per-event read errors).
    Error(String),
}

type Subscriber = Box<dyn Fn(&EngineEvent) + Send>;

/// Subscriber registry shared between the facade and its worker loop.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Subscribers are never removed; the bus lives
    /// as long as the engine.
    pub fn subscribe(&self, f: impl Fn(&EngineEvent) + Send + 'static) {
        self.subscribers.lock().unwrap().push(Box::new(f));
    }

    /// Deliver an event to every subscriber, in registration order.
    pub fn emit(&self, event: EngineEvent) {
        let subscribers = self.subscribers.lock().unwrap();
        for subscriber in subscribers.iter() {
            subscriber(&event);
        }
    }
}
