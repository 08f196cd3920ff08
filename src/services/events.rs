//! Change notifications for the history log
//!
//! Synchronous observers register per event kind and are called in
//! subscription order. A panicking observer is logged and skipped; the
//! remaining observers still run. Every event is also forwarded to a tokio
//! broadcast channel for async consumers such as the SSE endpoint.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error};

use crate::models::LogEntry;

/// Change emitted by the history service
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum HistoryEvent {
    /// An entry was appended
    NouvelleEntree(LogEntry),
    /// A retention pass removed entries
    Nettoyage { removed: usize },
    /// The log was cleared
    HistoriqueVide,
}

impl HistoryEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            HistoryEvent::NouvelleEntree(_) => EventKind::NouvelleEntree,
            HistoryEvent::Nettoyage { .. } => EventKind::Nettoyage,
            HistoryEvent::HistoriqueVide => EventKind::HistoriqueVide,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    NouvelleEntree,
    Nettoyage,
    HistoriqueVide,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NouvelleEntree => "nouvelleEntree",
            EventKind::Nettoyage => "nettoyage",
            EventKind::HistoriqueVide => "historiqueVide",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nouvelleEntree" => Ok(EventKind::NouvelleEntree),
            "nettoyage" => Ok(EventKind::Nettoyage),
            "historiqueVide" => Ok(EventKind::HistoriqueVide),
            _ => Err(format!("Unknown history event: {}", s)),
        }
    }
}

/// Handle returned by [`EventNotifier::on`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&HistoryEvent) + Send + Sync>;

pub struct EventNotifier {
    handlers: Mutex<HashMap<EventKind, Vec<(SubscriptionId, Handler)>>>,
    next_id: AtomicU64,
    broadcast: broadcast::Sender<HistoryEvent>,
}

impl EventNotifier {
    pub fn new(channel_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            handlers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            broadcast: tx,
        }
    }

    /// Register `handler` for events of `kind`
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&HistoryEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler; returns whether it was registered
    pub fn off(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        match handlers.get_mut(&kind) {
            Some(list) => {
                let before = list.len();
                list.retain(|(sub, _)| *sub != id);
                list.len() < before
            }
            None => false,
        }
    }

    /// Async receiver of every future event
    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.broadcast.subscribe()
    }

    /// Deliver `event` to its handlers, then to broadcast subscribers.
    ///
    /// Returns the number of handlers that panicked.
    pub fn notify(&self, event: &HistoryEvent) -> usize {
        let kind = event.kind();
        let handlers: Vec<(SubscriptionId, Handler)> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        let mut failures = 0;
        for (id, handler) in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                failures += 1;
                error!(event = %kind, subscription = id.0, "History event handler panicked");
            }
        }

        if self.broadcast.send(event.clone()).is_err() {
            debug!(event = %kind, "No broadcast subscribers for history event");
        }

        failures
    }
}
