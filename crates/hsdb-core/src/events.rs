//! Progress events for display layers.
//!
//! Publishing never blocks and is a no-op when nobody subscribed.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

/// The two evidence paths of dual-path fusion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EvidencePath {
    Table,
    Manual,
}

impl fmt::Display for EvidencePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Self::Table => "table", Self::Manual => "manual" })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    GroupStarted { group: usize, documents: usize },
    GroupCompleted { group: usize, duration_ms: u128 },
    GroupFailed { group: usize, reason: String },
    PathCompleted { path: EvidencePath, candidates: usize, duration_ms: u128 },
    PathFailed { path: EvidencePath, reason: String },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> { self.tx.subscribe() }
}

impl Default for EventBus {
    fn default() -> Self { Self::new(256) }
}
