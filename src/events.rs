//! Session notifications for whoever renders the state.

use crate::tree::NodeId;
use std::collections::BTreeMap;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    NodeAdded(NodeId),
    NodeSelected(Option<NodeId>),
    NodeFlagged(NodeId),
    NodeUnflagged(NodeId),
    VariablesChanged(BTreeMap<String, String>),
    StateLoaded,
    StateChanged,
}

/// Fan-out of [`SessionEvent`]s. Publishing with no subscribers is fine.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: SessionEvent) {
        tracing::trace!(?event, "publishing session event");
        // Err only means nobody is listening.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
