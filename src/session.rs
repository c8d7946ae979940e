//! The editing session: version tree, variables and the event bus they report to.

use crate::error::StateError;
use crate::events::{EventBus, SessionEvent};
use crate::state::{SessionState, StateStore};
use crate::tree::{NodeId, VersionTree};
use crate::types::{ModelRequest, StopWords};
use crate::variables::Variables;
use tokio::sync::broadcast;
use tracing::info;

/// Owns all mutable editing state. Callers needing shared access wrap it in
/// a single lock so tree mutations stay serialized.
#[derive(Debug)]
pub struct Session {
    tree: VersionTree,
    variables: Variables,
    events: EventBus,
}

impl Session {
    pub fn new() -> Self {
        Self::with_events(EventBus::new())
    }

    pub fn with_events(events: EventBus) -> Self {
        Self {
            tree: VersionTree::new(events.clone()),
            variables: Variables::new(),
            events,
        }
    }

    pub fn tree(&self) -> &VersionTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut VersionTree {
        &mut self.tree
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn add_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.set(name, value);
        self.variables_changed();
    }

    pub fn delete_variable(&mut self, name: &str) {
        self.variables.remove(name);
        self.variables_changed();
    }

    fn variables_changed(&self) {
        self.events
            .publish(SessionEvent::VariablesChanged(self.variables.as_map().clone()));
        self.events.publish(SessionEvent::StateChanged);
    }

    /// Request to send for version `id`: variables substituted into every
    /// message and stop words split into a list.
    pub fn compile_request(&self, id: NodeId) -> Option<ModelRequest> {
        let node = self.tree.get(id)?;

        let mut options = node.options.clone();
        options.stop_words = options
            .stop_words
            .as_ref()
            .and_then(StopWords::compile)
            .map(StopWords::List);

        Some(
            ModelRequest::new(node.model.clone(), self.variables.compile_messages(&node.messages))
                .with_options(options),
        )
    }

    pub fn snapshot(&self) -> SessionState {
        SessionState {
            forest: self.tree.forest().clone(),
            selected_node_id: self.tree.selected(),
            selected_timeline_node_id: self.tree.timeline(),
            variables: self.variables.clone(),
        }
    }

    /// Replace everything with `state`.
    pub fn restore(&mut self, state: SessionState) {
        self.tree = VersionTree::from_parts(
            state.forest,
            state.selected_node_id,
            state.selected_timeline_node_id,
            self.events.clone(),
        );
        self.variables = state.variables;

        self.events.publish(SessionEvent::StateLoaded);
        if let Some(selected) = self.tree.selected() {
            self.events.publish(SessionEvent::NodeSelected(Some(selected)));
        }
    }

    /// Empty tree, no selection, no variables. Publishes nothing.
    pub fn new_state(&mut self) {
        self.tree.reset();
        self.variables = Variables::new();
    }

    /// Restore from `store`. Returns false, leaving the session untouched,
    /// when nothing was saved.
    pub fn load(&mut self, store: &dyn StateStore) -> Result<bool, StateError> {
        let Some(state) = store.load()? else {
            return Ok(false);
        };
        self.restore(state);
        info!(versions = self.tree.forest().len(), "session state loaded");
        Ok(true)
    }

    pub fn save(&self, store: &dyn StateStore) -> Result<(), StateError> {
        store.save(&self.snapshot())
    }

    /// Reset to a new state and persist it.
    pub fn delete(&mut self, store: &dyn StateStore) -> Result<(), StateError> {
        self.new_state();
        self.save(store)?;
        self.events.publish(SessionEvent::StateChanged);
        self.events.publish(SessionEvent::NodeSelected(None));
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
