//! Persisted session state and where it is kept.

use crate::error::StateError;
use crate::tree::{Forest, NodeId};
use crate::variables::Variables;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Everything needed to restore a session. The blob is opaque to callers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(default)]
    pub forest: Forest,
    #[serde(default)]
    pub selected_node_id: Option<NodeId>,
    #[serde(default)]
    pub selected_timeline_node_id: Option<NodeId>,
    #[serde(default)]
    pub variables: Variables,
}

pub trait StateStore {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<SessionState>, StateError>;
    fn save(&self, state: &SessionState) -> Result<(), StateError>;
}

/// JSON file on local disk.
#[derive(Clone, Debug)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StateError {
        StateError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<Option<SessionState>, StateError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_error(err)),
        };
        let state = serde_json::from_str(&raw)?;
        debug!(path = %self.path.display(), "loaded session state");
        Ok(Some(state))
    }

    fn save(&self, state: &SessionState) -> Result<(), StateError> {
        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|err| self.io_error(err))?;
        }
        let raw = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, raw).map_err(|err| self.io_error(err))?;
        debug!(path = %self.path.display(), "saved session state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("state.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("nested/deeper/state.json"));

        let mut state = SessionState::default();
        state.variables.set("topic", "rust");
        store.save(&state).unwrap();

        assert_eq!(store.load().unwrap(), Some(state));
    }

    #[test]
    fn garbage_is_reported_as_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();

        let err = FileStateStore::new(path).load().unwrap_err();
        assert!(matches!(err, StateError::Malformed(_)));
    }

    #[test]
    fn blob_uses_camel_case_keys() {
        let value = serde_json::to_value(SessionState::default()).unwrap();
        assert!(value.get("selectedNodeId").is_some());
        assert!(value.get("selectedTimelineNodeId").is_some());
        assert!(value["forest"]["roots"].as_array().unwrap().is_empty());
    }
}
