//! Ties invocations to prompt versions: append a pending history entry,
//! run the request through the pipeline, record the outcome on that entry.

use crate::error::InvokeError;
use crate::events::SessionEvent;
use crate::pipeline::{InvokeHandle, InvokeResult};
use crate::service::ModelService;
use crate::session::Session;
use crate::tree::{InvokeEntry, NodeId};
use crate::types::ModelRequest;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A history entry waiting for its outcome.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingInvocation {
    pub node_id: NodeId,
    pub entry_index: usize,
    pub request: ModelRequest,
}

#[derive(Clone)]
pub struct InvocationRecorder {
    service: Arc<ModelService>,
}

impl InvocationRecorder {
    pub fn new(service: Arc<ModelService>) -> Self {
        Self { service }
    }

    /// Append a pending entry to version `node_id` and return what to submit.
    pub fn begin(
        &self,
        session: &mut Session,
        node_id: NodeId,
    ) -> Result<PendingInvocation, InvokeError> {
        let request = session
            .compile_request(node_id)
            .ok_or(InvokeError::UnknownNode(node_id.0))?;
        let node = session
            .tree_mut()
            .node_mut(node_id)
            .ok_or(InvokeError::UnknownNode(node_id.0))?;

        node.invoke_history.push(InvokeEntry::pending(request.clone()));
        let entry_index = node.invoke_history.len() - 1;
        session.events().publish(SessionEvent::StateChanged);

        debug!(node = %node_id, entry = entry_index, model = %request.model, "invocation recorded");
        Ok(PendingInvocation {
            node_id,
            entry_index,
            request,
        })
    }

    pub fn submit(&self, pending: &PendingInvocation) -> InvokeHandle {
        self.service.submit(pending.request.clone())
    }

    /// Record the outcome on the pending entry. Does nothing if the version
    /// is gone (e.g. extracted away) or the entry was already completed.
    pub fn complete(&self, session: &mut Session, pending: &PendingInvocation, result: &InvokeResult) {
        let Some(entry) = session
            .tree_mut()
            .node_mut(pending.node_id)
            .and_then(|node| node.invoke_history.get_mut(pending.entry_index))
        else {
            warn!(node = %pending.node_id, "version vanished before its invocation finished");
            return;
        };
        if !entry.is_pending() {
            return;
        }

        match result {
            Ok(response) => entry.resolve(response.clone()),
            Err(err) => entry.reject(err),
        }
        session.events().publish(SessionEvent::StateChanged);
    }

    /// Invoke version `node_id`. The session lock is released while the
    /// request waits in the pipeline.
    pub async fn invoke(&self, session: &Mutex<Session>, node_id: NodeId) -> InvokeResult {
        let (pending, handle) = {
            let mut guard = session.lock().await;
            let pending = self.begin(&mut guard, node_id)?;
            let handle = self.submit(&pending);
            (pending, handle)
        };

        let result = handle.await;
        self.complete(&mut *session.lock().await, &pending, &result);
        result
    }

    pub async fn invoke_selected(&self, session: &Mutex<Session>) -> InvokeResult {
        let selected = session.lock().await.tree().selected();
        let node_id = selected.ok_or(InvokeError::NoSelection)?;
        self.invoke(session, node_id).await
    }
}
