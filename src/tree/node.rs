use crate::error::ValidationError;
use crate::types::{ChatMessage, InvokeResponse, ModelRequest, RequestOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use time::macros::format_description;

/// Identifier of a prompt version. Unique within a forest and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Candidate content for a new prompt version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    #[serde(rename = "requestOptions")]
    pub options: RequestOptions,
}

impl Draft {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>, options: RequestOptions) -> Self {
        Self {
            messages,
            model: model.into(),
            options,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.model.trim().is_empty() {
            return Err(ValidationError::EmptyModel);
        }
        if self.messages.is_empty() {
            return Err(ValidationError::NoMessages);
        }
        Ok(())
    }

    /// Same messages (role and content, in order), model and every option.
    pub fn matches(&self, node: &VersionNode) -> bool {
        self.messages == node.messages && self.model == node.model && self.options == node.options
    }
}

/// One invocation of a prompt version: the request as sent and, once the
/// pipeline resolves it, the outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeEntry {
    pub request: ModelRequest,
    #[serde(with = "time::serde::rfc3339")]
    pub request_timestamp: OffsetDateTime,
    pub has_response: bool,
    #[serde(default)]
    pub response: Option<InvokeResponse>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub response_timestamp: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InvokeEntry {
    pub fn pending(request: ModelRequest) -> Self {
        Self {
            request,
            request_timestamp: OffsetDateTime::now_utc(),
            has_response: false,
            response: None,
            response_timestamp: None,
            error: None,
        }
    }

    /// Still waiting on the pipeline.
    pub fn is_pending(&self) -> bool {
        self.response_timestamp.is_none()
    }

    pub fn resolve(&mut self, response: InvokeResponse) {
        self.response = Some(response);
        self.has_response = true;
        self.response_timestamp = Some(OffsetDateTime::now_utc());
    }

    pub fn reject(&mut self, error: impl fmt::Display) {
        self.error = Some(error.to_string());
        self.response_timestamp = Some(OffsetDateTime::now_utc());
    }
}

/// A prompt version. Children are referenced by id; the owning [`Forest`]
/// holds the nodes themselves.
///
/// [`Forest`]: super::Forest
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionNode {
    pub id: NodeId,
    #[serde(default)]
    pub previous_version_id: Option<NodeId>,
    pub title: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(rename = "requestOptions")]
    pub options: RequestOptions,
    #[serde(default)]
    pub children: Vec<NodeId>,
    #[serde(default)]
    pub flagged: bool,
    #[serde(default)]
    pub invoke_history: Vec<InvokeEntry>,
    #[serde(default)]
    pub is_head: bool,
}

impl VersionNode {
    pub(crate) fn from_draft(id: NodeId, previous_version_id: Option<NodeId>, draft: Draft) -> Self {
        Self {
            id,
            previous_version_id,
            title: creation_title(),
            model: draft.model,
            messages: draft.messages,
            options: draft.options,
            children: Vec::new(),
            flagged: false,
            invoke_history: Vec::new(),
            is_head: true,
        }
    }

    pub fn draft(&self) -> Draft {
        Draft::new(self.model.clone(), self.messages.clone(), self.options.clone())
    }

    pub fn pending_invocations(&self) -> usize {
        self.invoke_history.iter().filter(|e| e.is_pending()).count()
    }
}

fn creation_title() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))
    .unwrap_or_default()
}
