use super::{BackendResult, ModelBackend};
use crate::error::BackendError;
use crate::types::{ChatMessage, InvokeResponse, ModelRequest, ResponseStats};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub struct OllamaBackend {
    client: Client,
    base_url: String,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn chat_endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    fn tags_endpoint(&self) -> String {
        format!("{}/api/tags", self.base_url)
    }
}

#[derive(Debug, Serialize)]
pub struct OllamaChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
    /// `-1` keeps the model loaded between calls.
    pub keep_alive: i64,
    pub options: OllamaOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OllamaOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: f32,
    pub num_ctx: i32,
    pub num_predict: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl<'a> OllamaChatRequest<'a> {
    pub fn from_request(request: &'a ModelRequest) -> Self {
        let options = &request.options;
        Self {
            model: &request.model,
            messages: &request.messages,
            stream: false,
            keep_alive: -1,
            options: OllamaOptions {
                temperature: options.temperature,
                top_p: options.top_p,
                top_k: options.top_k,
                num_ctx: options.num_ctx,
                num_predict: options.num_predict,
                seed: options.seed,
                stop: options.stop_words.as_ref().and_then(|words| words.compile()),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
pub struct OllamaChatResponse {
    message: Option<OllamaMessage>,
    #[serde(flatten)]
    stats: ResponseStats,
}

impl OllamaChatResponse {
    pub fn into_response(self, request: &ModelRequest) -> InvokeResponse {
        let (role, content) = self
            .message
            .map(|msg| (msg.role, msg.content))
            .unwrap_or_default();
        InvokeResponse {
            content,
            role,
            stats: self.stats,
            options: request.options.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaModelTag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModelTag>,
}

pub(crate) fn parse_tags(body: &str) -> BackendResult<Vec<String>> {
    let parsed: OllamaTagsResponse = serde_json::from_str(body)?;
    let mut names: Vec<String> = parsed.models.into_iter().map(|m| m.name).collect();
    names.sort();
    Ok(names)
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    async fn chat(&self, request: &ModelRequest) -> BackendResult<InvokeResponse> {
        let response = self
            .client
            .post(self.chat_endpoint())
            .json(&OllamaChatRequest::from_request(request))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaChatResponse = serde_json::from_str(&body)?;
        Ok(parsed.into_response(request))
    }

    async fn list_models(&self) -> BackendResult<Vec<String>> {
        let response = self.client.get(self.tags_endpoint()).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            parse_tags(&body)
        } else {
            Err(BackendError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}
