//! In-process model backend used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use promptbench::ai::{BackendResult, ModelBackend};
use promptbench::config::PipelineConfig;
use promptbench::error::BackendError;
use promptbench::types::{ChatMessage, InvokeResponse, ModelRequest, ResponseStats};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Behaviour is picked from the last message's content:
/// - `sleep:<ms>` answers after `ms` milliseconds
/// - `fail` returns a backend error
/// - `hang` never answers
/// - anything else is echoed back immediately
#[derive(Default)]
pub struct ScriptedBackend {
    active: AtomicUsize,
    peak: AtomicUsize,
    seen: Mutex<Vec<ModelRequest>>,
    pub models: Vec<String>,
}

impl ScriptedBackend {
    pub fn with_models(models: &[&str]) -> Self {
        Self {
            models: models.iter().map(|m| m.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Highest number of calls observed running at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Requests in the order they reached the backend.
    pub fn seen(&self) -> Vec<ModelRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn chat(&self, request: &ModelRequest) -> BackendResult<InvokeResponse> {
        self.seen.lock().unwrap().push(request.clone());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let script = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let outcome = if let Some(ms) = script.strip_prefix("sleep:") {
            tokio::time::sleep(Duration::from_millis(ms.parse().unwrap())).await;
            Ok(echo(request, &script))
        } else if script == "fail" {
            Err(BackendError::Status {
                status: 500,
                body: "model exploded".to_string(),
            })
        } else if script == "hang" {
            std::future::pending::<()>().await;
            unreachable!()
        } else {
            Ok(echo(request, &script))
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    async fn list_models(&self) -> BackendResult<Vec<String>> {
        Ok(self.models.clone())
    }
}

fn echo(request: &ModelRequest, content: &str) -> InvokeResponse {
    InvokeResponse {
        content: content.to_string(),
        role: "assistant".to_string(),
        stats: ResponseStats::default(),
        options: request.options.clone(),
    }
}

pub fn request(content: &str) -> ModelRequest {
    ModelRequest::new("llama3", vec![ChatMessage::user(content)])
}

/// Short deadline and fast polling so tests finish quickly.
pub fn fast_config(max_concurrent: usize) -> PipelineConfig {
    PipelineConfig::default()
        .with_max_concurrent(max_concurrent)
        .with_invoke_timeout(Duration::from_secs(5))
        .with_poll_interval(Duration::from_millis(10))
}
