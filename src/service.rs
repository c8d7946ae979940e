//! Model service surface exposed to a transport (RPC, CLI, ...).

use crate::ai::{BackendResult, ModelBackend, OllamaBackend};
use crate::config::{Config, PipelineConfig};
use crate::pipeline::{InvocationQueue, InvokeHandle, InvokeResult, QueueStats};
use crate::types::{ChatMessage, ModelRequest, RequestOptions};
use std::sync::Arc;

pub struct ModelService {
    queue: InvocationQueue,
}

impl ModelService {
    pub fn new(backend: Arc<dyn ModelBackend>, config: &PipelineConfig) -> Self {
        Self {
            queue: InvocationQueue::new(backend, config),
        }
    }

    /// Build an Ollama-backed service from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(OllamaBackend::new(config.ollama_host.clone())),
            &config.pipeline,
        )
    }

    pub fn start(&self) {
        self.queue.start();
    }

    pub async fn stop(&self) {
        self.queue.stop().await;
    }

    /// Queue a call without waiting for it.
    pub fn submit(&self, request: ModelRequest) -> InvokeHandle {
        self.queue.submit(request)
    }

    /// Queue a call and wait for its outcome.
    pub async fn invoke_model(
        &self,
        messages: Vec<ChatMessage>,
        model: impl Into<String>,
        options: RequestOptions,
    ) -> InvokeResult {
        self.submit(ModelRequest::new(model, messages).with_options(options))
            .await
    }

    /// Models available on the backend, sorted by name.
    pub async fn list_models(&self) -> BackendResult<Vec<String>> {
        let mut models = self.queue.backend().list_models().await?;
        models.sort();
        Ok(models)
    }

    pub fn queue(&self) -> &InvocationQueue {
        &self.queue
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }
}
