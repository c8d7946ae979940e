//! Model backend seam
//!
//! The invocation pipeline talks to a model server only through
//! [`ModelBackend`]. The production implementation is [`OllamaBackend`];
//! tests plug in in-process fakes.
//!
//! # Usage
//!
//! ```rust,no_run
//! use promptbench::ai::{ModelBackend, OllamaBackend};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let backend = OllamaBackend::new("http://127.0.0.1:11434");
//! let models = backend.list_models().await?;
//! # Ok(())
//! # }
//! ```
mod ollama;

pub use ollama::{OllamaBackend, OllamaChatRequest, OllamaChatResponse, OllamaOptions};

use crate::error::BackendError;
use crate::types::{InvokeResponse, ModelRequest};
use async_trait::async_trait;

pub type BackendResult<T> = Result<T, BackendError>;

#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Run one non-streaming chat completion. `request.options.seed` is
    /// already filled in by the caller.
    async fn chat(&self, request: &ModelRequest) -> BackendResult<InvokeResponse>;

    /// Names of the models the backend can serve.
    async fn list_models(&self) -> BackendResult<Vec<String>>;
}
