use crate::ai::{BackendResult, ModelBackend};
use crate::types::{InvokeResponse, ModelRequest};
use std::time::Duration;
use tracing::warn;

/// Runs one backend call under a fixed deadline.
///
/// An elapsed deadline is not an error: the call resolves with
/// [`InvokeResponse::timed_out`] and the in-flight request is dropped.
#[derive(Clone, Copy, Debug)]
pub struct DeadlineGuard {
    deadline: Duration,
}

impl DeadlineGuard {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    #[inline]
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub async fn call(
        &self,
        backend: &dyn ModelBackend,
        request: &ModelRequest,
    ) -> BackendResult<InvokeResponse> {
        match tokio::time::timeout(self.deadline, backend.chat(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    model = %request.model,
                    deadline_ms = self.deadline.as_millis() as u64,
                    "model call exceeded deadline"
                );
                Ok(InvokeResponse::timed_out(request.options.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::types::{ChatMessage, RequestOptions};
    use async_trait::async_trait;
    use std::time::Instant;

    struct Sleepy(Duration);

    #[async_trait]
    impl ModelBackend for Sleepy {
        async fn chat(&self, request: &ModelRequest) -> BackendResult<InvokeResponse> {
            tokio::time::sleep(self.0).await;
            Ok(InvokeResponse {
                content: "done".into(),
                role: "assistant".into(),
                stats: Default::default(),
                options: request.options.clone(),
            })
        }

        async fn list_models(&self) -> BackendResult<Vec<String>> {
            Ok(vec![])
        }
    }

    struct Broken;

    #[async_trait]
    impl ModelBackend for Broken {
        async fn chat(&self, _request: &ModelRequest) -> BackendResult<InvokeResponse> {
            Err(BackendError::Transport("connection refused".into()))
        }

        async fn list_models(&self) -> BackendResult<Vec<String>> {
            Ok(vec![])
        }
    }

    fn request() -> ModelRequest {
        ModelRequest::new("llama3", vec![ChatMessage::user("hi")])
            .with_options(RequestOptions::default().with_seed(3))
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let guard = DeadlineGuard::new(Duration::from_secs(5));
        let response = guard
            .call(&Sleepy(Duration::from_millis(1)), &request())
            .await
            .unwrap();
        assert_eq!(response.content, "done");
    }

    #[tokio::test]
    async fn slow_call_resolves_with_sentinel() {
        let guard = DeadlineGuard::new(Duration::from_millis(50));
        let started = Instant::now();
        let response = guard
            .call(&Sleepy(Duration::from_secs(30)), &request())
            .await
            .unwrap();

        assert!(response.is_timeout());
        assert_eq!(response.options.seed, Some(3));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn backend_errors_propagate() {
        let guard = DeadlineGuard::new(Duration::from_secs(5));
        let result = guard.call(&Broken, &request()).await;
        assert!(matches!(result, Err(BackendError::Transport(_))));
    }
}
