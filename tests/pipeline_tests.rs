//! Integration tests for the invocation pipeline
//!
//! Exercises the queue, limiter and deadline together against a scripted backend.

mod common;

use common::{ScriptedBackend, fast_config, request};
use futures::future::join_all;
use promptbench::error::{BackendError, InvokeError};
use promptbench::pipeline::InvocationQueue;
use promptbench::service::ModelService;
use promptbench::types::{ChatMessage, RequestOptions, TIMEOUT_MARKER};
use std::sync::Arc;
use std::time::{Duration, Instant};

mod admission_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_never_exceeds_the_concurrency_cap() {
        let backend = Arc::new(ScriptedBackend::default());
        let queue = InvocationQueue::new(backend.clone(), &fast_config(3));
        queue.start();

        let handles: Vec<_> = (0..12).map(|_| queue.submit(request("sleep:40"))).collect();
        let results = join_all(handles).await;

        assert_eq!(results.len(), 12);
        assert!(results.iter().all(|r| r.is_ok()));
        assert!(backend.peak() <= 3, "peak was {}", backend.peak());
        assert!(backend.peak() > 1, "calls never overlapped");
        assert_eq!(queue.stats().completed, 12);

        queue.stop().await;
    }

    #[tokio::test]
    async fn test_dispatches_in_submission_order() {
        let backend = Arc::new(ScriptedBackend::default());
        let queue = InvocationQueue::new(backend.clone(), &fast_config(1));

        // submitted before the consumer exists
        let handles: Vec<_> = ["a", "b", "c", "d"].iter().map(|c| queue.submit(request(c))).collect();
        queue.start();
        join_all(handles).await;

        let order: Vec<String> = backend
            .seen()
            .iter()
            .map(|r| r.messages[0].content.clone())
            .collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);

        queue.stop().await;
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_the_loop() {
        let backend = Arc::new(ScriptedBackend::default());
        let queue = InvocationQueue::new(backend, &fast_config(1));
        queue.start();

        let failing = queue.submit(request("fail"));
        let healthy = queue.submit(request("still here"));

        let failed = failing.await;
        assert!(matches!(
            failed,
            Err(InvokeError::Backend(BackendError::Status { status: 500, .. }))
        ));
        assert_eq!(healthy.await.unwrap().content, "still here");

        let stats = queue.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 1);

        queue.stop().await;
    }
}

mod deadline_tests {
    use super::*;

    #[tokio::test]
    async fn test_overrun_resolves_with_sentinel() {
        let config = fast_config(1).with_invoke_timeout(Duration::from_millis(100));
        let queue = InvocationQueue::new(Arc::new(ScriptedBackend::default()), &config);
        queue.start();

        let started = Instant::now();
        let response = queue.submit(request("hang")).await.unwrap();

        assert_eq!(response.content, TIMEOUT_MARKER);
        assert_eq!(response.role, "");
        assert!(response.is_timeout());
        assert!(started.elapsed() < Duration::from_millis(100) + Duration::from_secs(1));
        assert_eq!(queue.stats().timed_out, 1);

        queue.stop().await;
    }

    #[tokio::test]
    async fn test_timed_out_call_releases_its_permit() {
        let config = fast_config(1).with_invoke_timeout(Duration::from_millis(50));
        let queue = InvocationQueue::new(Arc::new(ScriptedBackend::default()), &config);
        queue.start();

        let stuck = queue.submit(request("hang"));
        let next = queue.submit(request("next"));

        assert!(stuck.await.unwrap().is_timeout());
        assert_eq!(next.await.unwrap().content, "next");

        queue.stop().await;
    }
}

mod seed_tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_seed_is_generated_and_echoed() {
        let backend = Arc::new(ScriptedBackend::default());
        let queue = InvocationQueue::new(backend.clone(), &fast_config(1));
        queue.start();

        let response = queue.submit(request("hi")).await.unwrap();

        let seed = response.options.seed.expect("dispatched call carries a seed");
        assert!(seed > 0);
        assert_eq!(backend.seen()[0].options.seed, Some(seed));

        queue.stop().await;
    }

    #[tokio::test]
    async fn test_given_seed_is_kept() {
        let queue = InvocationQueue::new(Arc::new(ScriptedBackend::default()), &fast_config(1));
        queue.start();

        let pinned = request("hi").with_options(RequestOptions::default().with_seed(42));
        let response = queue.submit(pinned).await.unwrap();
        assert_eq!(response.options.seed, Some(42));

        queue.stop().await;
    }
}

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_drains_in_flight_and_leaves_queued_requests() {
        let queue = InvocationQueue::new(Arc::new(ScriptedBackend::default()), &fast_config(1));
        queue.start();

        let mut running = queue.submit(request("sleep:100"));
        let mut waiting = queue.submit(request("later"));

        while queue.stats().in_flight == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        queue.stop().await;
        assert!(!queue.is_running());

        // the call in flight finished before stop returned
        let done = tokio::time::timeout(Duration::from_millis(50), &mut running).await;
        assert_eq!(done.unwrap().unwrap().content, "sleep:100");

        // the queued one was never dispatched
        assert!(tokio::time::timeout(Duration::from_millis(50), &mut waiting).await.is_err());
        assert_eq!(queue.stats().pending, 1);

        queue.start();
        assert_eq!(waiting.await.unwrap().content, "later");
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_dropping_the_queue_abandons_pending_requests() {
        let queue = InvocationQueue::new(Arc::new(ScriptedBackend::default()), &fast_config(1));
        let handle = queue.submit(request("never sent"));

        drop(queue);
        assert!(matches!(handle.await, Err(InvokeError::Abandoned)));
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let queue = InvocationQueue::new(Arc::new(ScriptedBackend::default()), &fast_config(2));
        queue.stop().await;
        queue.start();
        queue.start();
        assert!(queue.is_running());
        assert_eq!(queue.submit(request("once")).await.unwrap().content, "once");
        queue.stop().await;
        queue.stop().await;
        assert!(!queue.is_running());
    }
}

mod service_tests {
    use super::*;

    #[tokio::test]
    async fn test_invoke_model_round_trip() {
        let service = ModelService::new(Arc::new(ScriptedBackend::default()), &fast_config(2));
        service.start();

        let response = service
            .invoke_model(vec![ChatMessage::user("hello")], "llama3", RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(response.content, "hello");
        assert_eq!(response.role, "assistant");

        service.stop().await;
    }

    #[tokio::test]
    async fn test_list_models_is_sorted() {
        let backend = ScriptedBackend::with_models(&["qwen2", "llama3", "mistral"]);
        let service = ModelService::new(Arc::new(backend), &fast_config(1));

        assert_eq!(
            service.list_models().await.unwrap(),
            vec!["llama3", "mistral", "qwen2"]
        );
    }
}
