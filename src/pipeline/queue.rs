use super::{ConcurrencyLimiter, DeadlineGuard};
use crate::ai::ModelBackend;
use crate::config::PipelineConfig;
use crate::error::InvokeError;
use crate::types::{InvokeResponse, ModelRequest};
use rand::Rng;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::{Notify, OwnedSemaphorePermit, oneshot};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub type InvokeResult = Result<InvokeResponse, InvokeError>;

/// Caller side of a submitted request. Resolves exactly once.
#[derive(Debug)]
pub struct InvokeHandle {
    id: u64,
    rx: oneshot::Receiver<InvokeResult>,
}

impl InvokeHandle {
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Future for InvokeHandle {
    type Output = InvokeResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // The sender only disappears without sending if the queue was dropped
        // with the request still pending, or its dispatch task died.
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(InvokeError::Abandoned)))
    }
}

/// Point-in-time counters for the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Submitted but not yet dequeued
    pub pending: usize,
    /// Backend calls currently running
    pub in_flight: usize,
    /// Resolved with a backend response
    pub completed: u64,
    /// Resolved with the timeout sentinel
    pub timed_out: u64,
    /// Rejected with a backend error
    pub failed: u64,
}

struct QueuedInvocation {
    id: u64,
    request: ModelRequest,
    completion: oneshot::Sender<InvokeResult>,
    enqueued_at: Instant,
}

#[derive(Default)]
struct Shared {
    pending: Mutex<VecDeque<QueuedInvocation>>,
    notify: Notify,
    next_id: AtomicU64,
    in_flight: AtomicUsize,
    completed: AtomicU64,
    timed_out: AtomicU64,
    failed: AtomicU64,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, VecDeque<QueuedInvocation>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pop(&self) -> Option<QueuedInvocation> {
        self.pending().pop_front()
    }
}

/// Everything a dispatch task needs; cheap to clone into each task.
#[derive(Clone)]
struct Dispatcher {
    shared: Arc<Shared>,
    backend: Arc<dyn ModelBackend>,
    limiter: ConcurrencyLimiter,
    guard: DeadlineGuard,
    poll_interval: Duration,
}

struct Consumer {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// FIFO admission queue in front of a [`ModelBackend`].
///
/// `submit` never blocks. While started, a consumer task dequeues requests in
/// submission order, takes a permit from the [`ConcurrencyLimiter`] and
/// spawns each call as its own task, so up to `max_concurrent` calls run at
/// once. Completion order is not tied to submission order.
pub struct InvocationQueue {
    dispatcher: Dispatcher,
    consumer: Mutex<Option<Consumer>>,
}

impl InvocationQueue {
    pub fn new(backend: Arc<dyn ModelBackend>, config: &PipelineConfig) -> Self {
        Self {
            dispatcher: Dispatcher {
                shared: Arc::new(Shared::default()),
                backend,
                limiter: ConcurrencyLimiter::new(config.max_concurrent),
                guard: DeadlineGuard::new(config.invoke_timeout),
                poll_interval: config.poll_interval,
            },
            consumer: Mutex::new(None),
        }
    }

    /// Enqueue `request` and return a handle for its outcome.
    pub fn submit(&self, request: ModelRequest) -> InvokeHandle {
        let shared = &self.dispatcher.shared;
        let (completion, rx) = oneshot::channel();
        let id = shared.next_id.fetch_add(1, Ordering::Relaxed) + 1;

        debug!(id, model = %request.model, messages = request.messages.len(), "invocation queued");
        shared.pending().push_back(QueuedInvocation {
            id,
            request,
            completion,
            enqueued_at: Instant::now(),
        });
        shared.notify.notify_one();

        InvokeHandle { id, rx }
    }

    /// Spawn the consumer. Must be called from within a tokio runtime.
    /// Calling it while already running is a no-op.
    pub fn start(&self) {
        let mut consumer = self.consumer();
        if consumer.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(consume(self.dispatcher.clone(), cancel.clone()));
        *consumer = Some(Consumer { cancel, task });

        info!(
            max_concurrent = self.dispatcher.limiter.capacity(),
            deadline_secs = self.dispatcher.guard.deadline().as_secs(),
            "invocation queue started"
        );
    }

    /// Cancel the consumer and wait for every dispatched call to finish.
    ///
    /// Requests still waiting in the queue stay there unresolved; they are
    /// picked up again if the queue is restarted.
    pub async fn stop(&self) {
        let Some(consumer) = self.consumer().take() else {
            return;
        };

        consumer.cancel.cancel();
        if let Err(err) = consumer.task.await {
            report_join_error("consumer", &err);
        }

        info!(
            pending = self.dispatcher.shared.pending().len(),
            "invocation queue stopped"
        );
    }

    pub fn is_running(&self) -> bool {
        self.consumer().is_some()
    }

    pub fn stats(&self) -> QueueStats {
        let shared = &self.dispatcher.shared;
        QueueStats {
            pending: shared.pending().len(),
            in_flight: shared.in_flight.load(Ordering::Acquire),
            completed: shared.completed.load(Ordering::Relaxed),
            timed_out: shared.timed_out.load(Ordering::Relaxed),
            failed: shared.failed.load(Ordering::Relaxed),
        }
    }

    pub fn backend(&self) -> &Arc<dyn ModelBackend> {
        &self.dispatcher.backend
    }

    fn consumer(&self) -> MutexGuard<'_, Option<Consumer>> {
        self.consumer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for InvocationQueue {
    fn drop(&mut self) {
        // The consumer holds its own handle on the shared state; without this
        // it would outlive the queue.
        if let Some(consumer) = self.consumer().take() {
            consumer.cancel.cancel();
        }
    }
}

/// Random positive seed so every dispatched call is reproducible.
pub fn generate_seed() -> i64 {
    rand::rng().random_range(1..=i64::from(i32::MAX))
}

async fn consume(dispatcher: Dispatcher, cancel: CancellationToken) {
    let mut in_flight = JoinSet::new();

    loop {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = dispatcher.limiter.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let Some(job) = next_job(&dispatcher, &cancel).await else {
            break;
        };

        let task = dispatcher.clone();
        in_flight.spawn(async move { task.dispatch(job, permit).await });

        while let Some(finished) = in_flight.try_join_next() {
            if let Err(err) = finished {
                report_join_error("dispatch", &err);
            }
        }
    }

    debug!(in_flight = in_flight.len(), "draining dispatched invocations");
    while let Some(finished) = in_flight.join_next().await {
        if let Err(err) = finished {
            report_join_error("dispatch", &err);
        }
    }
}

async fn next_job(dispatcher: &Dispatcher, cancel: &CancellationToken) -> Option<QueuedInvocation> {
    loop {
        if cancel.is_cancelled() {
            return None;
        }
        if let Some(job) = dispatcher.shared.pop() {
            return Some(job);
        }

        // `notify_one` stores a permit when nobody is waiting, so a submit
        // racing with the empty check above still wakes us.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            _ = dispatcher.shared.notify.notified() => {}
            _ = tokio::time::sleep(dispatcher.poll_interval) => {}
        }
    }
}

impl Dispatcher {
    async fn dispatch(self, job: QueuedInvocation, permit: OwnedSemaphorePermit) {
        let QueuedInvocation {
            id,
            mut request,
            completion,
            enqueued_at,
        } = job;

        let seed = *request.options.seed.get_or_insert_with(generate_seed);
        let shared = &self.shared;
        shared.in_flight.fetch_add(1, Ordering::AcqRel);

        debug!(
            id,
            model = %request.model,
            seed,
            waited_ms = enqueued_at.elapsed().as_millis() as u64,
            "dispatching invocation"
        );
        let started = Instant::now();
        let outcome = self
            .guard
            .call(self.backend.as_ref(), &request)
            .await
            .map_err(InvokeError::from);

        shared.in_flight.fetch_sub(1, Ordering::AcqRel);
        drop(permit);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(response) if response.is_timeout() => {
                shared.timed_out.fetch_add(1, Ordering::Relaxed);
            }
            Ok(_) => {
                shared.completed.fetch_add(1, Ordering::Relaxed);
                debug!(id, elapsed_ms, "invocation completed");
            }
            Err(err) => {
                shared.failed.fetch_add(1, Ordering::Relaxed);
                error!(id, elapsed_ms, error = %err, "invocation failed");
            }
        }

        if completion.send(outcome).is_err() {
            debug!(id, "invocation handle dropped before completion");
        }
    }
}

fn report_join_error(task: &str, err: &JoinError) {
    if err.is_panic() {
        error!(task, "invocation task panicked");
    }
}
