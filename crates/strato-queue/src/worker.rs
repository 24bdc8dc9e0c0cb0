//! The worker pool.

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::queue::RequestQueue;
use crate::request::{ProcessOutcome, QueuedRequest};
use strato_core::StratoError;

/// Idle poll interval when the queue is empty.
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Processes one dequeued request end to end.
#[async_trait]
pub trait RequestProcessor: Send + Sync {
    /// Run the request through the pipeline.
    async fn process(&self, request: QueuedRequest) -> Result<ProcessOutcome, StratoError>;

    /// Notification after a failure was recorded. `retried` tells whether
    /// the queue re-enqueued the request or failed it terminally.
    async fn on_failure(&self, _request: &QueuedRequest, _error: &StratoError, _retried: bool) {}
}

/// A fixed set of long-running worker loops.
pub struct WorkerPool {
    queue: Arc<RequestQueue>,
    processor: Arc<dyn RequestProcessor>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Create a pool over `queue` and `processor`.
    #[must_use]
    pub fn new(queue: Arc<RequestQueue>, processor: Arc<dyn RequestProcessor>) -> Self {
        Self {
            queue,
            processor,
            handles: Vec::new(),
        }
    }

    /// Spawn `count` worker loops.
    pub fn start(&mut self, count: usize) {
        for worker_id in 0..count {
            let queue = Arc::clone(&self.queue);
            let processor = Arc::clone(&self.processor);
            self.handles.push(tokio::spawn(async move {
                info!(worker_id, "worker started");
                worker_loop(worker_id, queue, processor).await;
            }));
        }
    }

    /// Abort all workers.
    pub fn stop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<RequestQueue>,
    processor: Arc<dyn RequestProcessor>,
) {
    loop {
        let Some(request) = queue.dequeue().await else {
            tokio::time::sleep(IDLE_POLL).await;
            continue;
        };

        let request_id = request.request_id.clone();

        // Panics must not kill the loop or leak the in-flight entry: catch,
        // convert to a failure, and let the retry policy decide.
        let result = AssertUnwindSafe(processor.process(request.clone()))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(outcome)) => {
                queue.mark_complete(&request_id, outcome).await;
            },
            Ok(Err(err)) => {
                let retried = queue.mark_failed(&request_id, &err.to_string()).await;
                processor.on_failure(&request, &err, retried).await;
            },
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "worker panicked".to_string());
                error!(worker_id, %request_id, panic = %message, "panic in worker");
                let err = StratoError::Internal(message);
                let retried = queue.mark_failed(&request_id, &err.to_string()).await;
                processor.on_failure(&request, &err, retried).await;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueConfig;
    use crate::request::RequestStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strato_core::{ThreadId, UserId};

    struct EchoProcessor;

    #[async_trait]
    impl RequestProcessor for EchoProcessor {
        async fn process(&self, request: QueuedRequest) -> Result<ProcessOutcome, StratoError> {
            Ok(ProcessOutcome {
                response: format!("echo: {}", request.message),
                tokens_used: 1,
                artifacts: Vec::new(),
            })
        }
    }

    struct PanicProcessor {
        failures: AtomicUsize,
    }

    #[async_trait]
    impl RequestProcessor for PanicProcessor {
        async fn process(&self, _request: QueuedRequest) -> Result<ProcessOutcome, StratoError> {
            panic!("boom");
        }

        async fn on_failure(
            &self,
            _request: &QueuedRequest,
            _error: &StratoError,
            _retried: bool,
        ) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_worker_completes_request() {
        let queue = Arc::new(RequestQueue::new(QueueConfig::default()));
        let mut pool = WorkerPool::new(Arc::clone(&queue), Arc::new(EchoProcessor));
        pool.start(1);

        let id = queue
            .enqueue(QueuedRequest::new(UserId::new("u"), ThreadId::new("t"), "hi"))
            .await
            .unwrap();

        for _ in 0..100 {
            if matches!(queue.status(&id).await, Some(RequestStatus::Completed { .. })) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        match queue.status(&id).await {
            Some(RequestStatus::Completed { result }) => assert_eq!(result.response, "echo: hi"),
            other => panic!("unexpected status: {other:?}"),
        }
        pool.stop();
    }

    #[tokio::test]
    async fn test_worker_survives_panic() {
        let queue = Arc::new(RequestQueue::new(QueueConfig {
            max_retries: 1,
            ..QueueConfig::default()
        }));
        let processor = Arc::new(PanicProcessor {
            failures: AtomicUsize::new(0),
        });
        let mut pool = WorkerPool::new(Arc::clone(&queue), Arc::clone(&processor) as _);
        pool.start(1);

        let id = queue
            .enqueue(QueuedRequest::new(UserId::new("u"), ThreadId::new("t"), "hi"))
            .await
            .unwrap();

        for _ in 0..100 {
            if matches!(queue.status(&id).await, Some(RequestStatus::Failed { .. })) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(matches!(
            queue.status(&id).await,
            Some(RequestStatus::Failed { .. })
        ));
        assert_eq!(processor.failures.load(Ordering::SeqCst), 1);
        pool.stop();
    }
}
