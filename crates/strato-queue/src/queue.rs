//! The in-memory request queue.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::request::{FailureRecord, ProcessOutcome, QueuedRequest, RequestStatus};
use strato_core::RequestId;

/// How many completed/failed records are retained for status lookups.
const RETENTION_LIMIT: usize = 100;
/// How many of the oldest records are dropped once the limit is hit.
const RETENTION_DROP: usize = 50;

/// Queue tuning knobs.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum queued (not in-flight) requests.
    pub max_size: usize,
    /// Invisibility window after dequeue.
    pub visibility_timeout: Duration,
    /// Maximum processing attempts.
    pub max_retries: u32,
    /// Delay before a retryable failure is re-enqueued.
    pub retry_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 50,
            visibility_timeout: Duration::from_secs(300),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

struct InFlight {
    request: QueuedRequest,
    deadline: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    fifo: VecDeque<QueuedRequest>,
    in_flight: HashMap<RequestId, InFlight>,
    completed: HashMap<RequestId, ProcessOutcome>,
    completed_order: VecDeque<RequestId>,
    failed: HashMap<RequestId, FailureRecord>,
    failed_order: VecDeque<RequestId>,
}

impl Inner {
    fn record_completed(&mut self, id: RequestId, outcome: ProcessOutcome) {
        self.completed.insert(id.clone(), outcome);
        self.completed_order.push_back(id);
        if self.completed.len() > RETENTION_LIMIT {
            for _ in 0..RETENTION_DROP {
                if let Some(old) = self.completed_order.pop_front() {
                    self.completed.remove(&old);
                }
            }
        }
    }

    fn record_failed(&mut self, id: RequestId, record: FailureRecord) {
        self.failed.insert(id.clone(), record);
        self.failed_order.push_back(id);
        if self.failed.len() > RETENTION_LIMIT {
            for _ in 0..RETENTION_DROP {
                if let Some(old) = self.failed_order.pop_front() {
                    self.failed.remove(&old);
                }
            }
        }
    }
}

/// Bounded tiered FIFO with visibility-timeout semantics.
///
/// The FIFO, in-flight map, and completed/failed maps are one logical unit
/// behind a single mutex: a request is in exactly one of them at any time.
/// The queued-size counter is additionally mirrored into an atomic so
/// monitoring reads don't take the lock.
pub struct RequestQueue {
    inner: Mutex<Inner>,
    size: AtomicUsize,
    config: QueueConfig,
}

impl RequestQueue {
    /// Create a queue.
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            size: AtomicUsize::new(0),
            config,
        }
    }

    /// Add a request.
    ///
    /// Within a tier the queue is FIFO; a higher-tier request is admitted
    /// ahead of lower-tier queued work but never preempts anything in
    /// flight.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Full`] at capacity.
    pub async fn enqueue(&self, request: QueuedRequest) -> QueueResult<RequestId> {
        let mut inner = self.inner.lock().await;
        if inner.fifo.len() >= self.config.max_size {
            return Err(QueueError::Full {
                capacity: self.config.max_size,
            });
        }

        let id = request.request_id.clone();
        let rank = request.tier.rank();
        // First index whose tier rank is strictly lower; equal ranks keep
        // arrival order.
        let position = inner
            .fifo
            .iter()
            .position(|queued| queued.tier.rank() < rank)
            .unwrap_or(inner.fifo.len());
        inner.fifo.insert(position, request);
        self.size.store(inner.fifo.len(), Ordering::Release);

        debug!(request_id = %id, position, "request enqueued");
        Ok(id)
    }

    /// Take the next request, marking it in-flight with a visibility
    /// deadline. Non-blocking; `None` when the queue is empty.
    pub async fn dequeue(&self) -> Option<QueuedRequest> {
        let mut inner = self.inner.lock().await;
        let request = inner.fifo.pop_front()?;
        self.size.store(inner.fifo.len(), Ordering::Release);

        let deadline = Utc::now()
            + ChronoDuration::from_std(self.config.visibility_timeout)
                .unwrap_or_else(|_| ChronoDuration::seconds(300));
        let id = request.request_id.clone();
        inner.in_flight.insert(
            id.clone(),
            InFlight {
                request: request.clone(),
                deadline,
            },
        );
        debug!(request_id = %id, %deadline, "request in flight");
        Some(request)
    }

    /// Record a successful completion. At-most-once: the first transition
    /// wins and later calls are no-ops.
    pub async fn mark_complete(&self, request_id: &RequestId, outcome: ProcessOutcome) {
        let mut inner = self.inner.lock().await;
        if inner.completed.contains_key(request_id) || inner.failed.contains_key(request_id) {
            debug!(%request_id, "mark_complete after terminal state; ignoring");
            return;
        }
        inner.in_flight.remove(request_id);
        inner.record_completed(request_id.clone(), outcome);
        info!(%request_id, "request completed");
    }

    /// Record a failure and apply the retry policy.
    ///
    /// Returns `true` when the request was re-enqueued for another attempt,
    /// `false` when it entered the terminal failed state (or was unknown).
    pub async fn mark_failed(self: &Arc<Self>, request_id: &RequestId, error: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.in_flight.remove(request_id) else {
            // Usually a race with the visibility monitor; diagnostic only.
            warn!(%request_id, "mark_failed for request not in flight");
            return false;
        };

        let mut request = entry.request;
        request.attempt = request.attempt.saturating_add(1);

        if request.attempt < self.config.max_retries {
            info!(
                %request_id,
                attempt = request.attempt,
                error,
                "retrying after delay"
            );
            let queue = Arc::clone(self);
            let delay = self.config.retry_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                queue.requeue(request).await;
            });
            true
        } else {
            warn!(%request_id, attempts = request.attempt, error, "request failed terminally");
            inner.record_failed(
                request_id.clone(),
                FailureRecord {
                    error: error.to_string(),
                    attempts: request.attempt,
                    cancelled: false,
                    timestamp: Utc::now(),
                },
            );
            false
        }
    }

    /// Put a retried request back. Capacity is not enforced here: dropping
    /// an accepted request on retry would break the retry contract.
    async fn requeue(&self, request: QueuedRequest) {
        let mut inner = self.inner.lock().await;
        // Cancelled while waiting for the retry delay?
        if inner.failed.contains_key(&request.request_id) {
            return;
        }
        let rank = request.tier.rank();
        let position = inner
            .fifo
            .iter()
            .position(|queued| queued.tier.rank() < rank)
            .unwrap_or(inner.fifo.len());
        inner.fifo.insert(position, request);
        self.size.store(inner.fifo.len(), Ordering::Release);
    }

    /// Cancel a queued request. Processing requests cannot be cancelled here;
    /// the pipeline's cancellation token handles those.
    pub async fn cancel(&self, request_id: &RequestId) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.in_flight.contains_key(request_id)
            || inner.completed.contains_key(request_id)
            || inner.failed.contains_key(request_id)
        {
            return false;
        }

        let Some(index) = inner
            .fifo
            .iter()
            .position(|queued| &queued.request_id == request_id)
        else {
            return false;
        };
        inner.fifo.remove(index);
        self.size.store(inner.fifo.len(), Ordering::Release);

        inner.record_failed(
            request_id.clone(),
            FailureRecord {
                error: "Cancelled by user".to_string(),
                attempts: 0,
                cancelled: true,
                timestamp: Utc::now(),
            },
        );
        info!(%request_id, "queued request cancelled");
        true
    }

    /// Status of a request, or `None` for an unknown id.
    pub async fn status(&self, request_id: &RequestId) -> Option<RequestStatus> {
        let inner = self.inner.lock().await;
        if inner.in_flight.contains_key(request_id) {
            return Some(RequestStatus::Processing);
        }
        if let Some(result) = inner.completed.get(request_id) {
            return Some(RequestStatus::Completed {
                result: result.clone(),
            });
        }
        if let Some(error) = inner.failed.get(request_id) {
            return Some(RequestStatus::Failed {
                error: error.clone(),
            });
        }
        inner
            .fifo
            .iter()
            .position(|queued| &queued.request_id == request_id)
            .map(|index| RequestStatus::Queued {
                position: index.saturating_add(1),
            })
    }

    /// 1-based queue position; 0 for requests that are in flight or done.
    pub async fn position(&self, request_id: &RequestId) -> usize {
        match self.status(request_id).await {
            Some(RequestStatus::Queued { position }) => position,
            _ => 0,
        }
    }

    /// Queued size. One atomic read, shared by workers and monitoring.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Whether the queue is at capacity.
    pub fn is_full(&self) -> bool {
        self.size() >= self.config.max_size
    }

    /// Drop all queued requests (admin purge). Returns how many were
    /// dropped. In-flight requests are untouched.
    pub async fn purge(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let dropped = inner.fifo.len();
        inner.fifo.clear();
        self.size.store(0, Ordering::Release);
        warn!(dropped, "queue purged");
        dropped
    }

    /// Ids of in-flight requests whose visibility deadline has passed.
    pub(crate) async fn expired_in_flight(&self, now: DateTime<Utc>) -> Vec<RequestId> {
        let inner = self.inner.lock().await;
        inner
            .in_flight
            .iter()
            .filter(|(_, entry)| now > entry.deadline)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Spawn the visibility monitor: every `interval` it fails any in-flight
/// request whose deadline elapsed, which re-enqueues it or fails it
/// terminally per the retry policy. A worker's completion race with the
/// monitor is resolved by the in-flight map: whoever transitions first wins.
#[must_use]
pub fn spawn_visibility_monitor(
    queue: Arc<RequestQueue>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let expired = queue.expired_in_flight(Utc::now()).await;
            for request_id in expired {
                warn!(%request_id, "visibility timeout expired, reclaiming");
                queue
                    .mark_failed(&request_id, "Request timed out (visibility timeout expired)")
                    .await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use strato_core::{ThreadId, Tier, UserId};

    fn request(tier: Tier) -> QueuedRequest {
        let mut req = QueuedRequest::new(UserId::new("u"), ThreadId::new("t"), "hello");
        req.tier = tier;
        req
    }

    fn queue(config: QueueConfig) -> Arc<RequestQueue> {
        Arc::new(RequestQueue::new(config))
    }

    fn small_queue(max_size: usize) -> Arc<RequestQueue> {
        queue(QueueConfig {
            max_size,
            ..QueueConfig::default()
        })
    }

    #[tokio::test]
    async fn test_enqueue_dequeue_fifo() {
        let q = small_queue(10);
        let first = q.enqueue(request(Tier::Standard)).await.unwrap();
        let second = q.enqueue(request(Tier::Standard)).await.unwrap();

        assert_eq!(q.size(), 2);
        assert_eq!(q.dequeue().await.unwrap().request_id, first);
        assert_eq!(q.dequeue().await.unwrap().request_id, second);
        assert!(q.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn test_full_rejects_at_exact_capacity() {
        let q = small_queue(2);
        q.enqueue(request(Tier::Standard)).await.unwrap();
        q.enqueue(request(Tier::Standard)).await.unwrap();
        assert!(q.is_full());
        assert!(matches!(
            q.enqueue(request(Tier::Standard)).await,
            Err(QueueError::Full { capacity: 2 })
        ));
    }

    #[tokio::test]
    async fn test_tier_admission_order() {
        let q = small_queue(10);
        let standard = q.enqueue(request(Tier::Standard)).await.unwrap();
        let admin = q.enqueue(request(Tier::Admin)).await.unwrap();
        let premium = q.enqueue(request(Tier::Premium)).await.unwrap();

        assert_eq!(q.dequeue().await.unwrap().request_id, admin);
        assert_eq!(q.dequeue().await.unwrap().request_id, premium);
        assert_eq!(q.dequeue().await.unwrap().request_id, standard);
    }

    #[tokio::test]
    async fn test_fifo_within_tier() {
        let q = small_queue(10);
        let first = q.enqueue(request(Tier::Premium)).await.unwrap();
        let second = q.enqueue(request(Tier::Premium)).await.unwrap();
        assert_eq!(q.dequeue().await.unwrap().request_id, first);
        assert_eq!(q.dequeue().await.unwrap().request_id, second);
    }

    #[tokio::test]
    async fn test_status_lifecycle() {
        let q = small_queue(10);
        let id = q.enqueue(request(Tier::Standard)).await.unwrap();
        assert!(matches!(
            q.status(&id).await,
            Some(RequestStatus::Queued { position: 1 })
        ));

        q.dequeue().await.unwrap();
        assert!(matches!(q.status(&id).await, Some(RequestStatus::Processing)));

        q.mark_complete(
            &id,
            ProcessOutcome {
                response: "done".to_string(),
                tokens_used: 10,
                artifacts: Vec::new(),
            },
        )
        .await;
        assert!(matches!(
            q.status(&id).await,
            Some(RequestStatus::Completed { .. })
        ));
    }

    #[tokio::test]
    async fn test_mark_complete_is_idempotent() {
        let q = small_queue(10);
        let id = q.enqueue(request(Tier::Standard)).await.unwrap();
        q.dequeue().await.unwrap();

        let outcome = ProcessOutcome {
            response: "first".to_string(),
            tokens_used: 1,
            artifacts: Vec::new(),
        };
        q.mark_complete(&id, outcome.clone()).await;
        q.mark_complete(
            &id,
            ProcessOutcome {
                response: "second".to_string(),
                tokens_used: 2,
                artifacts: Vec::new(),
            },
        )
        .await;

        match q.status(&id).await {
            Some(RequestStatus::Completed { result }) => assert_eq!(result.response, "first"),
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mark_failed_retries_then_terminal() {
        let q = queue(QueueConfig {
            max_size: 10,
            max_retries: 2,
            retry_delay: Duration::from_millis(10),
            ..QueueConfig::default()
        });

        let id = q.enqueue(request(Tier::Standard)).await.unwrap();
        q.dequeue().await.unwrap();

        // Attempt 1 of 2: retried.
        assert!(q.mark_failed(&id, "backend down").await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let retried = q.dequeue().await.unwrap();
        assert_eq!(retried.request_id, id);
        assert_eq!(retried.attempt, 1);

        // Attempt 2 of 2: terminal.
        assert!(!q.mark_failed(&id, "backend still down").await);
        match q.status(&id).await {
            Some(RequestStatus::Failed { error }) => {
                assert_eq!(error.attempts, 2);
                assert!(!error.cancelled);
            },
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mark_failed_unknown_id_is_diagnostic() {
        let q = small_queue(10);
        assert!(!q.mark_failed(&RequestId::new(), "whatever").await);
    }

    #[tokio::test]
    async fn test_cancel_queued() {
        let q = small_queue(10);
        let id = q.enqueue(request(Tier::Standard)).await.unwrap();
        assert!(q.cancel(&id).await);
        assert_eq!(q.size(), 0);
        match q.status(&id).await {
            Some(RequestStatus::Failed { error }) => assert!(error.cancelled),
            other => panic!("unexpected status: {other:?}"),
        }
        assert!(q.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_processing_refused() {
        let q = small_queue(10);
        let id = q.enqueue(request(Tier::Standard)).await.unwrap();
        q.dequeue().await.unwrap();
        assert!(!q.cancel(&id).await);
    }

    #[tokio::test]
    async fn test_visibility_timeout_reclaims() {
        let q = queue(QueueConfig {
            max_size: 10,
            visibility_timeout: Duration::from_millis(0),
            max_retries: 3,
            retry_delay: Duration::from_millis(5),
        });
        let id = q.enqueue(request(Tier::Standard)).await.unwrap();
        q.dequeue().await.unwrap();

        let expired = q.expired_in_flight(Utc::now() + ChronoDuration::seconds(1)).await;
        assert_eq!(expired, vec![id.clone()]);

        assert!(q.mark_failed(&id, "Request timed out (visibility timeout expired)").await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let reclaimed = q.dequeue().await.unwrap();
        assert_eq!(reclaimed.request_id, id);
        assert_eq!(reclaimed.attempt, 1);
    }

    #[tokio::test]
    async fn test_purge_drops_queued_only() {
        let q = small_queue(10);
        q.enqueue(request(Tier::Standard)).await.unwrap();
        let queued = q.enqueue(request(Tier::Standard)).await.unwrap();
        let in_flight = q.dequeue().await.unwrap().request_id;

        assert_eq!(q.purge().await, 1);
        assert_eq!(q.size(), 0);
        assert!(matches!(
            q.status(&in_flight).await,
            Some(RequestStatus::Processing)
        ));
        assert!(q.status(&queued).await.is_none());
    }
}
