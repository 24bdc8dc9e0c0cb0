#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Request queue and worker pool for the Strato orchestrator.
//!
//! The queue is a bounded FIFO with SQS-style visibility timeouts: a
//! dequeued request becomes invisible until its deadline, and a background
//! monitor reclaims requests whose worker died or hung. Failures retry up to
//! a limit, completions are at-most-once, and queued requests can be
//! cancelled. Admission is tier-aware (admin > premium > standard) but
//! in-flight work is never preempted.

mod error;
mod queue;
mod request;
mod worker;

pub use error::{QueueError, QueueResult};
pub use queue::{QueueConfig, RequestQueue, spawn_visibility_monitor};
pub use request::{FailureRecord, ProcessOutcome, QueuedRequest, RequestStatus};
pub use worker::{RequestProcessor, WorkerPool};
