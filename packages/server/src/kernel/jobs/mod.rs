//! Durable job queues for publishing work.
//!
//! - [`JobQueue`] - queue operations; [`PostgresJobQueue`] and [`MemoryJobQueue`]
//! - [`JobWorker`] - long-running service that claims and executes jobs
//! - [`Job`] - job model; its id is the id of the entity it works on
//!
//! Job handlers live in their domains. This module only provides the
//! infrastructure.

mod job;
mod memory_queue;
mod queue;
mod worker;

pub use job::{
    BackoffPolicy, Job, JobPayload, JobState, QueueName, PRIORITY_NORMAL, PRIORITY_OPERATOR,
};
pub use memory_queue::MemoryJobQueue;
pub use queue::{EnqueueResult, FailOutcome, JobQueue, PostgresJobQueue, QueueCounts, DEFAULT_LEASE};
pub use worker::{spawn_workers, JobHandler, JobWorker, JobWorkerConfig};
