//! Job worker service.
//!
//! A `JobWorker` serves one named queue:
//!
//! ```text
//! JobWorker
//!     │
//!     ├─► claim (JobQueue)
//!     ├─► JobHandler::handle, heartbeating the lease meanwhile
//!     └─► complete / fail
//!             └─► exhausted? JobHandler::on_exhausted
//! ```
//!
//! Several workers (in one or many processes) may serve the same queue; the
//! queue hands each job to one of them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::job::{Job, QueueName};
use super::queue::{FailOutcome, JobQueue};

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct JobWorkerConfig {
    /// How long to wait when no jobs are available
    pub poll_interval: Duration,
    /// How often to extend the lease of the running job
    pub heartbeat_interval: Duration,
    /// Worker ID for this instance
    pub worker_id: String,
}

impl Default for JobWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(15),
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }
}

impl JobWorkerConfig {
    /// Create a new config with a specific worker ID.
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }
}

/// Executes the jobs of one queue.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn queue(&self) -> QueueName;

    /// Run the job. An error counts as a failed attempt.
    async fn handle(&self, job: &Job) -> Result<()>;

    /// Called once the queue has given up on the job, so the target entity
    /// is not left in a non-terminal state.
    async fn on_exhausted(&self, job: &Job, error: &str) -> Result<()>;
}

pub struct JobWorker {
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    config: JobWorkerConfig,
}

impl JobWorker {
    pub fn new(queue: Arc<dyn JobQueue>, handler: Arc<dyn JobHandler>) -> Self {
        Self::with_config(queue, handler, JobWorkerConfig::default())
    }

    pub fn with_config(
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        config: JobWorkerConfig,
    ) -> Self {
        Self {
            queue,
            handler,
            config,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Claim and process at most one job. Returns whether a job ran.
    pub async fn run_once(&self) -> Result<bool> {
        let queue_name = self.handler.queue();
        let Some(job) = self.queue.claim(queue_name, &self.config.worker_id).await? else {
            return Ok(false);
        };
        self.process_job(job).await;
        Ok(true)
    }

    /// Process a single claimed job.
    async fn process_job(&self, job: Job) {
        let job_id = job.id;
        debug!(job_id = %job_id, queue = %job.queue, attempt = job.attempts + 1, "processing job");

        match self.execute_with_heartbeat(&job).await {
            Ok(()) => {
                debug!(job_id = %job_id, "job succeeded");
                if let Err(e) = self.queue.complete(job_id).await {
                    error!(job_id = %job_id, error = %e, "failed to mark job as completed");
                }
            }
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(job_id = %job_id, queue = %job.queue, error = %message, "job failed");

                match self.queue.fail(job_id, &message).await {
                    Ok(FailOutcome::Retrying { attempts, run_at }) => {
                        info!(job_id = %job_id, attempts, run_at = %run_at, "job scheduled for retry");
                    }
                    Ok(FailOutcome::Exhausted { attempts }) => {
                        warn!(job_id = %job_id, attempts, "job retries exhausted");
                        self.exhausted(&job, &message).await;
                    }
                    Err(queue_error) => {
                        // Bookkeeping failed; settle the entity on the last attempt anyway.
                        error!(job_id = %job_id, error = %queue_error, "failed to record job failure");
                        if job.is_last_attempt() {
                            self.exhausted(&job, &message).await;
                        }
                    }
                }
            }
        }
    }

    async fn exhausted(&self, job: &Job, message: &str) {
        if let Err(e) = self.handler.on_exhausted(job, message).await {
            error!(job_id = %job.id, error = %e, "exhaustion handler failed");
        }
    }

    /// Execute a job with periodic heartbeats.
    async fn execute_with_heartbeat(&self, job: &Job) -> Result<()> {
        let queue = self.queue.clone();
        let job_id = job.id;
        let worker_id = self.config.worker_id.clone();
        let heartbeat_interval = self.config.heartbeat_interval;

        let stop = CancellationToken::new();
        let heartbeat_stop = stop.clone();
        let heartbeat_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(heartbeat_interval);
            interval.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    _ = heartbeat_stop.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = queue.heartbeat(job_id, &worker_id).await {
                            warn!(job_id = %job_id, error = %e, "heartbeat failed");
                        }
                    }
                }
            }
        });

        let result = self.handler.handle(job).await;

        stop.cancel();
        let _ = heartbeat_handle.await;

        result
    }

    /// Poll until `shutdown` fires. The running job always finishes first.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            queue = %self.handler.queue(),
            "job worker starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.run_once().await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => error!(error = %e, "failed to claim job"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!(worker_id = %self.config.worker_id, "job worker stopped");
        Ok(())
    }
}

/// Spawn `concurrency` workers for every handler.
pub fn spawn_workers(
    queue: Arc<dyn JobQueue>,
    handlers: Vec<Arc<dyn JobHandler>>,
    concurrency: usize,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<Result<()>>> {
    let mut handles = Vec::new();
    for handler in handlers {
        for n in 0..concurrency.max(1) {
            let config = JobWorkerConfig::with_worker_id(format!(
                "{}-{}-{}",
                handler.queue(),
                n,
                &Uuid::new_v4().simple().to_string()[..8]
            ));
            let worker = JobWorker::with_config(queue.clone(), handler.clone(), config);
            handles.push(tokio::spawn(worker.run(shutdown.clone())));
        }
    }
    handles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::DeploymentId;
    use crate::kernel::jobs::{JobPayload, JobState, MemoryJobQueue, PRIORITY_NORMAL};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyHandler {
        calls: AtomicUsize,
        exhausted: AtomicUsize,
        succeed_on: usize,
    }

    #[async_trait]
    impl JobHandler for FlakyHandler {
        fn queue(&self) -> QueueName {
            QueueName::Deployment
        }

        async fn handle(&self, _job: &Job) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.succeed_on {
                Ok(())
            } else {
                anyhow::bail!("attempt {} failed", call)
            }
        }

        async fn on_exhausted(&self, _job: &Job, _error: &str) -> Result<()> {
            self.exhausted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_config_with_worker_id() {
        let config = JobWorkerConfig::with_worker_id("my-worker");
        assert_eq!(config.worker_id, "my-worker");
    }

    #[tokio::test]
    async fn test_exhaustion_calls_handler_once() {
        let queue = Arc::new(MemoryJobQueue::new());
        let handler = Arc::new(FlakyHandler {
            calls: AtomicUsize::new(0),
            exhausted: AtomicUsize::new(0),
            succeed_on: usize::MAX,
        });
        let worker = JobWorker::new(queue.clone(), handler.clone());
        let payload = JobPayload::Deployment {
            deployment_id: DeploymentId::new(),
        };
        queue.enqueue(payload.clone(), PRIORITY_NORMAL).await.unwrap();

        for _ in 0..3 {
            queue.make_due(payload.job_id()).unwrap();
            assert!(worker.run_once().await.unwrap());
        }

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(handler.exhausted.load(Ordering::SeqCst), 1);
        let job = queue.get(payload.job_id()).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
    }

    #[tokio::test]
    async fn test_success_after_retry_completes_job() {
        let queue = Arc::new(MemoryJobQueue::new());
        let handler = Arc::new(FlakyHandler {
            calls: AtomicUsize::new(0),
            exhausted: AtomicUsize::new(0),
            succeed_on: 2,
        });
        let worker = JobWorker::new(queue.clone(), handler.clone());
        let payload = JobPayload::Deployment {
            deployment_id: DeploymentId::new(),
        };
        queue.enqueue(payload.clone(), PRIORITY_NORMAL).await.unwrap();

        assert!(worker.run_once().await.unwrap());
        queue.make_due(payload.job_id()).unwrap();
        assert!(worker.run_once().await.unwrap());

        let job = queue.get(payload.job_id()).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(handler.exhausted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let queue = Arc::new(MemoryJobQueue::new());
        let handler = Arc::new(FlakyHandler {
            calls: AtomicUsize::new(0),
            exhausted: AtomicUsize::new(0),
            succeed_on: 1,
        });
        let shutdown = CancellationToken::new();
        let handles = spawn_workers(queue, vec![handler], 2, shutdown.clone());

        shutdown.cancel();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }
}
