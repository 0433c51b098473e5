//! In-memory job queue for tests and database-less local runs.
//!
//! Same semantics as the PostgreSQL queue; a single mutex stands in for row
//! locks.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::job::{Job, JobPayload, JobState, QueueName, PRIORITY_OPERATOR};
use super::queue::{ensure_cleanable, EnqueueResult, FailOutcome, JobQueue, QueueCounts, DEFAULT_LEASE};
use crate::common::QueueError;

#[derive(Default)]
struct State {
    jobs: HashMap<Uuid, Job>,
    paused: HashSet<QueueName>,
}

pub struct MemoryJobQueue {
    state: Mutex<State>,
    lease: Duration,
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::with_lease_duration(DEFAULT_LEASE)
    }

    pub fn with_lease_duration(lease: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            lease,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("memory job queue lock poisoned"))
    }

    /// Snapshot of every job, for assertions.
    pub fn jobs(&self) -> Vec<Job> {
        self.lock()
            .map(|state| state.jobs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Move a job's `run_at` into the past so it is claimable now.
    pub fn make_due(&self, job_id: Uuid) -> Result<()> {
        let mut state = self.lock()?;
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(QueueError::JobNotFound(job_id))?;
        job.run_at = Utc::now() - chrono::Duration::seconds(1);
        Ok(())
    }

    /// Age a job's timestamps, for retention tests.
    pub fn backdate(&self, job_id: Uuid, by: Duration) -> Result<()> {
        let mut state = self.lock()?;
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(QueueError::JobNotFound(job_id))?;
        let by = chrono::Duration::from_std(by)?;
        job.updated_at -= by;
        job.finished_at = job.finished_at.map(|at| at - by);
        Ok(())
    }
}

fn lease_deadline(lease: Duration) -> Result<chrono::DateTime<Utc>> {
    Ok(Utc::now() + chrono::Duration::from_std(lease)?)
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, payload: JobPayload, priority: i32) -> Result<EnqueueResult> {
        let mut state = self.lock()?;
        let id = payload.job_id();

        if let Some(existing) = state.jobs.get_mut(&id) {
            if existing.state.is_pending() {
                return Ok(EnqueueResult::Duplicate(id));
            }
            existing.payload = payload;
            existing.reset(priority, Utc::now());
            return Ok(EnqueueResult::Created(id));
        }

        state.jobs.insert(id, Job::new(payload, priority));
        Ok(EnqueueResult::Created(id))
    }

    async fn claim(&self, queue: QueueName, worker_id: &str) -> Result<Option<Job>> {
        let mut state = self.lock()?;
        if state.paused.contains(&queue) {
            return Ok(None);
        }

        let now = Utc::now();
        let next = state
            .jobs
            .values()
            .filter(|job| job.queue == queue.as_str())
            .filter(|job| match job.state {
                JobState::Waiting | JobState::Delayed => job.run_at <= now,
                JobState::Active => job.lease_expires_at.is_some_and(|at| at < now),
                JobState::Completed | JobState::Failed => false,
            })
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.created_at.cmp(&b.created_at))
            })
            .map(|job| job.id);

        let Some(id) = next else {
            return Ok(None);
        };
        let lease_expires_at = lease_deadline(self.lease)?;
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or(QueueError::JobNotFound(id))?;
        job.state = JobState::Active;
        job.worker_id = Some(worker_id.to_string());
        job.lease_expires_at = Some(lease_expires_at);
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn complete(&self, job_id: Uuid) -> Result<()> {
        let mut state = self.lock()?;
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(QueueError::JobNotFound(job_id))?;
        let now = Utc::now();
        job.state = JobState::Completed;
        job.worker_id = None;
        job.lease_expires_at = None;
        job.finished_at = Some(now);
        job.updated_at = now;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<FailOutcome> {
        let mut state = self.lock()?;
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(QueueError::JobNotFound(job_id))?;

        let now = Utc::now();
        job.attempts += 1;
        job.last_error = Some(error.to_string());
        job.worker_id = None;
        job.lease_expires_at = None;
        job.updated_at = now;

        if job.attempts >= job.max_attempts {
            job.state = JobState::Failed;
            job.finished_at = Some(now);
            return Ok(FailOutcome::Exhausted {
                attempts: job.attempts,
            });
        }

        let delay = job.policy().delay_after(job.attempts);
        job.state = JobState::Delayed;
        job.run_at = now + chrono::Duration::from_std(delay)?;
        Ok(FailOutcome::Retrying {
            attempts: job.attempts,
            run_at: job.run_at,
        })
    }

    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<()> {
        let mut state = self.lock()?;
        let lease_expires_at = lease_deadline(self.lease)?;
        if let Some(job) = state.jobs.get_mut(&job_id) {
            if job.state == JobState::Active && job.worker_id.as_deref() == Some(worker_id) {
                job.lease_expires_at = Some(lease_expires_at);
                job.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn pause(&self, queue: QueueName) -> Result<()> {
        self.lock()?.paused.insert(queue);
        Ok(())
    }

    async fn resume(&self, queue: QueueName) -> Result<()> {
        self.lock()?.paused.remove(&queue);
        Ok(())
    }

    async fn counts(&self, queue: QueueName) -> Result<QueueCounts> {
        let state = self.lock()?;
        let mut counts = QueueCounts {
            queue: queue.as_str().to_string(),
            paused: state.paused.contains(&queue),
            ..Default::default()
        };
        for job in state.jobs.values().filter(|j| j.queue == queue.as_str()) {
            counts.add(job.state, 1);
        }
        Ok(counts)
    }

    async fn promote(&self, queue: QueueName) -> Result<u64> {
        let mut state = self.lock()?;
        let now = Utc::now();
        let mut promoted = 0;
        for job in state.jobs.values_mut() {
            if job.queue == queue.as_str()
                && matches!(job.state, JobState::Waiting | JobState::Delayed)
                && job.run_at > now
            {
                job.state = JobState::Waiting;
                job.run_at = now;
                job.updated_at = now;
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    async fn force_retry(&self, payload: JobPayload) -> Result<Uuid> {
        let mut state = self.lock()?;
        let id = payload.job_id();

        match state.jobs.get_mut(&id) {
            Some(job) if job.state == JobState::Active => Err(QueueError::JobActive(id).into()),
            Some(job) => {
                job.payload = payload;
                job.reset(PRIORITY_OPERATOR, Utc::now());
                Ok(id)
            }
            None => {
                state.jobs.insert(id, Job::new(payload, PRIORITY_OPERATOR));
                Ok(id)
            }
        }
    }

    async fn clean(&self, queue: QueueName, grace: Duration, state: JobState) -> Result<u64> {
        ensure_cleanable(state)?;
        let cutoff = Utc::now() - chrono::Duration::from_std(grace)?;
        let mut guard = self.lock()?;
        let before = guard.jobs.len();
        guard.jobs.retain(|_, job| {
            !(job.queue == queue.as_str()
                && job.state == state
                && job.finished_at.unwrap_or(job.updated_at) < cutoff)
        });
        Ok((before - guard.jobs.len()) as u64)
    }

    async fn remove(&self, job_id: Uuid) -> Result<bool> {
        let mut state = self.lock()?;
        let removable = state
            .jobs
            .get(&job_id)
            .is_some_and(|job| matches!(job.state, JobState::Waiting | JobState::Delayed));
        if removable {
            state.jobs.remove(&job_id);
        }
        Ok(removable)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.lock()?.jobs.get(&job_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{DeploymentId, DomainId, WebsiteId};
    use crate::kernel::jobs::PRIORITY_NORMAL;

    fn deployment_payload() -> JobPayload {
        JobPayload::Deployment {
            deployment_id: DeploymentId::new(),
        }
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent_while_pending() {
        let queue = MemoryJobQueue::new();
        let payload = deployment_payload();

        let first = queue.enqueue(payload.clone(), PRIORITY_NORMAL).await.unwrap();
        let second = queue.enqueue(payload.clone(), PRIORITY_NORMAL).await.unwrap();

        assert!(first.is_created());
        assert_eq!(second, EnqueueResult::Duplicate(first.job_id()));
        assert_eq!(queue.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_finished_job_is_reset_in_place() {
        let queue = MemoryJobQueue::new();
        let payload = deployment_payload();
        queue.enqueue(payload.clone(), PRIORITY_NORMAL).await.unwrap();
        let job = queue.claim(QueueName::Deployment, "w1").await.unwrap().unwrap();
        queue.complete(job.id).await.unwrap();

        let again = queue.enqueue(payload, PRIORITY_NORMAL).await.unwrap();

        assert!(again.is_created());
        assert_eq!(queue.jobs().len(), 1);
        assert_eq!(queue.get(job.id).await.unwrap().unwrap().state, JobState::Waiting);
    }

    #[tokio::test]
    async fn test_claim_orders_by_priority_then_age() {
        let queue = MemoryJobQueue::new();
        let low = deployment_payload();
        let high = deployment_payload();
        queue.enqueue(low.clone(), PRIORITY_NORMAL).await.unwrap();
        queue.enqueue(high.clone(), PRIORITY_OPERATOR).await.unwrap();

        let first = queue.claim(QueueName::Deployment, "w1").await.unwrap().unwrap();
        let second = queue.claim(QueueName::Deployment, "w1").await.unwrap().unwrap();

        assert_eq!(first.id, high.job_id());
        assert_eq!(second.id, low.job_id());
        assert!(queue.claim(QueueName::Deployment, "w1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_queues_are_independent() {
        let queue = MemoryJobQueue::new();
        queue
            .enqueue(
                JobPayload::DomainVerification {
                    domain_id: DomainId::new(),
                    website_id: WebsiteId::new(),
                },
                PRIORITY_NORMAL,
            )
            .await
            .unwrap();

        assert!(queue.claim(QueueName::Deployment, "w1").await.unwrap().is_none());
        assert!(queue
            .claim(QueueName::DomainVerification, "w1")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_fail_backs_off_then_exhausts() {
        let queue = MemoryJobQueue::new();
        let payload = deployment_payload();
        queue.enqueue(payload.clone(), PRIORITY_NORMAL).await.unwrap();
        let id = payload.job_id();

        for attempt in 1..=2 {
            queue.claim(QueueName::Deployment, "w1").await.unwrap().unwrap();
            let outcome = queue.fail(id, "boom").await.unwrap();
            assert!(matches!(outcome, FailOutcome::Retrying { attempts, .. } if attempts == attempt));
            // Delayed jobs are not claimable until due.
            assert!(queue.claim(QueueName::Deployment, "w1").await.unwrap().is_none());
            queue.make_due(id).unwrap();
        }

        queue.claim(QueueName::Deployment, "w1").await.unwrap().unwrap();
        let outcome = queue.fail(id, "boom").await.unwrap();

        assert_eq!(outcome, FailOutcome::Exhausted { attempts: 3 });
        let job = queue.get(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_expired_lease_is_reclaimed() {
        let queue = MemoryJobQueue::with_lease_duration(Duration::from_millis(0));
        let payload = deployment_payload();
        queue.enqueue(payload.clone(), PRIORITY_NORMAL).await.unwrap();

        queue.claim(QueueName::Deployment, "stalled").await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let reclaimed = queue.claim(QueueName::Deployment, "w2").await.unwrap().unwrap();

        assert_eq!(reclaimed.id, payload.job_id());
        assert_eq!(reclaimed.worker_id.as_deref(), Some("w2"));
    }

    #[tokio::test]
    async fn test_force_retry_rejects_active_job() {
        let queue = MemoryJobQueue::new();
        let payload = deployment_payload();
        queue.enqueue(payload.clone(), PRIORITY_NORMAL).await.unwrap();
        queue.claim(QueueName::Deployment, "w1").await.unwrap().unwrap();

        let err = queue.force_retry(payload).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<QueueError>(),
            Some(QueueError::JobActive(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_only_touches_waiting_or_delayed() {
        let queue = MemoryJobQueue::new();
        let waiting = deployment_payload();
        let active = deployment_payload();
        queue.enqueue(active.clone(), PRIORITY_OPERATOR).await.unwrap();
        queue.enqueue(waiting.clone(), PRIORITY_NORMAL).await.unwrap();
        queue.claim(QueueName::Deployment, "w1").await.unwrap().unwrap();

        assert!(!queue.remove(active.job_id()).await.unwrap());
        assert!(queue.remove(waiting.job_id()).await.unwrap());
        assert_eq!(queue.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_clean_refuses_jobs_that_still_carry_work() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(deployment_payload(), PRIORITY_NORMAL).await.unwrap();

        for state in [JobState::Waiting, JobState::Delayed, JobState::Active] {
            let err = queue
                .clean(QueueName::Deployment, Duration::ZERO, state)
                .await
                .unwrap_err();
            assert!(matches!(
                err.downcast_ref::<QueueError>(),
                Some(QueueError::InvalidCleanState(_))
            ));
        }
        assert_eq!(queue.jobs().len(), 1);
    }
}
