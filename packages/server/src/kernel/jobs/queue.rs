//! Job queue trait and the PostgreSQL implementation.
//!
//! Mutual exclusion between workers is a property of the queue: a job is
//! handed to exactly one worker by `claim` (`FOR UPDATE SKIP LOCKED`) and a
//! worker that stops heartbeating loses its lease, after which the job can be
//! claimed again.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::job::{Job, JobPayload, JobState, QueueName, PRIORITY_OPERATOR};
use crate::common::QueueError;

/// Default lease: a worker that misses heartbeats for this long is stalled.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(60);

/// Result type for enqueue operations that handles idempotency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueResult {
    /// Job was created (or a finished job was reset in place)
    Created(Uuid),
    /// A waiting, delayed or active job already exists for this id
    Duplicate(Uuid),
}

impl EnqueueResult {
    /// Get the job ID regardless of whether it was created or duplicate
    pub fn job_id(&self) -> Uuid {
        match self {
            EnqueueResult::Created(id) | EnqueueResult::Duplicate(id) => *id,
        }
    }

    /// Returns true if this was a newly created job
    pub fn is_created(&self) -> bool {
        matches!(self, EnqueueResult::Created(_))
    }
}

/// What happened to a job after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    /// Scheduled for another attempt
    Retrying { attempts: i32, run_at: DateTime<Utc> },
    /// Attempt ceiling reached; the job is `failed`
    Exhausted { attempts: i32 },
}

/// Per-state job counts of one queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueCounts {
    pub queue: String,
    pub paused: bool,
    pub waiting: i64,
    pub delayed: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}

impl QueueCounts {
    pub(crate) fn add(&mut self, state: JobState, count: i64) {
        match state {
            JobState::Waiting => self.waiting += count,
            JobState::Delayed => self.delayed += count,
            JobState::Active => self.active += count,
            JobState::Completed => self.completed += count,
            JobState::Failed => self.failed += count,
        }
    }
}

/// Trait for job queue operations.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job whose id is the payload's entity id.
    ///
    /// Returns `Duplicate` when a waiting, delayed or active job exists for
    /// the id. A completed or failed job is reset in place.
    async fn enqueue(&self, payload: JobPayload, priority: i32) -> Result<EnqueueResult>;

    /// Claim the next runnable job of a queue, or `None`.
    ///
    /// Skips paused queues. Runnable = waiting/delayed with `run_at <= now`,
    /// or active with an expired lease. Highest priority first, then oldest.
    async fn claim(&self, queue: QueueName, worker_id: &str) -> Result<Option<Job>>;

    /// Mark an active job completed.
    async fn complete(&self, job_id: Uuid) -> Result<()>;

    /// Record a failed attempt and schedule the retry, or fail the job when
    /// its attempts are exhausted.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<FailOutcome>;

    /// Extend the lease of an active job held by `worker_id`.
    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<()>;

    async fn pause(&self, queue: QueueName) -> Result<()>;

    async fn resume(&self, queue: QueueName) -> Result<()>;

    async fn counts(&self, queue: QueueName) -> Result<QueueCounts>;

    /// Make every waiting/delayed job of the queue runnable now.
    async fn promote(&self, queue: QueueName) -> Result<u64>;

    /// Re-queue at operator priority with attempts reset. Creates the job
    /// when none exists. Fails with `QueueError::JobActive` for active jobs.
    async fn force_retry(&self, payload: JobPayload) -> Result<Uuid>;

    /// Delete finished jobs in `state` that are older than `grace`. Returns
    /// how many. Fails with `QueueError::InvalidCleanState` for waiting,
    /// delayed or active jobs, which still carry work.
    async fn clean(&self, queue: QueueName, grace: Duration, state: JobState) -> Result<u64>;

    /// Delete a waiting or delayed job. Returns whether one was removed.
    async fn remove(&self, job_id: Uuid) -> Result<bool>;

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;
}

/// PostgreSQL-backed job queue implementation.
pub struct PostgresJobQueue {
    pool: PgPool,
    lease: Duration,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease: DEFAULT_LEASE,
        }
    }

    /// Create with a custom lease duration.
    pub fn with_lease_duration(pool: PgPool, lease: Duration) -> Self {
        Self { pool, lease }
    }

    fn lease_ms(&self) -> String {
        self.lease.as_millis().to_string()
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue(&self, payload: JobPayload, priority: i32) -> Result<EnqueueResult> {
        let job = Job::new(payload, priority);

        // Returns no row when a pending job already holds the id.
        let inserted = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO jobs (
                id, queue, payload, state, priority, attempts, max_attempts, backoff_base_ms,
                run_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, 'waiting', $4, 0, $5, $6, NOW(), NOW(), NOW())
            ON CONFLICT (id) DO UPDATE
            SET state = 'waiting',
                payload = EXCLUDED.payload,
                priority = EXCLUDED.priority,
                attempts = 0,
                run_at = NOW(),
                last_error = NULL,
                worker_id = NULL,
                lease_expires_at = NULL,
                finished_at = NULL,
                updated_at = NOW()
            WHERE jobs.state IN ('completed', 'failed')
            RETURNING id
            "#,
        )
        .bind(job.id)
        .bind(&job.queue)
        .bind(sqlx::types::Json(&job.payload))
        .bind(job.priority)
        .bind(job.max_attempts)
        .bind(job.backoff_base_ms)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match inserted {
            Some(id) => {
                debug!(job_id = %id, queue = %job.queue, "enqueued job");
                EnqueueResult::Created(id)
            }
            None => EnqueueResult::Duplicate(job.id),
        })
    }

    async fn claim(&self, queue: QueueName, worker_id: &str) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            WITH next_job AS (
                SELECT j.id
                FROM jobs j
                JOIN job_queues q ON q.name = j.queue
                WHERE j.queue = $1
                  AND NOT q.paused
                  AND (
                    (j.state IN ('waiting', 'delayed') AND j.run_at <= NOW())
                    OR (j.state = 'active' AND j.lease_expires_at < NOW())
                  )
                ORDER BY j.priority DESC, j.created_at ASC
                LIMIT 1
                FOR UPDATE OF j SKIP LOCKED
            )
            UPDATE jobs
            SET state = 'active',
                worker_id = $2,
                lease_expires_at = NOW() + ($3 || ' milliseconds')::INTERVAL,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM next_job)
            RETURNING *
            "#,
        )
        .bind(queue.as_str())
        .bind(worker_id)
        .bind(self.lease_ms())
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn complete(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'completed',
                worker_id = NULL,
                lease_expires_at = NULL,
                finished_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<FailOutcome> {
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(QueueError::JobNotFound(job_id))?;

        let attempts = job.attempts + 1;
        let outcome = if attempts >= job.max_attempts {
            sqlx::query(
                r#"
                UPDATE jobs
                SET state = 'failed',
                    attempts = $2,
                    last_error = $3,
                    worker_id = NULL,
                    lease_expires_at = NULL,
                    finished_at = NOW(),
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(job_id)
            .bind(attempts)
            .bind(error)
            .execute(&mut *tx)
            .await?;
            FailOutcome::Exhausted { attempts }
        } else {
            let delay = job.policy().delay_after(attempts);
            let run_at = Utc::now() + chrono::Duration::from_std(delay)?;
            sqlx::query(
                r#"
                UPDATE jobs
                SET state = 'delayed',
                    attempts = $2,
                    last_error = $3,
                    run_at = $4,
                    worker_id = NULL,
                    lease_expires_at = NULL,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(job_id)
            .bind(attempts)
            .bind(error)
            .bind(run_at)
            .execute(&mut *tx)
            .await?;
            FailOutcome::Retrying { attempts, run_at }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<()> {
        let rows = sqlx::query(
            r#"
            UPDATE jobs
            SET lease_expires_at = NOW() + ($1 || ' milliseconds')::INTERVAL,
                updated_at = NOW()
            WHERE id = $2 AND state = 'active' AND worker_id = $3
            "#,
        )
        .bind(self.lease_ms())
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            warn!(job_id = %job_id, worker_id = %worker_id, "heartbeat for a job this worker no longer holds");
        }
        Ok(())
    }

    async fn pause(&self, queue: QueueName) -> Result<()> {
        set_paused(&self.pool, queue, true).await?;
        info!(queue = %queue, "queue paused");
        Ok(())
    }

    async fn resume(&self, queue: QueueName) -> Result<()> {
        set_paused(&self.pool, queue, false).await?;
        info!(queue = %queue, "queue resumed");
        Ok(())
    }

    async fn counts(&self, queue: QueueName) -> Result<QueueCounts> {
        let paused = sqlx::query_scalar::<_, bool>("SELECT paused FROM job_queues WHERE name = $1")
            .bind(queue.as_str())
            .fetch_optional(&self.pool)
            .await?
            .unwrap_or(false);

        let rows = sqlx::query_as::<_, (JobState, i64)>(
            "SELECT state, COUNT(*) FROM jobs WHERE queue = $1 GROUP BY state",
        )
        .bind(queue.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut counts = QueueCounts {
            queue: queue.as_str().to_string(),
            paused,
            ..Default::default()
        };
        for (state, count) in rows {
            counts.add(state, count);
        }
        Ok(counts)
    }

    async fn promote(&self, queue: QueueName) -> Result<u64> {
        let rows = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'waiting', run_at = NOW(), updated_at = NOW()
            WHERE queue = $1 AND state IN ('waiting', 'delayed') AND run_at > NOW()
            "#,
        )
        .bind(queue.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows)
    }

    async fn force_retry(&self, payload: JobPayload) -> Result<Uuid> {
        let job = Job::new(payload, PRIORITY_OPERATOR);

        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO jobs (
                id, queue, payload, state, priority, attempts, max_attempts, backoff_base_ms,
                run_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, 'waiting', $4, 0, $5, $6, NOW(), NOW(), NOW())
            ON CONFLICT (id) DO UPDATE
            SET state = 'waiting',
                payload = EXCLUDED.payload,
                priority = EXCLUDED.priority,
                attempts = 0,
                run_at = NOW(),
                last_error = NULL,
                worker_id = NULL,
                lease_expires_at = NULL,
                finished_at = NULL,
                updated_at = NOW()
            WHERE jobs.state <> 'active'
            RETURNING id
            "#,
        )
        .bind(job.id)
        .bind(&job.queue)
        .bind(sqlx::types::Json(&job.payload))
        .bind(job.priority)
        .bind(job.max_attempts)
        .bind(job.backoff_base_ms)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(QueueError::JobActive(job.id))?;

        info!(job_id = %id, queue = %job.queue, "job force-retried");
        Ok(id)
    }

    async fn clean(&self, queue: QueueName, grace: Duration, state: JobState) -> Result<u64> {
        ensure_cleanable(state)?;
        let cutoff = Utc::now() - chrono::Duration::from_std(grace)?;
        let rows = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE queue = $1
              AND state = $2
              AND COALESCE(finished_at, updated_at) < $3
            "#,
        )
        .bind(queue.as_str())
        .bind(state)
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows)
    }

    async fn remove(&self, job_id: Uuid) -> Result<bool> {
        let rows =
            sqlx::query("DELETE FROM jobs WHERE id = $1 AND state IN ('waiting', 'delayed')")
                .bind(job_id)
                .execute(&self.pool)
                .await?
                .rows_affected();
        Ok(rows > 0)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }
}

pub(crate) fn ensure_cleanable(state: JobState) -> Result<(), QueueError> {
    if state.is_finished() {
        Ok(())
    } else {
        Err(QueueError::InvalidCleanState(state.as_str().to_string()))
    }
}

async fn set_paused(pool: &PgPool, queue: QueueName, paused: bool) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO job_queues (name, paused, updated_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (name) DO UPDATE SET paused = EXCLUDED.paused, updated_at = NOW()
        "#,
    )
    .bind(queue.as_str())
    .bind(paused)
    .execute(pool)
    .await?;
    Ok(())
}
