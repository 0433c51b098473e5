//! Job model for the durable publishing queues.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::common::{DeploymentId, DomainId, QueueError, WebsiteId};

/// Default priority for organic work.
pub const PRIORITY_NORMAL: i32 = 0;

/// Operator-triggered retries outrank organic processing.
pub const PRIORITY_OPERATOR: i32 = 100;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Delayed => "delayed",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Jobs that count as in flight for idempotent enqueue.
    pub fn is_pending(&self) -> bool {
        !self.is_finished()
    }
}

impl FromStr for JobState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "waiting" => Ok(JobState::Waiting),
            "delayed" => Ok(JobState::Delayed),
            "active" => Ok(JobState::Active),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            other => anyhow::bail!("unknown job state: {}", other),
        }
    }
}

/// Named queues. Each has its own retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueName {
    Deployment,
    DomainVerification,
}

impl QueueName {
    pub const ALL: [QueueName; 2] = [QueueName::Deployment, QueueName::DomainVerification];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Deployment => "deployment",
            QueueName::DomainVerification => "domain-verification",
        }
    }

    pub fn policy(&self) -> BackoffPolicy {
        match self {
            QueueName::Deployment => BackoffPolicy {
                max_attempts: 3,
                base_delay: Duration::from_secs(5),
            },
            QueueName::DomainVerification => BackoffPolicy {
                max_attempts: 5,
                base_delay: Duration::from_secs(10),
            },
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, QueueError> {
        match s {
            "deployment" => Ok(QueueName::Deployment),
            "domain-verification" => Ok(QueueName::DomainVerification),
            other => Err(QueueError::UnknownQueue(other.to_string())),
        }
    }
}

/// Attempt ceiling and exponential backoff base for a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_attempts: i32,
    pub base_delay: Duration,
}

impl BackoffPolicy {
    /// Delay before the next attempt after `failures` failed attempts:
    /// `base * 2^(failures - 1)`.
    pub fn delay_after(&self, failures: i32) -> Duration {
        let exponent = (failures.max(1) - 1).min(16) as u32;
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

// ============================================================================
// Payload
// ============================================================================

/// What a job works on. The job id is the target entity's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    Deployment {
        deployment_id: DeploymentId,
    },
    DomainVerification {
        domain_id: DomainId,
        website_id: WebsiteId,
    },
}

impl JobPayload {
    pub fn queue(&self) -> QueueName {
        match self {
            JobPayload::Deployment { .. } => QueueName::Deployment,
            JobPayload::DomainVerification { .. } => QueueName::DomainVerification,
        }
    }

    pub fn job_id(&self) -> Uuid {
        match self {
            JobPayload::Deployment { deployment_id } => deployment_id.into_uuid(),
            JobPayload::DomainVerification { domain_id, .. } => domain_id.into_uuid(),
        }
    }
}

// ============================================================================
// Job Model
// ============================================================================

#[derive(FromRow, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub queue: String,
    #[sqlx(json)]
    pub payload: JobPayload,
    pub state: JobState,
    pub priority: i32,
    pub attempts: i32,
    pub max_attempts: i32,
    pub backoff_base_ms: i64,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub worker_id: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// A fresh waiting job using the payload's queue policy.
    pub fn new(payload: JobPayload, priority: i32) -> Self {
        let queue = payload.queue();
        let policy = queue.policy();
        let now = Utc::now();
        Self {
            id: payload.job_id(),
            queue: queue.as_str().to_string(),
            payload,
            state: JobState::Waiting,
            priority,
            attempts: 0,
            max_attempts: policy.max_attempts,
            backoff_base_ms: policy.base_delay.as_millis() as i64,
            run_at: now,
            last_error: None,
            worker_id: None,
            lease_expires_at: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.backoff_base_ms.max(0) as u64),
        }
    }

    /// True when this failure is the last allowed attempt.
    pub fn is_last_attempt(&self) -> bool {
        self.attempts + 1 >= self.max_attempts
    }

    /// Reset a finished job in place for another run.
    pub(crate) fn reset(&mut self, priority: i32, now: DateTime<Utc>) {
        self.state = JobState::Waiting;
        self.priority = priority;
        self.attempts = 0;
        self.run_at = now;
        self.last_error = None;
        self.worker_id = None;
        self.lease_expires_at = None;
        self.finished_at = None;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = QueueName::Deployment.policy();
        assert_eq!(policy.delay_after(1), Duration::from_secs(5));
        assert_eq!(policy.delay_after(2), Duration::from_secs(10));
        assert_eq!(policy.delay_after(3), Duration::from_secs(20));
    }

    #[test]
    fn test_queue_policies() {
        assert_eq!(QueueName::Deployment.policy().max_attempts, 3);
        let verification = QueueName::DomainVerification.policy();
        assert_eq!(verification.max_attempts, 5);
        assert_eq!(verification.base_delay, Duration::from_secs(10));
    }

    #[test]
    fn test_job_id_is_entity_id() {
        let deployment_id = DeploymentId::new();
        let job = Job::new(JobPayload::Deployment { deployment_id }, PRIORITY_NORMAL);
        assert_eq!(job.id, deployment_id.into_uuid());
        assert_eq!(job.queue, "deployment");
    }

    #[test]
    fn test_unknown_queue_name() {
        assert!(matches!(
            "emails".parse::<QueueName>(),
            Err(QueueError::UnknownQueue(_))
        ));
    }
}
