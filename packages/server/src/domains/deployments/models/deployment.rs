use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use typed_builder::TypedBuilder;

use crate::common::{DeploymentId, UserId, WebsiteId};

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "deployment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    #[default]
    Queued,
    InProgress,
    Success,
    Failed,
    Canceled,
}

impl DeploymentStatus {
    /// Terminal statuses are final; nothing moves a deployment out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Success | DeploymentStatus::Failed | DeploymentStatus::Canceled
        )
    }

    /// Queued or in progress. At most one per website.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeploymentStatus::Queued => "queued",
            DeploymentStatus::InProgress => "in_progress",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Deployment Model
// ============================================================================

/// One publish attempt of a website. Append-only history.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, TypedBuilder)]
#[serde(rename_all = "camelCase")]
#[builder(field_defaults(setter(into)))]
pub struct Deployment {
    #[builder(default = DeploymentId::new())]
    pub id: DeploymentId,
    pub website_id: WebsiteId,
    pub user_id: UserId,
    #[builder(default)]
    pub status: DeploymentStatus,
    #[builder(default = Deployment::version_for(Utc::now()))]
    pub version: String,
    #[builder(default)]
    pub commit_message: Option<String>,

    // Snapshots rendered by the pipeline
    pub content_snapshot: serde_json::Value,
    #[builder(default = serde_json::json!({}))]
    pub settings_snapshot: serde_json::Value,
    #[builder(default)]
    pub rollback_of: Option<DeploymentId>,

    // Outcome
    #[builder(default)]
    pub deployment_url: Option<String>,
    #[builder(default)]
    pub provider_deployment_id: Option<String>,
    #[builder(default)]
    pub error_message: Option<String>,
    #[builder(default)]
    pub build_logs: Vec<String>,
    #[builder(default)]
    pub build_time_ms: Option<i64>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[builder(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Deployment {
    /// Version string stamped on every deployment (`YYYY.MM.DD.HHmm`).
    pub fn version_for(at: DateTime<Utc>) -> String {
        at.format("%Y.%m.%d.%H%M").to_string()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Prefix a build log line with the current time.
    pub fn stamp(line: impl AsRef<str>) -> String {
        format!("[{}] {}", Utc::now().format("%H:%M:%S%.3f"), line.as_ref())
    }

    /// Append a timestamped build log line.
    pub fn log(&mut self, line: impl AsRef<str>) {
        self.build_logs.push(Self::stamp(line));
    }

    /// Apply a terminal transition in memory. `log_lines` are appended as
    /// given (see [`Deployment::stamp`]). Returns false when the deployment
    /// was already terminal.
    pub fn finish(
        &mut self,
        status: DeploymentStatus,
        error_message: Option<String>,
        log_lines: &[String],
        at: DateTime<Utc>,
    ) -> bool {
        if self.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.completed_at = Some(at);
        if let Some(started) = self.started_at {
            self.build_time_ms = Some((at - started).num_milliseconds());
        }
        if error_message.is_some() {
            self.error_message = error_message;
        }
        self.build_logs.extend_from_slice(log_lines);
        true
    }
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl Deployment {
    pub async fn find_by_id(id: DeploymentId, pool: &PgPool) -> Result<Option<Self>> {
        let deployment =
            sqlx::query_as::<_, Deployment>("SELECT * FROM deployments WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?;
        Ok(deployment)
    }

    /// Website history, newest first
    pub async fn find_by_website(website_id: WebsiteId, pool: &PgPool) -> Result<Vec<Self>> {
        let deployments = sqlx::query_as::<_, Deployment>(
            "SELECT * FROM deployments WHERE website_id = $1 ORDER BY created_at DESC",
        )
        .bind(website_id)
        .fetch_all(pool)
        .await?;
        Ok(deployments)
    }

    /// The website's queued or in-progress deployment, if any. Locks the row
    /// when run inside a transaction.
    pub async fn find_active_for_update(
        website_id: WebsiteId,
        conn: &mut PgConnection,
    ) -> Result<Option<Self>> {
        let deployment = sqlx::query_as::<_, Deployment>(
            r#"
            SELECT * FROM deployments
            WHERE website_id = $1 AND status IN ('queued', 'in_progress')
            ORDER BY created_at ASC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(website_id)
        .fetch_optional(conn)
        .await?;
        Ok(deployment)
    }

    pub async fn find_active(website_id: WebsiteId, pool: &PgPool) -> Result<Option<Self>> {
        let deployment = sqlx::query_as::<_, Deployment>(
            r#"
            SELECT * FROM deployments
            WHERE website_id = $1 AND status IN ('queued', 'in_progress')
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(website_id)
        .fetch_optional(pool)
        .await?;
        Ok(deployment)
    }

    /// Every queued deployment, oldest first
    pub async fn find_queued(pool: &PgPool) -> Result<Vec<Self>> {
        let deployments = sqlx::query_as::<_, Deployment>(
            "SELECT * FROM deployments WHERE status = 'queued' ORDER BY created_at ASC",
        )
        .fetch_all(pool)
        .await?;
        Ok(deployments)
    }

    pub async fn insert(&self, conn: &mut PgConnection) -> Result<Self> {
        let deployment = sqlx::query_as::<_, Deployment>(
            r#"
            INSERT INTO deployments (
                id, website_id, user_id, status, version, commit_message,
                content_snapshot, settings_snapshot, rollback_of, deployment_url,
                provider_deployment_id, error_message, build_logs, build_time_ms,
                created_at, started_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.website_id)
        .bind(self.user_id)
        .bind(self.status)
        .bind(&self.version)
        .bind(&self.commit_message)
        .bind(&self.content_snapshot)
        .bind(&self.settings_snapshot)
        .bind(self.rollback_of)
        .bind(&self.deployment_url)
        .bind(&self.provider_deployment_id)
        .bind(&self.error_message)
        .bind(&self.build_logs)
        .bind(self.build_time_ms)
        .bind(self.created_at)
        .bind(self.started_at)
        .bind(self.completed_at)
        .fetch_one(conn)
        .await?;
        Ok(deployment)
    }

    /// Persist the mutable fields only if the stored row is still queued or
    /// in progress. Returns whether a row changed.
    pub async fn update_if_active(&self, pool: &PgPool) -> Result<bool> {
        let rows = sqlx::query(
            r#"
            UPDATE deployments
            SET status = $2,
                deployment_url = $3,
                provider_deployment_id = $4,
                error_message = $5,
                build_logs = $6,
                build_time_ms = $7,
                started_at = $8,
                completed_at = $9
            WHERE id = $1 AND status IN ('queued', 'in_progress')
            "#,
        )
        .bind(self.id)
        .bind(self.status)
        .bind(&self.deployment_url)
        .bind(&self.provider_deployment_id)
        .bind(&self.error_message)
        .bind(&self.build_logs)
        .bind(self.build_time_ms)
        .bind(self.started_at)
        .bind(self.completed_at)
        .execute(pool)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn deployment() -> Deployment {
        Deployment::builder()
            .website_id(WebsiteId::new())
            .user_id(UserId::new())
            .content_snapshot(serde_json::json!({"pages": []}))
            .build()
    }

    #[test]
    fn test_version_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 0).unwrap();
        assert_eq!(Deployment::version_for(at), "2024.03.07.0905");
    }

    #[test]
    fn test_finish_is_one_way() {
        let mut d = deployment();
        d.started_at = Some(Utc::now());

        assert!(d.finish(DeploymentStatus::Failed, Some("boom".into()), &[], Utc::now()));
        assert!(!d.finish(DeploymentStatus::Success, None, &[], Utc::now()));

        assert_eq!(d.status, DeploymentStatus::Failed);
        assert_eq!(d.error_message.as_deref(), Some("boom"));
        assert!(d.build_time_ms.is_some());
    }

    #[test]
    fn test_finish_rejects_non_terminal_target() {
        let mut d = deployment();
        assert!(!d.finish(DeploymentStatus::InProgress, None, &[], Utc::now()));
        assert_eq!(d.status, DeploymentStatus::Queued);
    }
}
