use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use typed_builder::TypedBuilder;

use crate::common::{DeploymentId, UserId, WebsiteId};

/// Website - the content service's record, reduced to what publishing needs.
///
/// `content` and `settings` are the raw JSON models edited by users; they are
/// parsed only when a deployment renders them.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, TypedBuilder)]
#[serde(rename_all = "camelCase")]
#[builder(field_defaults(setter(into)))]
pub struct Website {
    #[builder(default = WebsiteId::new())]
    pub id: WebsiteId,
    pub user_id: UserId,
    pub name: String,
    pub slug: String,
    #[builder(default = serde_json::json!({ "pages": [] }))]
    pub content: serde_json::Value,
    #[builder(default = serde_json::json!({}))]
    pub settings: serde_json::Value,

    // Publishing state
    #[builder(default)]
    pub public_url: Option<String>,
    #[builder(default)]
    pub last_deployed_at: Option<DateTime<Utc>>,
    #[builder(default)]
    pub last_publish_requested_at: Option<DateTime<Utc>>,
    #[builder(default)]
    pub last_successful_deployment_id: Option<DeploymentId>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl Website {
    /// Find website by ID
    pub async fn find_by_id(id: WebsiteId, pool: &PgPool) -> Result<Option<Self>> {
        let website = sqlx::query_as::<_, Website>("SELECT * FROM websites WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(website)
    }

    /// Insert a website (seeding, tests; the content service owns creation)
    pub async fn insert(&self, pool: &PgPool) -> Result<Self> {
        let website = sqlx::query_as::<_, Website>(
            r#"
            INSERT INTO websites (
                id, user_id, name, slug, content, settings, public_url, last_deployed_at,
                last_publish_requested_at, last_successful_deployment_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.user_id)
        .bind(&self.name)
        .bind(&self.slug)
        .bind(&self.content)
        .bind(&self.settings)
        .bind(&self.public_url)
        .bind(self.last_deployed_at)
        .bind(self.last_publish_requested_at)
        .bind(self.last_successful_deployment_id)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(pool)
        .await?;
        Ok(website)
    }

    /// Lock the website row for the rest of the transaction. Returns false
    /// when the website does not exist.
    pub async fn lock_for_update(id: WebsiteId, conn: &mut PgConnection) -> Result<bool> {
        let row = sqlx::query_scalar::<_, WebsiteId>("SELECT id FROM websites WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(row.is_some())
    }

    /// Stamp a publish request (runs inside the deployment-creation transaction)
    pub async fn mark_publish_requested(
        id: WebsiteId,
        at: DateTime<Utc>,
        conn: &mut PgConnection,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE websites SET last_publish_requested_at = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(at)
        .bind(id)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Record a successful deployment as the website's live version
    pub async fn mark_deployed(
        id: WebsiteId,
        deployment_id: DeploymentId,
        public_url: &str,
        at: DateTime<Utc>,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE websites
            SET public_url = $1,
                last_deployed_at = $2,
                last_successful_deployment_id = $3,
                updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(public_url)
        .bind(at)
        .bind(deployment_id)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }
}
