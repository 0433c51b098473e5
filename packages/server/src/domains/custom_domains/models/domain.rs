use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use typed_builder::TypedBuilder;

use crate::common::{DomainId, UserId, WebsiteId};

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "domain_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DomainStatus {
    #[default]
    Pending,
    Active,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "verification_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    Pending,
    InProgress,
    Verified,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "ssl_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SslStatus {
    #[default]
    Pending,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsRecordType {
    A,
    Aaaa,
    Cname,
    Txt,
    Mx,
}

impl DnsRecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DnsRecordType::A => "A",
            DnsRecordType::Aaaa => "AAAA",
            DnsRecordType::Cname => "CNAME",
            DnsRecordType::Txt => "TXT",
            DnsRecordType::Mx => "MX",
        }
    }
}

impl std::fmt::Display for DnsRecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DnsRecordType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(DnsRecordType::A),
            "AAAA" => Ok(DnsRecordType::Aaaa),
            "CNAME" => Ok(DnsRecordType::Cname),
            "TXT" => Ok(DnsRecordType::Txt),
            "MX" => Ok(DnsRecordType::Mx),
            other => anyhow::bail!("unsupported DNS record type: {}", other),
        }
    }
}

/// A DNS record the domain owner has to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsRecord {
    #[serde(rename = "type")]
    pub record_type: DnsRecordType,
    pub name: String,
    pub value: String,
    pub purpose: String,
    /// Only required records gate DNS verification.
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl DnsRecord {
    pub fn required(
        record_type: DnsRecordType,
        name: impl Into<String>,
        value: impl Into<String>,
        purpose: impl Into<String>,
    ) -> Self {
        Self {
            record_type,
            name: name.into(),
            value: value.into(),
            purpose: purpose.into(),
            required: true,
        }
    }

    pub fn informational(
        record_type: DnsRecordType,
        name: impl Into<String>,
        value: impl Into<String>,
        purpose: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(record_type, name, value, purpose)
        }
    }

    /// Same type, host and value (case-insensitive).
    pub fn same_target(&self, other: &DnsRecord) -> bool {
        self.record_type == other.record_type
            && self.name.eq_ignore_ascii_case(&other.name)
            && self.value.eq_ignore_ascii_case(&other.value)
    }
}

// ============================================================================
// Domain Model
// ============================================================================

/// A custom domain attached to a website.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, TypedBuilder)]
#[serde(rename_all = "camelCase")]
#[builder(field_defaults(setter(into)))]
pub struct Domain {
    #[builder(default = DomainId::new())]
    pub id: DomainId,
    /// Normalized: lowercase, no scheme, path or trailing dot.
    pub name: String,
    pub website_id: WebsiteId,
    pub user_id: UserId,
    #[builder(default)]
    pub status: DomainStatus,
    #[builder(default)]
    pub verification_status: VerificationStatus,
    #[builder(default)]
    pub is_primary: bool,
    #[builder(default)]
    #[sqlx(json)]
    pub dns_records: Vec<DnsRecord>,
    #[builder(default)]
    pub ssl_status: SslStatus,
    #[builder(default)]
    pub last_verified_at: Option<DateTime<Utc>>,
    #[builder(default)]
    pub verification_errors: Option<String>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Domain {
    /// Only an active, verified domain may be primary.
    pub fn is_live(&self) -> bool {
        self.status == DomainStatus::Active
            && self.verification_status == VerificationStatus::Verified
    }
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl Domain {
    pub async fn find_by_id(id: DomainId, pool: &PgPool) -> Result<Option<Self>> {
        let domain = sqlx::query_as::<_, Domain>("SELECT * FROM domains WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(domain)
    }

    /// Case-insensitive lookup across all websites
    pub async fn find_by_name(name: &str, pool: &PgPool) -> Result<Option<Self>> {
        let domain =
            sqlx::query_as::<_, Domain>("SELECT * FROM domains WHERE LOWER(name) = LOWER($1)")
                .bind(name)
                .fetch_optional(pool)
                .await?;
        Ok(domain)
    }

    pub async fn find_by_website(website_id: WebsiteId, pool: &PgPool) -> Result<Vec<Self>> {
        let domains = sqlx::query_as::<_, Domain>(
            "SELECT * FROM domains WHERE website_id = $1 ORDER BY created_at ASC",
        )
        .bind(website_id)
        .fetch_all(pool)
        .await?;
        Ok(domains)
    }

    /// Insert; the unique index on LOWER(name) rejects duplicates
    pub async fn insert(&self, pool: &PgPool) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Domain>(
            r#"
            INSERT INTO domains (
                id, name, website_id, user_id, status, verification_status, is_primary,
                dns_records, ssl_status, last_verified_at, verification_errors,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(self.website_id)
        .bind(self.user_id)
        .bind(self.status)
        .bind(self.verification_status)
        .bind(self.is_primary)
        .bind(Json(&self.dns_records))
        .bind(self.ssl_status)
        .bind(self.last_verified_at)
        .bind(&self.verification_errors)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(pool)
        .await
    }

    /// Persist verification state. `is_primary` is only set through
    /// [`Domain::swap_primary`]; a write that leaves the domain not live
    /// clears it.
    pub async fn update(&self, pool: &PgPool) -> Result<Self> {
        let domain = sqlx::query_as::<_, Domain>(
            r#"
            UPDATE domains
            SET status = $2,
                verification_status = $3,
                dns_records = $4,
                ssl_status = $5,
                last_verified_at = $6,
                verification_errors = $7,
                is_primary = is_primary AND $8,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.status)
        .bind(self.verification_status)
        .bind(Json(&self.dns_records))
        .bind(self.ssl_status)
        .bind(self.last_verified_at)
        .bind(&self.verification_errors)
        .bind(self.is_live())
        .fetch_one(pool)
        .await?;
        Ok(domain)
    }

    /// Delete unless the domain is primary. Returns whether a row was removed.
    pub async fn delete_non_primary(id: DomainId, pool: &PgPool) -> Result<bool> {
        let rows = sqlx::query("DELETE FROM domains WHERE id = $1 AND is_primary = false")
            .bind(id)
            .execute(pool)
            .await?
            .rows_affected();
        Ok(rows > 0)
    }

    /// Clear the primary flag on every domain of a website
    pub async fn unset_primary(website_id: WebsiteId, conn: &mut PgConnection) -> Result<u64> {
        let rows = sqlx::query(
            "UPDATE domains SET is_primary = false, updated_at = NOW() WHERE website_id = $1 AND is_primary = true",
        )
        .bind(website_id)
        .execute(conn)
        .await?
        .rows_affected();
        Ok(rows)
    }

    /// Set the primary flag on a live domain of the website. Returns whether
    /// the target qualified.
    pub async fn set_primary(
        website_id: WebsiteId,
        domain_id: DomainId,
        conn: &mut PgConnection,
    ) -> Result<bool> {
        let rows = sqlx::query(
            r#"
            UPDATE domains
            SET is_primary = true, updated_at = NOW()
            WHERE id = $1
              AND website_id = $2
              AND status = 'active'
              AND verification_status = 'verified'
            "#,
        )
        .bind(domain_id)
        .bind(website_id)
        .execute(conn)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    /// Move the primary flag to `domain_id` in one transaction. When the
    /// target does not qualify the transaction rolls back and nothing changes.
    pub async fn swap_primary(
        website_id: WebsiteId,
        domain_id: DomainId,
        pool: &PgPool,
    ) -> Result<bool> {
        let mut tx = pool.begin().await?;
        Self::unset_primary(website_id, &mut *tx).await?;
        if !Self::set_primary(website_id, domain_id, &mut *tx).await? {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }
}
