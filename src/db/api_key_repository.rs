//! API key repository
//!
//! Keys are looked up by the SHA-256 hash of the presented plaintext. Rows are never
//! deleted; revocation is terminal.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_db_timestamp, parse_optional_timestamp, parse_uuid, to_db_timestamp};
use crate::models::{ApiKey, ApiKeyStatus, ResolvedApiKey};

#[derive(Debug, sqlx::FromRow)]
struct ApiKeyRow {
    id: String,
    public_id: String,
    organization_id: String,
    name: String,
    created_at: String,
    last_used_at: Option<String>,
    revoked_at: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct ResolvedRow {
    id: String,
    organization_id: String,
    hmac_secret: String,
}

/// Fields for a new key; the plaintext never reaches this layer
pub struct NewApiKey<'k> {
    pub organization_id: Uuid,
    pub public_id: &'k str,
    pub name: &'k str,
    pub key_hash: &'k str,
    pub hmac_secret: &'k str,
}

pub struct ApiKeyRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ApiKeyRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Find the active key with this hash
    pub async fn find_active_by_hash(&self, key_hash: &str) -> Result<Option<ResolvedApiKey>> {
        let row = sqlx::query_as::<_, ResolvedRow>(
            r#"
            SELECT id, organization_id, hmac_secret
            FROM api_keys
            WHERE key_hash = ? AND revoked_at IS NULL
            "#,
        )
        .bind(key_hash)
        .fetch_optional(self.pool)
        .await
        .context("Failed to resolve api key")?;

        row.map(|row| {
            Ok(ResolvedApiKey {
                api_key_id: parse_uuid(&row.id, "api key id")?,
                organization_id: parse_uuid(&row.organization_id, "organization id")?,
                hmac_secret: row.hmac_secret,
            })
        })
        .transpose()
    }

    pub async fn touch_last_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(to_db_timestamp(at))
            .bind(id.to_string())
            .execute(self.pool)
            .await
            .context("Failed to update api key last_used_at")?;
        Ok(())
    }

    pub async fn list_for_organization(&self, organization_id: Uuid) -> Result<Vec<ApiKey>> {
        let rows = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            SELECT id, public_id, organization_id, name, created_at, last_used_at, revoked_at
            FROM api_keys
            WHERE organization_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(organization_id.to_string())
        .fetch_all(self.pool)
        .await
        .context("Failed to list api keys")?;

        rows.into_iter().map(row_to_api_key).collect()
    }

    pub async fn get_by_id(&self, organization_id: Uuid, id: Uuid) -> Result<Option<ApiKey>> {
        let row = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            SELECT id, public_id, organization_id, name, created_at, last_used_at, revoked_at
            FROM api_keys
            WHERE organization_id = ? AND id = ?
            "#,
        )
        .bind(organization_id.to_string())
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to get api key")?;

        row.map(row_to_api_key).transpose()
    }

    pub async fn create(&self, new_key: NewApiKey<'_>) -> Result<ApiKey> {
        let key = ApiKey {
            id: Uuid::new_v4(),
            public_id: new_key.public_id.to_string(),
            organization_id: new_key.organization_id,
            name: new_key.name.to_string(),
            status: ApiKeyStatus::Active,
            created_at: Utc::now(),
            last_used_at: None,
            revoked_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO api_keys (id, public_id, organization_id, key_hash, hmac_secret, name, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(key.id.to_string())
        .bind(&key.public_id)
        .bind(key.organization_id.to_string())
        .bind(new_key.key_hash)
        .bind(new_key.hmac_secret)
        .bind(&key.name)
        .bind(to_db_timestamp(key.created_at))
        .execute(self.pool)
        .await
        .context("Failed to create api key")?;

        Ok(key)
    }

    /// Revoke a key in the organization. Returns false if it was missing or already revoked.
    pub async fn revoke(&self, organization_id: Uuid, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE api_keys SET revoked_at = ?
            WHERE organization_id = ? AND id = ? AND revoked_at IS NULL
            "#,
        )
        .bind(to_db_timestamp(at))
        .bind(organization_id.to_string())
        .bind(id.to_string())
        .execute(self.pool)
        .await
        .context("Failed to revoke api key")?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_api_key(row: ApiKeyRow) -> Result<ApiKey> {
    let revoked_at = parse_optional_timestamp(row.revoked_at.as_deref())?;
    Ok(ApiKey {
        id: parse_uuid(&row.id, "api key id")?,
        public_id: row.public_id,
        organization_id: parse_uuid(&row.organization_id, "organization id")?,
        name: row.name,
        status: if revoked_at.is_some() {
            ApiKeyStatus::Revoked
        } else {
            ApiKeyStatus::Active
        },
        created_at: parse_db_timestamp(&row.created_at)?,
        last_used_at: parse_optional_timestamp(row.last_used_at.as_deref())?,
        revoked_at,
    })
}
