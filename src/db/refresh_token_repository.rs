//! Refresh token repository
//!
//! Token rows form an arena keyed by id with forward links through
//! `replaced_by_token_id`. Writes that belong to a rotation, logout or password
//! change run on a caller-owned transaction.

use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{
    parse_db_timestamp, parse_optional_timestamp, parse_optional_uuid, parse_uuid,
    to_db_timestamp,
};
use crate::models::RefreshToken;

#[derive(Debug, sqlx::FromRow)]
struct RefreshTokenRow {
    id: String,
    user_id: String,
    token_hash: String,
    created_at: String,
    revoked_at: Option<String>,
    replaced_by_token_id: Option<String>,
    user_agent: Option<String>,
    ip: Option<String>,
}

pub struct RefreshTokenRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RefreshTokenRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<RefreshToken>> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT id, user_id, token_hash, created_at, revoked_at, replaced_by_token_id,
                   user_agent, ip
            FROM refresh_tokens
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to get refresh token")?;

        row.map(row_to_token).transpose()
    }

    /// Every token of the user, newest first
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<RefreshToken>> {
        let rows = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT id, user_id, token_hash, created_at, revoked_at, replaced_by_token_id,
                   user_agent, ip
            FROM refresh_tokens
            WHERE user_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(self.pool)
        .await
        .context("Failed to list refresh tokens")?;

        rows.into_iter().map(row_to_token).collect()
    }

    /// Unrevoked tokens of the user, newest first
    pub async fn list_unrevoked_for_user(&self, user_id: Uuid) -> Result<Vec<RefreshToken>> {
        let rows = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT id, user_id, token_hash, created_at, revoked_at, replaced_by_token_id,
                   user_agent, ip
            FROM refresh_tokens
            WHERE user_id = ? AND revoked_at IS NULL
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(self.pool)
        .await
        .context("Failed to list refresh tokens")?;

        rows.into_iter().map(row_to_token).collect()
    }

    /// Follow the rotation chain starting at `id`, including `id` itself
    pub async fn chain_from(&self, id: Uuid) -> Result<Vec<RefreshToken>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(id);

        while let Some(current) = next {
            if !seen.insert(current) {
                anyhow::bail!("Refresh token chain loops at {}", current);
            }
            let Some(token) = self.get_by_id(current).await? else {
                break;
            };
            next = token.replaced_by_token_id;
            chain.push(token);
        }

        Ok(chain)
    }
}

pub async fn insert(conn: &mut SqliteConnection, token: &RefreshToken) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (id, user_id, token_hash, created_at, revoked_at,
                                    replaced_by_token_id, user_agent, ip)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(token.id.to_string())
    .bind(token.user_id.to_string())
    .bind(&token.token_hash)
    .bind(to_db_timestamp(token.created_at))
    .bind(token.revoked_at.map(to_db_timestamp))
    .bind(token.replaced_by_token_id.map(|id| id.to_string()))
    .bind(&token.user_agent)
    .bind(&token.ip)
    .execute(&mut *conn)
    .await
    .context("Failed to insert refresh token")?;

    Ok(())
}

/// Revoke `old_id` and link it to its successor.
///
/// Only succeeds while the row is unrevoked, so of two concurrent rotations of the
/// same token exactly one sees `true`.
pub async fn mark_rotated(
    conn: &mut SqliteConnection,
    old_id: Uuid,
    new_id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE refresh_tokens SET revoked_at = ?, replaced_by_token_id = ?
        WHERE id = ? AND revoked_at IS NULL
        "#,
    )
    .bind(to_db_timestamp(now))
    .bind(new_id.to_string())
    .bind(old_id.to_string())
    .execute(&mut *conn)
    .await
    .context("Failed to rotate refresh token")?;

    Ok(result.rows_affected() == 1)
}

pub async fn revoke(conn: &mut SqliteConnection, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
    let result =
        sqlx::query("UPDATE refresh_tokens SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL")
            .bind(to_db_timestamp(now))
            .bind(id.to_string())
            .execute(&mut *conn)
            .await
            .context("Failed to revoke refresh token")?;

    Ok(result.rows_affected() > 0)
}

pub async fn revoke_all_for_user(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE refresh_tokens SET revoked_at = ? WHERE user_id = ? AND revoked_at IS NULL",
    )
    .bind(to_db_timestamp(now))
    .bind(user_id.to_string())
    .execute(&mut *conn)
    .await
    .context("Failed to revoke refresh tokens")?;

    Ok(result.rows_affected())
}

fn row_to_token(row: RefreshTokenRow) -> Result<RefreshToken> {
    Ok(RefreshToken {
        id: parse_uuid(&row.id, "refresh token id")?,
        user_id: parse_uuid(&row.user_id, "user id")?,
        token_hash: row.token_hash,
        created_at: parse_db_timestamp(&row.created_at)?,
        revoked_at: parse_optional_timestamp(row.revoked_at.as_deref())?,
        replaced_by_token_id: parse_optional_uuid(
            row.replaced_by_token_id.as_deref(),
            "refresh token id",
        )?,
        user_agent: row.user_agent,
        ip: row.ip,
    })
}
