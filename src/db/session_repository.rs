//! User session repository

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{parse_db_timestamp, parse_uuid, to_db_timestamp};
use crate::models::{DeviceMetadata, UserSession};

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    organization_id: String,
    refresh_token_id: String,
    refresh_token_hash: String,
    expires_at: String,
    remember_me: bool,
    user_agent: Option<String>,
    ip: Option<String>,
    created_at: String,
}

pub struct SessionRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SessionRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Session paired with the given refresh token
    pub async fn find_by_refresh_token(&self, refresh_token_id: Uuid) -> Result<Option<UserSession>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, user_id, organization_id, refresh_token_id, refresh_token_hash,
                   expires_at, remember_me, user_agent, ip, created_at
            FROM user_sessions
            WHERE refresh_token_id = ?
            "#,
        )
        .bind(refresh_token_id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to get session")?;

        row.map(row_to_session).transpose()
    }

    /// Every session of the user, newest first
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<UserSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, user_id, organization_id, refresh_token_id, refresh_token_hash,
                   expires_at, remember_me, user_agent, ip, created_at
            FROM user_sessions
            WHERE user_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(self.pool)
        .await
        .context("Failed to list sessions")?;

        rows.into_iter().map(row_to_session).collect()
    }
}

pub async fn insert(conn: &mut SqliteConnection, session: &UserSession) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO user_sessions (id, user_id, organization_id, refresh_token_id,
                                   refresh_token_hash, expires_at, remember_me, user_agent, ip,
                                   created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(session.id.to_string())
    .bind(session.user_id.to_string())
    .bind(session.organization_id.to_string())
    .bind(session.refresh_token_id.to_string())
    .bind(&session.refresh_token_hash)
    .bind(to_db_timestamp(session.expires_at))
    .bind(session.remember_me)
    .bind(&session.device.user_agent)
    .bind(&session.device.ip)
    .bind(to_db_timestamp(session.created_at))
    .execute(&mut *conn)
    .await
    .context("Failed to insert session")?;

    Ok(())
}

/// End the session paired with a refresh token, if it is still running
pub async fn expire_for_refresh_token(
    conn: &mut SqliteConnection,
    refresh_token_id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool> {
    let now = to_db_timestamp(now);
    let result = sqlx::query(
        "UPDATE user_sessions SET expires_at = ? WHERE refresh_token_id = ? AND expires_at > ?",
    )
    .bind(&now)
    .bind(refresh_token_id.to_string())
    .bind(&now)
    .execute(&mut *conn)
    .await
    .context("Failed to expire session")?;

    Ok(result.rows_affected() > 0)
}

pub async fn expire_all_for_user(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<u64> {
    let now = to_db_timestamp(now);
    let result =
        sqlx::query("UPDATE user_sessions SET expires_at = ? WHERE user_id = ? AND expires_at > ?")
            .bind(&now)
            .bind(user_id.to_string())
            .bind(&now)
            .execute(&mut *conn)
            .await
            .context("Failed to expire sessions")?;

    Ok(result.rows_affected())
}

fn row_to_session(row: SessionRow) -> Result<UserSession> {
    Ok(UserSession {
        id: parse_uuid(&row.id, "session id")?,
        user_id: parse_uuid(&row.user_id, "user id")?,
        organization_id: parse_uuid(&row.organization_id, "organization id")?,
        refresh_token_id: parse_uuid(&row.refresh_token_id, "refresh token id")?,
        refresh_token_hash: row.refresh_token_hash,
        expires_at: parse_db_timestamp(&row.expires_at)?,
        remember_me: row.remember_me,
        device: DeviceMetadata {
            user_agent: row.user_agent,
            ip: row.ip,
        },
        created_at: parse_db_timestamp(&row.created_at)?,
    })
}
