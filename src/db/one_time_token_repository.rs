//! One-time token repository
//!
//! Tokens are stored as SHA-256 hashes. Consumption is a single conditional
//! `UPDATE ... RETURNING`, so a token is used at most once even under concurrency.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::{
    parse_db_timestamp, parse_optional_timestamp, parse_optional_uuid, parse_uuid,
    to_db_timestamp,
};
use crate::models::{NewOneTimeToken, OneTimeToken, OneTimeTokenType};

#[derive(Debug, sqlx::FromRow)]
struct OneTimeTokenRow {
    id: String,
    token_type: String,
    user_id: Option<String>,
    organization_id: Option<String>,
    invite_email: Option<String>,
    invite_role: Option<String>,
    expires_at: String,
    used_at: Option<String>,
    created_at: String,
}

pub async fn insert(
    conn: &mut SqliteConnection,
    token_hash: &str,
    new_token: &NewOneTimeToken,
) -> Result<OneTimeToken> {
    let token = OneTimeToken {
        id: Uuid::new_v4(),
        token_type: new_token.token_type,
        user_id: new_token.user_id,
        organization_id: new_token.organization_id,
        invite_email: new_token.invite_email.clone(),
        invite_role: new_token.invite_role.clone(),
        expires_at: new_token.expires_at,
        used_at: None,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO one_time_tokens (id, token_hash, token_type, user_id, organization_id,
                                     invite_email, invite_role, expires_at, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(token.id.to_string())
    .bind(token_hash)
    .bind(token.token_type.as_str())
    .bind(token.user_id.map(|id| id.to_string()))
    .bind(token.organization_id.map(|id| id.to_string()))
    .bind(&token.invite_email)
    .bind(&token.invite_role)
    .bind(to_db_timestamp(token.expires_at))
    .bind(to_db_timestamp(token.created_at))
    .execute(&mut *conn)
    .await
    .context("Failed to insert one-time token")?;

    Ok(token)
}

/// Expire every unused token of this type still outstanding for the user
pub async fn expire_outstanding(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    token_type: OneTimeTokenType,
    now: DateTime<Utc>,
) -> Result<u64> {
    let now = to_db_timestamp(now);
    let result = sqlx::query(
        r#"
        UPDATE one_time_tokens SET expires_at = ?
        WHERE user_id = ? AND token_type = ? AND used_at IS NULL AND expires_at > ?
        "#,
    )
    .bind(&now)
    .bind(user_id.to_string())
    .bind(token_type.as_str())
    .bind(&now)
    .execute(&mut *conn)
    .await
    .context("Failed to expire outstanding tokens")?;

    Ok(result.rows_affected())
}

/// Mark a live token as used and return it.
///
/// Returns `None` when the hash is unknown, of another type, already used or expired.
pub async fn consume(
    conn: &mut SqliteConnection,
    token_hash: &str,
    token_type: OneTimeTokenType,
    now: DateTime<Utc>,
) -> Result<Option<OneTimeToken>> {
    let now = to_db_timestamp(now);
    let row = sqlx::query_as::<_, OneTimeTokenRow>(
        r#"
        UPDATE one_time_tokens SET used_at = ?
        WHERE token_hash = ? AND token_type = ? AND used_at IS NULL AND expires_at > ?
        RETURNING id, token_type, user_id, organization_id, invite_email, invite_role,
                  expires_at, used_at, created_at
        "#,
    )
    .bind(&now)
    .bind(token_hash)
    .bind(token_type.as_str())
    .bind(&now)
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to consume one-time token")?;

    row.map(row_to_token).transpose()
}

fn row_to_token(row: OneTimeTokenRow) -> Result<OneTimeToken> {
    Ok(OneTimeToken {
        id: parse_uuid(&row.id, "one-time token id")?,
        token_type: row
            .token_type
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?,
        user_id: parse_optional_uuid(row.user_id.as_deref(), "user id")?,
        organization_id: parse_optional_uuid(row.organization_id.as_deref(), "organization id")?,
        invite_email: row.invite_email,
        invite_role: row.invite_role,
        expires_at: parse_db_timestamp(&row.expires_at)?,
        used_at: parse_optional_timestamp(row.used_at.as_deref())?,
        created_at: parse_db_timestamp(&row.created_at)?,
    })
}
