//! User repository

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{
    parse_db_timestamp, parse_optional_timestamp, parse_optional_uuid, parse_uuid,
    to_db_timestamp,
};
use crate::models::{NewUser, User};
use crate::services::crypto::generate_public_id;

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    public_id: String,
    organization_id: String,
    sub_organization_id: Option<String>,
    email: String,
    name: Option<String>,
    password_hash: String,
    role: String,
    is_active: bool,
    email_verified_at: Option<String>,
    created_at: String,
    updated_at: String,
}

pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, public_id, organization_id, sub_organization_id, email, name,
                   password_hash, role, is_active, email_verified_at, created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to get user")?;

        row.map(row_to_user).transpose()
    }

    /// All users with this email across organizations, oldest first
    pub async fn find_by_email(&self, email: &str) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, public_id, organization_id, sub_organization_id, email, name,
                   password_hash, role, is_active, email_verified_at, created_at, updated_at
            FROM users
            WHERE email = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(email)
        .fetch_all(self.pool)
        .await
        .context("Failed to find users by email")?;

        rows.into_iter().map(row_to_user).collect()
    }

    pub async fn create(&self, new_user: &NewUser) -> Result<User> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        insert(&mut conn, new_user).await
    }
}

/// Insert a user on the given connection
pub async fn insert(conn: &mut SqliteConnection, new_user: &NewUser) -> Result<User> {
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        public_id: generate_public_id("usr"),
        organization_id: new_user.organization_id,
        sub_organization_id: new_user.sub_organization_id,
        email: new_user.email.clone(),
        name: new_user.name.clone(),
        password_hash: new_user.password_hash.clone(),
        role: new_user.role.clone(),
        is_active: true,
        email_verified_at: new_user.email_verified.then_some(now),
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO users (id, public_id, organization_id, sub_organization_id, email, name,
                           password_hash, role, is_active, email_verified_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.id.to_string())
    .bind(&user.public_id)
    .bind(user.organization_id.to_string())
    .bind(user.sub_organization_id.map(|id| id.to_string()))
    .bind(&user.email)
    .bind(&user.name)
    .bind(&user.password_hash)
    .bind(&user.role)
    .bind(user.is_active)
    .bind(user.email_verified_at.map(to_db_timestamp))
    .bind(to_db_timestamp(user.created_at))
    .bind(to_db_timestamp(user.updated_at))
    .execute(&mut *conn)
    .await?;

    Ok(user)
}

/// Replace a user's password hash
pub async fn update_password(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    password_hash: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(to_db_timestamp(now))
        .bind(user_id.to_string())
        .execute(&mut *conn)
        .await
        .context("Failed to update password")?;

    Ok(result.rows_affected() > 0)
}

fn row_to_user(row: UserRow) -> Result<User> {
    Ok(User {
        id: parse_uuid(&row.id, "user id")?,
        public_id: row.public_id,
        organization_id: parse_uuid(&row.organization_id, "organization id")?,
        sub_organization_id: parse_optional_uuid(
            row.sub_organization_id.as_deref(),
            "sub-organization id",
        )?,
        email: row.email,
        name: row.name,
        password_hash: row.password_hash,
        role: row.role,
        is_active: row.is_active,
        email_verified_at: parse_optional_timestamp(row.email_verified_at.as_deref())?,
        created_at: parse_db_timestamp(&row.created_at)?,
        updated_at: parse_db_timestamp(&row.updated_at)?,
    })
}
