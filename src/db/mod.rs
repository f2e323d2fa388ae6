//! Database layer
//!
//! SQLite storage for tenants, users, API keys, refresh tokens, sessions and
//! one-time tokens. Repositories borrow the pool; operations that must run inside
//! a caller-owned transaction are free functions over `&mut SqliteConnection`.

pub mod api_key_repository;
pub mod one_time_token_repository;
pub mod organization_repository;
pub mod refresh_token_repository;
pub mod session_repository;
pub mod user_repository;

pub use api_key_repository::ApiKeyRepository;
pub use organization_repository::OrganizationRepository;
pub use refresh_token_repository::RefreshTokenRepository;
pub use session_repository::SessionRepository;
pub use user_repository::UserRepository;

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::config::DatabaseConfig;

/// Database connection pool type
pub type DbPool = Pool<Sqlite>;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Schema version as seen by the running binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationStatus {
    pub applied: usize,
    pub pending: usize,
}

/// Initialize the database connection pool and run migrations
pub async fn init_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .with_context(|| format!("Invalid database URL: {}", config.url))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect_with(options)
        .await
        .context("Failed to connect to database")?;

    MIGRATOR
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    Ok(pool)
}

/// Ping the database
pub async fn check_health(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .context("Database health check failed")?;
    Ok(())
}

/// Compare the migrations embedded in the binary with those recorded in the database
pub async fn migration_status(pool: &DbPool) -> Result<MigrationStatus> {
    let applied: Vec<i64> =
        sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await
            .context("Failed to read applied migrations")?;

    let pending = MIGRATOR
        .iter()
        .filter(|m| !m.migration_type.is_down_migration())
        .filter(|m| !applied.contains(&m.version))
        .count();

    Ok(MigrationStatus {
        applied: applied.len(),
        pending,
    })
}

/// Format a timestamp for storage.
///
/// Fixed microsecond precision with a `Z` suffix keeps lexicographic order equal to
/// chronological order, which the SQL comparisons rely on.
pub fn to_db_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
pub fn parse_db_timestamp(ts: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S")
        .with_context(|| format!("Invalid timestamp in database: {}", ts))?;
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

/// Whether an error chain bottoms out in a UNIQUE constraint violation
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<sqlx::Error>(),
            Some(sqlx::Error::Database(db_err)) if db_err.is_unique_violation()
        )
    })
}

pub(crate) fn parse_optional_timestamp(ts: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    ts.map(parse_db_timestamp).transpose()
}

pub(crate) fn parse_uuid(value: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Invalid {} in database: {}", what, value))
}

pub(crate) fn parse_optional_uuid(value: Option<&str>, what: &str) -> Result<Option<Uuid>> {
    value.map(|v| parse_uuid(v, what)).transpose()
}
