//! Health endpoints
//!
//! `/health` and `/health/live` never touch storage. `/health/ready` and
//! `/health/detailed` require the database to answer with every embedded
//! migration applied; the detailed report also shows limiter occupancy.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;

use crate::{db, AppState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedHealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: DatabaseHealth,
    pub rate_limits: LimiterUsage,
    pub signing_required: bool,
}

/// Store reachability and schema state
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseHealth {
    pub reachable: bool,
    pub applied_migrations: usize,
    pub pending_migrations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DatabaseHealth {
    fn is_ready(&self) -> bool {
        self.reachable && self.pending_migrations == 0 && self.error.is_none()
    }

    fn unreachable(error: &anyhow::Error) -> Self {
        Self {
            reachable: false,
            applied_migrations: 0,
            pending_migrations: 0,
            error: Some(format!("{:#}", error)),
        }
    }
}

/// Keys currently holding limiter state
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimiterUsage {
    pub webhook_keys: usize,
    pub credential_keys: usize,
}

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn status_label(healthy: bool) -> &'static str {
    if healthy {
        "healthy"
    } else {
        "unhealthy"
    }
}

async fn database_health(pool: &db::DbPool) -> DatabaseHealth {
    if let Err(e) = db::check_health(pool).await {
        return DatabaseHealth::unreachable(&e);
    }

    match db::migration_status(pool).await {
        Ok(status) => DatabaseHealth {
            reachable: true,
            applied_migrations: status.applied,
            pending_migrations: status.pending,
            error: None,
        },
        // Reachable, but the schema state is unknown
        Err(e) => DatabaseHealth {
            reachable: true,
            ..DatabaseHealth::unreachable(&e)
        },
    }
}

/// Process is up
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: VERSION,
    })
}

/// Database and limiter report; 503 unless the database is ready
pub async fn health_check_detailed(
    State(state): State<AppState>,
) -> (StatusCode, Json<DetailedHealthResponse>) {
    let database = database_health(&state.db).await;
    let healthy = database.is_ready();
    if !healthy {
        warn!(?database, "Detailed health check failed");
    }

    let response = DetailedHealthResponse {
        status: status_label(healthy),
        version: VERSION,
        database,
        rate_limits: LimiterUsage {
            webhook_keys: state.rate_limiter.tracked_keys().await,
            credential_keys: state.credential_limiter.tracked_keys(),
        },
        signing_required: state.config.signing.required,
    };

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(response))
}

pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Ready once the database answers with the schema fully migrated
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if database_health(&state.db).await.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
