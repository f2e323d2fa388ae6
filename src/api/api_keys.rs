//! API key management endpoints
//!
//! Admins manage the webhook keys of their own organization. The plaintext key
//! and HMAC secret are only ever returned by the create call.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use uuid::Uuid;

use crate::{
    middleware::AdminUser,
    models::{ApiKey, CreateApiKeyRequest, CreateApiKeyResponse},
    utils::{AppError, AppResult, ValidatedJson},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_api_keys).post(create_api_key))
        .route("/{id}", delete(revoke_api_key))
}

async fn list_api_keys(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> AppResult<Json<Vec<ApiKey>>> {
    let keys = state.api_keys.list(admin.organization_id()).await?;
    Ok(Json(keys))
}

async fn create_api_key(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidatedJson(payload): ValidatedJson<CreateApiKeyRequest>,
) -> AppResult<(StatusCode, Json<CreateApiKeyResponse>)> {
    let created = state
        .api_keys
        .create(admin.organization_id(), payload.name.trim())
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn revoke_api_key(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if !state.api_keys.revoke(admin.organization_id(), id).await? {
        return Err(AppError::not_found("API key not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
