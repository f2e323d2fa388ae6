//! Invitation endpoints

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

use crate::{
    middleware::AdminUser,
    models::{
        AcceptInviteRequest, AcceptInviteResponse, CreateInviteRequest, CreateInviteResponse,
        UserInfo,
    },
    utils::{AppResult, ValidatedJson},
    AppState,
};

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/accept", post(accept_invite))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/", post(create_invite))
}

/// POST /api/v1/invites
async fn create_invite(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidatedJson(payload): ValidatedJson<CreateInviteRequest>,
) -> AppResult<(StatusCode, Json<CreateInviteResponse>)> {
    let issued = state
        .one_time_tokens
        .create_invite(&admin.user, &payload.email, &payload.role)
        .await?;

    let invite_token = (!state.config.environment.is_production()).then_some(issued.raw);

    Ok((
        StatusCode::CREATED,
        Json(CreateInviteResponse {
            message: "Invite created".to_string(),
            expires_at: issued.expires_at,
            invite_token,
        }),
    ))
}

/// POST /api/v1/invites/accept
async fn accept_invite(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<AcceptInviteRequest>,
) -> AppResult<(StatusCode, Json<AcceptInviteResponse>)> {
    let user = state
        .one_time_tokens
        .accept_invite(&payload.token, &payload.name, &payload.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AcceptInviteResponse {
            message: "Invite accepted".to_string(),
            user: UserInfo::from(user),
        }),
    ))
}
