//! Authentication API endpoints
//!
//! Login, token refresh, logout and the password reset flow are public; the
//! profile, session list and password change need a bearer access token.

use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};

use crate::{
    middleware::{credential_rate_limit_middleware, AuthUser},
    models::{
        ChangePasswordRequest, ChangePasswordResponse, ForgotPasswordRequest,
        ForgotPasswordResponse, LoginRequest, LoginResponse, LogoutRequest, MessageResponse,
        RefreshTokenRequest, ResetPasswordRequest, ResetPasswordResponse, SessionInfo,
        TokenPairResponse, UserInfo,
    },
    utils::{AppResult, ClientDevice, ValidatedJson},
    AppState,
};

const LOGOUT_MESSAGE: &str = "Logged out";
const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account exists for that email, a reset link has been sent";

/// Create public routes for authentication endpoints (no auth required)
pub fn public_routes(state: AppState) -> Router<AppState> {
    let limited = Router::new()
        .route("/login", post(login))
        .route("/forgot-password", post(forgot_password))
        .route_layer(from_fn_with_state(state, credential_rate_limit_middleware));

    Router::new()
        .route("/refresh", post(refresh_token))
        .route("/logout", post(logout))
        .route("/reset-password", post(reset_password))
        .merge(limited)
}

/// Create protected routes for authentication endpoints (auth required)
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_current_user))
        .route("/sessions", get(list_sessions))
        .route("/change-password", post(change_password))
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    ClientDevice(device): ClientDevice,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> AppResult<(StatusCode, Json<LoginResponse>)> {
    let (user, tokens) = state
        .sessions
        .login(&payload.email, &payload.password, payload.remember_me, device)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(LoginResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user: UserInfo::from(&user),
        }),
    ))
}

/// POST /api/v1/auth/refresh
async fn refresh_token(
    State(state): State<AppState>,
    ClientDevice(device): ClientDevice,
    ValidatedJson(payload): ValidatedJson<RefreshTokenRequest>,
) -> AppResult<(StatusCode, Json<TokenPairResponse>)> {
    let tokens = state.sessions.refresh(&payload.refresh_token, device).await?;

    Ok((
        StatusCode::CREATED,
        Json(TokenPairResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        }),
    ))
}

/// POST /api/v1/auth/logout
///
/// Answers the same way whether or not the token was live.
async fn logout(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LogoutRequest>,
) -> AppResult<Json<MessageResponse>> {
    state.sessions.logout(&payload.refresh_token).await?;
    Ok(Json(MessageResponse::new(LOGOUT_MESSAGE)))
}

/// POST /api/v1/auth/forgot-password
async fn forgot_password(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<ForgotPasswordRequest>,
) -> AppResult<Json<ForgotPasswordResponse>> {
    let issued = state
        .one_time_tokens
        .request_password_reset(&payload.email)
        .await?;

    // Without a mailer, development setups read the token from the response
    let reset_token = issued
        .filter(|_| !state.config.environment.is_production())
        .map(|t| t.raw);

    Ok(Json(ForgotPasswordResponse {
        message: FORGOT_PASSWORD_MESSAGE.to_string(),
        reset_token,
    }))
}

/// POST /api/v1/auth/reset-password
async fn reset_password(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<ResetPasswordRequest>,
) -> AppResult<Json<ResetPasswordResponse>> {
    state
        .one_time_tokens
        .reset_password(&payload.token, &payload.password)
        .await?;

    Ok(Json(ResetPasswordResponse {
        ok: true,
        message: "Password has been reset".to_string(),
    }))
}

/// GET /api/v1/auth/me
async fn get_current_user(auth_user: AuthUser) -> Json<UserInfo> {
    Json(UserInfo::from(auth_user.user))
}

/// GET /api/v1/auth/sessions
async fn list_sessions(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<Vec<SessionInfo>>> {
    let sessions = state.sessions.list_sessions(auth_user.id()).await?;
    Ok(Json(sessions))
}

/// POST /api/v1/auth/change-password
///
/// Ends every existing session and returns a fresh pair for the caller.
async fn change_password(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ClientDevice(device): ClientDevice,
    ValidatedJson(payload): ValidatedJson<ChangePasswordRequest>,
) -> AppResult<Json<ChangePasswordResponse>> {
    let tokens = state
        .sessions
        .change_password(
            &auth_user.user,
            &payload.current_password,
            &payload.new_password,
            payload.remember_me,
            device,
        )
        .await?;

    Ok(Json(ChangePasswordResponse {
        message: "Password changed".to_string(),
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}
