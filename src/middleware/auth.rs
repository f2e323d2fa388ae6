//! Bearer authentication middleware
//!
//! Every protected request carries an access token. The token is verified and the
//! user is reloaded from the store on each call, so deactivation or a move to
//! another organization takes effect immediately.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::debug;
use uuid::Uuid;

use crate::{models::User, utils::AppError, AppState};

/// Authenticated caller, loaded from the store for this request
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
}

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn organization_id(&self) -> Uuid {
        self.user.organization_id
    }

    pub fn is_admin(&self) -> bool {
        self.user.is_admin()
    }
}

/// Extractor for AuthUser from request extensions
///
/// Usable as a handler parameter once `auth_middleware` has run.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

/// Authenticated caller holding the admin role
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            debug!(user_id = %user.id(), role = %user.user.role, "Admin route refused");
            return Err(AppError::forbidden("Admin role required"));
        }
        Ok(AdminUser(user))
    }
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authentication middleware
///
/// Validates the access token and injects the `AuthUser` into request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(extract_bearer_token)
        .ok_or_else(|| {
            debug!("Missing or malformed bearer token");
            AppError::Unauthorized
        })?
        .to_string();

    let user = state.sessions.authenticate_access(&token).await?;
    request.extensions_mut().insert(AuthUser { user });

    Ok(next.run(request).await)
}
