//! API routes and handlers
//!
//! This module defines all API endpoints and their routing. Everything is
//! mounted under `/api/v1`.

use axum::{middleware::from_fn_with_state, routing::get, Router};

use crate::{
    middleware::{auth_middleware, webhook_guard_middleware},
    AppState,
};

mod api_keys;
mod auth;
mod health;
mod invites;
mod webhooks;

pub use health::*;

/// Public API routes (no authentication required)
///
/// Login and forgot-password carry the credential rate limiter.
pub fn public_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/detailed", get(health::health_check_detailed))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/auth", auth::public_routes(state))
        .nest("/invites", invites::public_routes())
}

/// Protected API routes (bearer access token required)
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::protected_routes())
        .nest("/invites", invites::routes())
        .nest("/api-keys", api_keys::routes())
}

/// Webhook routes (API key, signature and per-key limit instead of a bearer token)
pub fn webhook_routes() -> Router<AppState> {
    Router::new().nest("/webhooks", webhooks::routes())
}

/// Create the full API router with each group's middleware applied
pub fn routes(state: AppState) -> Router<AppState> {
    public_routes(state.clone())
        .merge(
            protected_routes().route_layer(from_fn_with_state(state.clone(), auth_middleware)),
        )
        .merge(
            webhook_routes().route_layer(from_fn_with_state(state, webhook_guard_middleware)),
        )
}
