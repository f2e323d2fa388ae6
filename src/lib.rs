//! leadgate library
//!
//! Trust and session-security layer for a multi-tenant lead-routing backend:
//! webhook authentication (API key, HMAC signature, per-key rate limit) and the
//! dashboard's JWT access/refresh session lifecycle.

use std::sync::Arc;

use axum::Router;

pub mod api;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use db::DbPool;
pub use middleware::{auth_middleware, AdminUser, AuthUser};

use middleware::{CredentialLimiter, WebhookPipeline};
use services::{
    ApiKeyService, OneTimeTokenService, PasswordHasherPool, RateLimitStore, SessionService,
    SlidingWindowLimiter, TokenSigner,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Database connection pool
    pub db: DbPool,
    pub sessions: Arc<SessionService>,
    pub one_time_tokens: Arc<OneTimeTokenService>,
    pub api_keys: Arc<ApiKeyService>,
    /// Ordered guard steps for webhook routes
    pub webhook_pipeline: Arc<WebhookPipeline>,
    /// Per-API-key webhook limiter
    pub rate_limiter: Arc<dyn RateLimitStore>,
    /// Login and forgot-password limiter
    pub credential_limiter: Arc<CredentialLimiter>,
}

impl AppState {
    /// Build the state with the in-process sliding-window limiter
    pub fn new(config: AppConfig, db: DbPool) -> Self {
        let store: Arc<dyn RateLimitStore> =
            Arc::new(SlidingWindowLimiter::from_config(&config.rate_limit));
        Self::with_rate_limit_store(config, db, store)
    }

    /// Build the state around a caller-supplied webhook limiter store
    pub fn with_rate_limit_store(
        config: AppConfig,
        db: DbPool,
        store: Arc<dyn RateLimitStore>,
    ) -> Self {
        let hasher = PasswordHasherPool::new(config.auth.hash_workers);
        let signer = TokenSigner::new(&config.auth.jwt_secret, config.auth.access_token_ttl());
        let api_keys = Arc::new(ApiKeyService::new(db.clone()));

        let webhook_pipeline = Arc::new(WebhookPipeline::standard(
            api_keys.clone(),
            &config.signing,
            store.clone(),
        ));

        Self {
            sessions: Arc::new(SessionService::new(
                db.clone(),
                signer,
                hasher.clone(),
                config.auth.clone(),
            )),
            one_time_tokens: Arc::new(OneTimeTokenService::new(
                db.clone(),
                hasher,
                config.auth.clone(),
            )),
            api_keys,
            webhook_pipeline,
            rate_limiter: store,
            credential_limiter: Arc::new(CredentialLimiter::from_config(&config.rate_limit)),
            config,
            db,
        }
    }
}

/// Full `/api/v1` router with its middleware, ready to serve
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api::routes(state.clone()))
        .with_state(state)
}
