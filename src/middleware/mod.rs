//! Middleware components
//!
//! This module contains middleware for:
//! - Bearer authentication (JWT access tokens)
//! - Credential endpoint rate limiting
//! - The webhook guard pipeline (API key, HMAC signature, per-key limit)

pub mod auth;
pub mod pipeline;
pub mod rate_limit;
pub mod webhook;

pub use auth::{auth_middleware, AdminUser, AuthUser};
pub use pipeline::{GuardStep, PipelineContext, PipelineOutcome, Step, WebhookPipeline, WebhookRequest};
pub use rate_limit::{
    credential_rate_limit_middleware, spawn_rate_limit_cleanup, CredentialLimiter,
};
pub use webhook::webhook_guard_middleware;
