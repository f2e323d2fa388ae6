//! Webhook guard pipeline
//!
//! Webhook requests pass an ordered list of named steps:
//! `resolve-key -> verify-signature -> rate-limit`. Each step either lets the
//! request continue or denies it; the first denial ends the run.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::Utc;
use tracing::{debug, error, warn};

use crate::{
    config::SigningConfig,
    models::ResolvedApiKey,
    services::{
        signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER},
        ApiKeyService, RateLimitDecision, RateLimitStore, SignatureVerifier,
    },
    utils::AppError,
};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Outcome of a single guard step
#[derive(Debug)]
pub enum Step {
    Continue,
    Deny(AppError),
}

/// Raw request data visible to the guard steps
pub struct WebhookRequest<'a> {
    pub headers: &'a HeaderMap,
    pub body: &'a [u8],
}

impl WebhookRequest<'_> {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// State accumulated while the steps run
#[derive(Debug, Default)]
pub struct PipelineContext {
    pub api_key: Option<ResolvedApiKey>,
    pub rate_limit: Option<RateLimitDecision>,
}

#[async_trait]
pub trait GuardStep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, request: &WebhookRequest<'_>, ctx: &mut PipelineContext) -> Step;
}

/// Resolve `x-api-key` to its owning tenant
pub struct ResolveApiKey {
    api_keys: Arc<ApiKeyService>,
}

impl ResolveApiKey {
    pub fn new(api_keys: Arc<ApiKeyService>) -> Self {
        Self { api_keys }
    }
}

#[async_trait]
impl GuardStep for ResolveApiKey {
    fn name(&self) -> &'static str {
        "resolve-key"
    }

    async fn run(&self, request: &WebhookRequest<'_>, ctx: &mut PipelineContext) -> Step {
        let Some(plaintext) = request.header(API_KEY_HEADER).filter(|k| !k.is_empty()) else {
            debug!("Webhook rejected: missing x-api-key");
            return Step::Deny(AppError::Unauthorized);
        };

        match self.api_keys.resolve(plaintext).await {
            Ok(Some(key)) => {
                ctx.api_key = Some(key);
                Step::Continue
            }
            Ok(None) => Step::Deny(AppError::Unauthorized),
            Err(e) => {
                error!("API key lookup failed: {:#}", e);
                Step::Deny(AppError::internal("API key lookup failed"))
            }
        }
    }
}

/// HMAC check over the raw body; a pass-through unless signing is required
pub struct VerifySignature {
    required: bool,
    verifier: SignatureVerifier,
}

impl VerifySignature {
    pub fn new(config: &SigningConfig) -> Self {
        Self {
            required: config.required,
            verifier: SignatureVerifier::new(config),
        }
    }
}

#[async_trait]
impl GuardStep for VerifySignature {
    fn name(&self) -> &'static str {
        "verify-signature"
    }

    async fn run(&self, request: &WebhookRequest<'_>, ctx: &mut PipelineContext) -> Step {
        if !self.required {
            return Step::Continue;
        }

        let Some(key) = ctx.api_key.as_ref() else {
            return Step::Deny(AppError::Unauthorized);
        };

        match self.verifier.verify(
            &key.hmac_secret,
            request.header(TIMESTAMP_HEADER),
            request.header(SIGNATURE_HEADER),
            request.body,
            Utc::now(),
        ) {
            Ok(()) => Step::Continue,
            Err(e) => {
                warn!(api_key_id = %key.api_key_id, "Webhook signature rejected: {}", e);
                Step::Deny(AppError::Unauthorized)
            }
        }
    }
}

/// Per-key sliding-window limit
pub struct RateLimit {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimit {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl GuardStep for RateLimit {
    fn name(&self) -> &'static str {
        "rate-limit"
    }

    async fn run(&self, _request: &WebhookRequest<'_>, ctx: &mut PipelineContext) -> Step {
        let Some(key) = ctx.api_key.as_ref() else {
            return Step::Deny(AppError::Unauthorized);
        };

        let decision = self.store.check(&key.api_key_id.to_string()).await;
        ctx.rate_limit = Some(decision);

        match decision.retry_after {
            Some(retry_after) if !decision.allowed => {
                warn!(api_key_id = %key.api_key_id, retry_after, "Webhook rate limit exceeded");
                Step::Deny(AppError::TooManyRequests { retry_after })
            }
            _ => Step::Continue,
        }
    }
}

/// Result of a pipeline run
#[derive(Debug)]
pub struct PipelineOutcome {
    pub context: PipelineContext,
    /// Name of the denying step and its error
    pub denied: Option<(&'static str, AppError)>,
}

pub struct WebhookPipeline {
    steps: Vec<Box<dyn GuardStep>>,
}

impl WebhookPipeline {
    pub fn new(steps: Vec<Box<dyn GuardStep>>) -> Self {
        Self { steps }
    }

    /// The production order: resolve the key, check the signature, then limit
    pub fn standard(
        api_keys: Arc<ApiKeyService>,
        signing: &SigningConfig,
        store: Arc<dyn RateLimitStore>,
    ) -> Self {
        Self::new(vec![
            Box::new(ResolveApiKey::new(api_keys)),
            Box::new(VerifySignature::new(signing)),
            Box::new(RateLimit::new(store)),
        ])
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&self, request: &WebhookRequest<'_>) -> PipelineOutcome {
        let mut context = PipelineContext::default();

        for step in &self.steps {
            if let Step::Deny(err) = step.run(request, &mut context).await {
                debug!(step = step.name(), "Webhook request denied");
                return PipelineOutcome {
                    context,
                    denied: Some((step.name(), err)),
                };
            }
        }

        PipelineOutcome {
            context,
            denied: None,
        }
    }
}
