//! Webhook guard middleware
//!
//! Buffers the raw body once, runs the [`WebhookPipeline`] over it and hands the
//! same bytes to the handler. Successful requests carry an [`ApiKeyContext`]
//! naming the tenant; handlers must take the organization from there and never
//! from the payload.

use axum::{
    body::{to_bytes, Body},
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use super::pipeline::WebhookRequest;
use super::rate_limit::{apply_rate_limit_headers, rate_limited_response};
use crate::{
    models::ApiKeyContext,
    utils::AppError,
    AppState,
};

pub async fn webhook_guard_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let bytes = match to_bytes(body, state.config.server.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Webhook body rejected: {}", e);
            return AppError::bad_request("Request body too large").into_response();
        }
    };

    let outcome = state
        .webhook_pipeline
        .run(&WebhookRequest {
            headers: &parts.headers,
            body: &bytes,
        })
        .await;
    let rate_limit = outcome.context.rate_limit;

    if let Some((step, err)) = outcome.denied {
        debug!(step, path = %parts.uri.path(), "Webhook guard denied request");
        let limited = matches!(err, AppError::TooManyRequests { .. });
        return match rate_limit {
            Some(decision) if limited => rate_limited_response(&decision),
            Some(decision) => {
                let mut response = err.into_response();
                apply_rate_limit_headers(response.headers_mut(), &decision);
                response
            }
            None => err.into_response(),
        };
    }

    let Some(key) = outcome.context.api_key.as_ref() else {
        // Every standard pipeline resolves a key before it can pass
        return AppError::Unauthorized.into_response();
    };
    parts.extensions.insert(ApiKeyContext::from(key));

    let request = Request::from_parts(parts, Body::from(bytes));
    let mut response = next.run(request).await;
    if let Some(decision) = rate_limit {
        apply_rate_limit_headers(response.headers_mut(), &decision);
    }
    response
}

/// Tenant context attached by `webhook_guard_middleware`
impl<S> FromRequestParts<S> for ApiKeyContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ApiKeyContext>()
            .copied()
            .ok_or(AppError::Unauthorized)
    }
}
