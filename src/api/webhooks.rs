//! Webhook ingestion endpoints
//!
//! Requests reach these handlers only after the webhook guard has resolved the
//! API key, checked the signature and applied the per-key limit. The tenant is
//! always the key's organization.

use axum::{body::Bytes, routing::post, Json, Router};
use tracing::info;

use crate::{
    models::{ApiKeyContext, WebhookAck},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/leads", post(receive_lead))
        .route("/conversations", post(receive_conversation))
}

fn acknowledge(kind: &str, ctx: ApiKeyContext, body: &Bytes) -> Json<WebhookAck> {
    info!(
        kind,
        organization_id = %ctx.organization_id,
        api_key_id = %ctx.api_key_id,
        bytes = body.len(),
        "Webhook accepted"
    );

    Json(WebhookAck {
        ok: true,
        kind: kind.to_string(),
        organization_id: ctx.organization_id,
        received_bytes: body.len(),
    })
}

/// POST /api/v1/webhooks/leads
async fn receive_lead(ctx: ApiKeyContext, body: Bytes) -> Json<WebhookAck> {
    acknowledge("lead", ctx, &body)
}

/// POST /api/v1/webhooks/conversations
async fn receive_conversation(ctx: ApiKeyContext, body: Bytes) -> Json<WebhookAck> {
    acknowledge("conversation", ctx, &body)
}
