//! Webhook guard tests: key resolution, signatures and per-key limits

use std::time::Duration;

use chrono::Utc;

use leadgate::{
    config::RateLimitConfig,
    models::CreateApiKeyResponse,
};

use crate::common::{
    key_headers, signed_headers, signed_now, signed_with_timestamp, test_config, TestApp,
    CONVERSATIONS_URI, LEADS_URI, TEST_PASSWORD,
};

const LEAD: &[u8] = br#"{"name":"Ada Lovelace","phone":"+15550100"}"#;

async fn tenant_key(app: &TestApp, tenant: &str) -> CreateApiKeyResponse {
    app.seed_tenant(tenant).await;
    let admin = app
        .login(&format!("admin@{}.test", tenant), TEST_PASSWORD)
        .await;
    app.create_api_key(&admin.access_token, "inbound").await
}

async fn organization_of(app: &TestApp, key: &CreateApiKeyResponse) -> String {
    let response = app.post_raw(LEADS_URI, &key_headers(&key.key), b"{}").await;
    response.assert_ok();
    let body: serde_json::Value = response.json();
    body["organizationId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_unsigned_webhook_accepted_when_signing_disabled() {
    let app = TestApp::new().await;
    let key = tenant_key(&app, "acme").await;

    let response = app.post_raw(LEADS_URI, &key_headers(&key.key), LEAD).await;
    response.assert_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["ok"], true);
    assert_eq!(body["kind"], "lead");
    assert_eq!(body["receivedBytes"], LEAD.len());

    let conversation = app
        .post_raw(CONVERSATIONS_URI, &key_headers(&key.key), b"{\"text\":\"hi\"}")
        .await;
    conversation.assert_ok();
    let conversation: serde_json::Value = conversation.json();
    assert_eq!(conversation["kind"], "conversation");
}

#[tokio::test]
async fn test_missing_or_unknown_key_is_unauthorized() {
    let app = TestApp::new().await;

    app.post_raw(LEADS_URI, &[], LEAD).await.assert_unauthorized();
    app.post_raw(LEADS_URI, &key_headers("lgk_not-a-real-key"), LEAD)
        .await
        .assert_unauthorized();
}

#[tokio::test]
async fn test_tenant_comes_from_the_key_not_the_payload() {
    let app = TestApp::new().await;
    let acme = tenant_key(&app, "acme").await;
    let globex = tenant_key(&app, "globex").await;

    let acme_org = organization_of(&app, &acme).await;
    let globex_org = organization_of(&app, &globex).await;
    assert_ne!(acme_org, globex_org);

    let spoofed = serde_json::json!({ "organizationId": globex_org }).to_string();
    let response = app
        .post_raw(LEADS_URI, &key_headers(&acme.key), spoofed.as_bytes())
        .await;
    response.assert_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["organizationId"], acme_org);
}

#[tokio::test]
async fn test_signing_required_rejects_unsigned() {
    let app = TestApp::with_signing_required().await;
    let key = tenant_key(&app, "acme").await;

    app.post_raw(LEADS_URI, &key_headers(&key.key), LEAD)
        .await
        .assert_unauthorized();
}

#[tokio::test]
async fn test_signed_webhook_accepted() {
    let app = TestApp::with_signing_required().await;
    let key = tenant_key(&app, "acme").await;

    app.post_raw(LEADS_URI, &signed_now(&key.key, &key.hmac_secret, LEAD), LEAD)
        .await
        .assert_ok();
}

#[tokio::test]
async fn test_prefixed_uppercase_signature_accepted() {
    let app = TestApp::with_signing_required().await;
    let key = tenant_key(&app, "acme").await;

    let mut headers = signed_now(&key.key, &key.hmac_secret, LEAD);
    let signature = &mut headers[2].1;
    *signature = format!("sha256={}", signature.to_uppercase());

    app.post_raw(LEADS_URI, &headers, LEAD).await.assert_ok();
}

#[tokio::test]
async fn test_one_byte_tamper_is_rejected() {
    let app = TestApp::with_signing_required().await;
    let key = tenant_key(&app, "acme").await;

    let headers = signed_now(&key.key, &key.hmac_secret, LEAD);
    let mut tampered = LEAD.to_vec();
    tampered[10] ^= 0x01;

    app.post_raw(LEADS_URI, &headers, &tampered)
        .await
        .assert_unauthorized();
}

#[tokio::test]
async fn test_stale_timestamp_is_rejected() {
    let app = TestApp::with_signing_required().await;
    let key = tenant_key(&app, "acme").await;

    let stale = Utc::now() - chrono::Duration::seconds(301);
    app.post_raw(
        LEADS_URI,
        &signed_headers(&key.key, &key.hmac_secret, LEAD, stale),
        LEAD,
    )
    .await
    .assert_unauthorized();

    let recent = Utc::now() - chrono::Duration::seconds(60);
    app.post_raw(
        LEADS_URI,
        &signed_headers(&key.key, &key.hmac_secret, LEAD, recent),
        LEAD,
    )
    .await
    .assert_ok();
}

#[tokio::test]
async fn test_iso8601_timestamps_without_offset_are_utc() {
    let app = TestApp::with_signing_required().await;
    let key = tenant_key(&app, "acme").await;
    let now = Utc::now();

    for timestamp in [
        now.format("%Y-%m-%dT%H:%M:%S").to_string(),
        now.format("%Y%m%dT%H%M%SZ").to_string(),
    ] {
        app.post_raw(
            LEADS_URI,
            &signed_with_timestamp(&key.key, &key.hmac_secret, LEAD, timestamp),
            LEAD,
        )
        .await
        .assert_ok();
    }

    let stale = (now - chrono::Duration::seconds(301))
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string();
    app.post_raw(
        LEADS_URI,
        &signed_with_timestamp(&key.key, &key.hmac_secret, LEAD, stale),
        LEAD,
    )
    .await
    .assert_unauthorized();
}

#[tokio::test]
async fn test_other_tenants_secret_never_validates() {
    let app = TestApp::with_signing_required().await;
    let acme = tenant_key(&app, "acme").await;
    let globex = tenant_key(&app, "globex").await;

    app.post_raw(LEADS_URI, &signed_now(&acme.key, &globex.hmac_secret, LEAD), LEAD)
        .await
        .assert_unauthorized();
}

fn limited_config(max_requests: u32, window_ms: u64) -> leadgate::AppConfig {
    let mut config = test_config();
    config.rate_limit = RateLimitConfig {
        max_requests,
        window_ms,
        ..RateLimitConfig::default()
    };
    config
}

#[tokio::test]
async fn test_rate_limit_per_key() {
    let app = TestApp::with_config(limited_config(3, 60_000)).await;
    let acme = tenant_key(&app, "acme").await;
    let globex = tenant_key(&app, "globex").await;

    for expected_remaining in ["2", "1", "0"] {
        let response = app.post_raw(LEADS_URI, &key_headers(&acme.key), LEAD).await;
        response.assert_ok();
        assert_eq!(response.header("x-ratelimit-limit").as_deref(), Some("3"));
        assert_eq!(
            response.header("x-ratelimit-remaining").as_deref(),
            Some(expected_remaining)
        );
        assert!(response.header("x-ratelimit-reset").is_some());
    }

    let blocked = app.post_raw(LEADS_URI, &key_headers(&acme.key), LEAD).await;
    blocked.assert_too_many_requests();
    assert!(blocked.header("retry-after").is_some());
    assert_eq!(blocked.header("x-ratelimit-remaining").as_deref(), Some("0"));
    let body: serde_json::Value = blocked.json();
    assert!(body["retryAfter"].as_u64().unwrap() >= 1);

    // Separate budget per key
    app.post_raw(LEADS_URI, &key_headers(&globex.key), LEAD)
        .await
        .assert_ok();
}

#[tokio::test]
async fn test_rate_limit_recovers_after_window() {
    let app = TestApp::with_config(limited_config(1, 300)).await;
    let key = tenant_key(&app, "acme").await;

    app.post_raw(LEADS_URI, &key_headers(&key.key), LEAD)
        .await
        .assert_ok();
    app.post_raw(LEADS_URI, &key_headers(&key.key), LEAD)
        .await
        .assert_too_many_requests();

    tokio::time::sleep(Duration::from_millis(400)).await;

    app.post_raw(LEADS_URI, &key_headers(&key.key), LEAD)
        .await
        .assert_ok();
}

#[tokio::test]
async fn test_rejected_signature_does_not_consume_budget() {
    let mut config = limited_config(1, 60_000);
    config.signing.required = true;
    let app = TestApp::with_config(config).await;
    let key = tenant_key(&app, "acme").await;

    for _ in 0..3 {
        app.post_raw(LEADS_URI, &key_headers(&key.key), LEAD)
            .await
            .assert_unauthorized();
    }

    app.post_raw(LEADS_URI, &signed_now(&key.key, &key.hmac_secret, LEAD), LEAD)
        .await
        .assert_ok();
}
