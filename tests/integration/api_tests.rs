//! API integration tests
//!
//! Health endpoints and routing behaviour shared by every route group.

use serde_json::json;

use crate::common::TestApp;

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let app = TestApp::new().await;
    let response = app.get("/api/v1/health").await;

    response.assert_ok();

    let json: serde_json::Value = response.json();
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_detailed_health_endpoint() {
    let app = TestApp::new().await;
    let response = app.get("/api/v1/health/detailed").await;

    response.assert_ok();

    let json: serde_json::Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["database"]["reachable"], true);
    assert_eq!(json["database"]["pendingMigrations"], 0);
    assert!(json["database"]["appliedMigrations"].as_u64().unwrap() >= 1);
    assert!(json["database"].get("error").is_none());
    assert_eq!(json["signingRequired"], false);
}

#[tokio::test]
async fn test_detailed_health_reports_limiter_usage() {
    let app = TestApp::new().await;

    let before: serde_json::Value = app.get("/api/v1/health/detailed").await.json();
    assert_eq!(before["rateLimits"]["credentialKeys"], 0);
    assert_eq!(before["rateLimits"]["webhookKeys"], 0);

    app.post_json(
        "/api/v1/auth/forgot-password",
        json!({ "email": "someone@acme.test" }),
    )
    .await
    .assert_ok();

    let after: serde_json::Value = app.get("/api/v1/health/detailed").await.json();
    assert_eq!(after["rateLimits"]["credentialKeys"], 1);
}

#[tokio::test]
async fn test_liveness_endpoint() {
    let app = TestApp::new().await;
    app.get("/api/v1/health/live").await.assert_ok();
}

#[tokio::test]
async fn test_readiness_endpoint() {
    let app = TestApp::new().await;
    app.get("/api/v1/health/ready").await.assert_ok();
}

#[tokio::test]
async fn test_protected_routes_require_bearer_token() {
    let app = TestApp::new().await;

    app.get("/api/v1/auth/me").await.assert_unauthorized();
    app.get("/api/v1/auth/sessions").await.assert_unauthorized();
    app.get("/api/v1/api-keys").await.assert_unauthorized();
}

#[tokio::test]
async fn test_garbage_bearer_token_is_unauthorized() {
    let app = TestApp::new().await;
    app.get_with_auth("/api/v1/auth/me", "not-a-jwt")
        .await
        .assert_unauthorized();
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = TestApp::new().await;
    app.get("/api/v1/nope").await.assert_not_found();
}
