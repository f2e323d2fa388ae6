//! Session lifecycle tests: login, refresh rotation, logout, password change
//! and live user checks on access tokens.

use std::net::SocketAddr;

use axum::http::StatusCode;
use chrono::Utc;
use serde_json::json;

use leadgate::{
    config::RateLimitConfig,
    db::{RefreshTokenRepository, SessionRepository},
};

use crate::common::{test_config, TestApp, TestResponse, TEST_PASSWORD};

#[tokio::test]
async fn test_login_me_refresh_and_replay() {
    let app = TestApp::new().await;
    let tenant = app.seed_tenant("acme").await;

    let response = app
        .post_json(
            "/api/v1/auth/login",
            json!({ "email": "admin@acme.test", "password": TEST_PASSWORD }),
        )
        .await;
    response.assert_created();
    let login: serde_json::Value = response.json();
    assert_eq!(login["user"]["id"], tenant.admin.id.to_string());
    assert_eq!(login["user"]["publicId"], tenant.admin.public_id);
    assert_eq!(login["user"]["organizationId"], tenant.organization.id.to_string());
    assert_eq!(login["user"]["role"], "admin");
    assert!(login["user"].get("passwordHash").is_none());

    let access = login["accessToken"].as_str().unwrap();
    let refresh = login["refreshToken"].as_str().unwrap();

    let me = app.get_with_auth("/api/v1/auth/me", access).await;
    me.assert_ok();
    let me: serde_json::Value = me.json();
    assert_eq!(me["email"], "admin@acme.test");

    let rotated = app
        .post_json("/api/v1/auth/refresh", json!({ "refreshToken": refresh }))
        .await;
    rotated.assert_created();
    let rotated: serde_json::Value = rotated.json();
    assert_ne!(rotated["refreshToken"].as_str().unwrap(), refresh);
    assert!(rotated["accessToken"].is_string());

    // The rotated-away token never works again
    app.post_json("/api/v1/auth/refresh", json!({ "refreshToken": refresh }))
        .await
        .assert_unauthorized();
}

#[tokio::test]
async fn test_login_email_is_case_insensitive() {
    let app = TestApp::new().await;
    app.seed_tenant("acme").await;

    app.post_json(
        "/api/v1/auth/login",
        json!({ "email": "Admin@ACME.test", "password": TEST_PASSWORD }),
    )
    .await
    .assert_created();
}

#[tokio::test]
async fn test_wrong_password_and_unknown_email_look_the_same() {
    let app = TestApp::new().await;
    app.seed_tenant("acme").await;

    let wrong = app
        .post_json(
            "/api/v1/auth/login",
            json!({ "email": "admin@acme.test", "password": "nope-nope-nope" }),
        )
        .await;
    let unknown = app
        .post_json(
            "/api/v1/auth/login",
            json!({ "email": "ghost@acme.test", "password": "nope-nope-nope" }),
        )
        .await;

    wrong.assert_unauthorized();
    unknown.assert_unauthorized();
    assert_eq!(wrong.text(), unknown.text());
}

#[tokio::test]
async fn test_inactive_user_cannot_log_in() {
    let app = TestApp::new().await;
    let tenant = app.seed_tenant("acme").await;
    app.set_user_active(tenant.admin.id, false).await;

    app.post_json(
        "/api/v1/auth/login",
        json!({ "email": "admin@acme.test", "password": TEST_PASSWORD }),
    )
    .await
    .assert_unauthorized();
}

#[tokio::test]
async fn test_malformed_login_body_is_bad_request() {
    let app = TestApp::new().await;

    app.post_json("/api/v1/auth/login", json!({ "email": "admin@acme.test" }))
        .await
        .assert_bad_request();
    app.post_json(
        "/api/v1/auth/login",
        json!({ "email": "not-an-email", "password": "x" }),
    )
    .await
    .assert_bad_request();
}

#[tokio::test]
async fn test_concurrent_refresh_only_one_wins() {
    let app = TestApp::new().await;
    app.seed_tenant("acme").await;
    let login = app.login("admin@acme.test", TEST_PASSWORD).await;

    let body = json!({ "refreshToken": login.refresh_token });
    let (first, second) = tokio::join!(
        app.post_json("/api/v1/auth/refresh", body.clone()),
        app.post_json("/api/v1/auth/refresh", body.clone()),
    );

    let mut statuses = [first.status, second.status];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::CREATED, StatusCode::UNAUTHORIZED]);

    // Still dead afterwards
    app.post_json("/api/v1/auth/refresh", body)
        .await
        .assert_unauthorized();
}

#[tokio::test]
async fn test_refresh_chain_keeps_one_active_session() {
    let app = TestApp::new().await;
    let tenant = app.seed_tenant("acme").await;
    let mut current = app.login("admin@acme.test", TEST_PASSWORD).await;

    const ROTATIONS: usize = 3;
    for _ in 0..ROTATIONS {
        let response = app
            .post_json(
                "/api/v1/auth/refresh",
                json!({ "refreshToken": current.refresh_token }),
            )
            .await;
        response.assert_created();
        let body: serde_json::Value = response.json();
        current.access_token = body["accessToken"].as_str().unwrap().to_string();
        current.refresh_token = body["refreshToken"].as_str().unwrap().to_string();
    }

    let now = Utc::now();
    let sessions = SessionRepository::new(&app.state.db)
        .list_for_user(tenant.admin.id)
        .await
        .unwrap();
    assert_eq!(sessions.len(), ROTATIONS + 1);
    assert_eq!(sessions.iter().filter(|s| s.is_active_at(now)).count(), 1);

    // Rotation chain from the first token reaches the live one
    let tokens = RefreshTokenRepository::new(&app.state.db);
    let all = tokens.list_for_user(tenant.admin.id).await.unwrap();
    let oldest = all.last().unwrap();
    let chain = tokens.chain_from(oldest.id).await.unwrap();
    assert_eq!(chain.len(), ROTATIONS + 1);
    assert!(chain[..ROTATIONS].iter().all(|t| t.is_revoked()));
    assert!(!chain[ROTATIONS].is_revoked());

    let listed = app
        .get_with_auth("/api/v1/auth/sessions", &current.access_token)
        .await;
    listed.assert_ok();
    let listed: Vec<serde_json::Value> = listed.json();
    assert_eq!(listed.len(), ROTATIONS + 1);
    assert_eq!(listed.iter().filter(|s| s["active"] == true).count(), 1);
}

async fn refresh(app: &TestApp, refresh_token: &str) -> TestResponse {
    app.post_json(
        "/api/v1/auth/refresh",
        json!({ "refreshToken": refresh_token }),
    )
    .await
}

#[tokio::test]
async fn test_replayed_rotated_token_ends_every_session() {
    let app = TestApp::new().await;
    let tenant = app.seed_tenant("acme").await;
    let laptop = app.login("admin@acme.test", TEST_PASSWORD).await;
    let phone = app.login("admin@acme.test", TEST_PASSWORD).await;

    let rotated = refresh(&app, &laptop.refresh_token).await;
    rotated.assert_created();
    let rotated: serde_json::Value = rotated.json();
    let successor = rotated["refreshToken"].as_str().unwrap();

    // The stolen predecessor comes back
    refresh(&app, &laptop.refresh_token).await.assert_unauthorized();

    refresh(&app, successor).await.assert_unauthorized();
    refresh(&app, &phone.refresh_token).await.assert_unauthorized();

    let now = Utc::now();
    let sessions = SessionRepository::new(&app.state.db)
        .list_for_user(tenant.admin.id)
        .await
        .unwrap();
    assert_eq!(sessions.len(), 3);
    assert!(sessions.iter().all(|s| !s.is_active_at(now)));

    let tokens = RefreshTokenRepository::new(&app.state.db)
        .list_for_user(tenant.admin.id)
        .await
        .unwrap();
    assert!(tokens.iter().all(|t| t.is_revoked()));

    // Logging in again still works
    app.login("admin@acme.test", TEST_PASSWORD).await;
}

#[tokio::test]
async fn test_logged_out_token_does_not_end_other_sessions() {
    let app = TestApp::new().await;
    app.seed_tenant("acme").await;
    let laptop = app.login("admin@acme.test", TEST_PASSWORD).await;
    let phone = app.login("admin@acme.test", TEST_PASSWORD).await;

    app.post_json(
        "/api/v1/auth/logout",
        json!({ "refreshToken": laptop.refresh_token }),
    )
    .await
    .assert_ok();

    refresh(&app, &laptop.refresh_token).await.assert_unauthorized();
    refresh(&app, &phone.refresh_token).await.assert_created();
}

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let app = TestApp::new().await;
    app.seed_tenant("acme").await;
    let login = app.login("admin@acme.test", TEST_PASSWORD).await;

    let first = app
        .post_json(
            "/api/v1/auth/logout",
            json!({ "refreshToken": login.refresh_token }),
        )
        .await;
    first.assert_ok();

    app.post_json(
        "/api/v1/auth/refresh",
        json!({ "refreshToken": login.refresh_token }),
    )
    .await
    .assert_unauthorized();

    // Repeated or bogus logouts answer the same way
    let again = app
        .post_json(
            "/api/v1/auth/logout",
            json!({ "refreshToken": login.refresh_token }),
        )
        .await;
    let bogus = app
        .post_json("/api/v1/auth/logout", json!({ "refreshToken": "garbage" }))
        .await;
    again.assert_ok();
    bogus.assert_ok();
    assert_eq!(first.text(), again.text());
    assert_eq!(first.text(), bogus.text());
}

#[tokio::test]
async fn test_access_token_cannot_refresh() {
    let app = TestApp::new().await;
    app.seed_tenant("acme").await;
    let login = app.login("admin@acme.test", TEST_PASSWORD).await;

    app.post_json(
        "/api/v1/auth/refresh",
        json!({ "refreshToken": login.access_token }),
    )
    .await
    .assert_unauthorized();
}

#[tokio::test]
async fn test_refresh_token_is_not_an_access_token() {
    let app = TestApp::new().await;
    app.seed_tenant("acme").await;
    let login = app.login("admin@acme.test", TEST_PASSWORD).await;

    app.get_with_auth("/api/v1/auth/me", &login.refresh_token)
        .await
        .assert_unauthorized();
}

#[tokio::test]
async fn test_password_change_revokes_other_sessions() {
    let app = TestApp::new().await;
    app.seed_tenant("acme").await;
    let laptop = app.login("admin@acme.test", TEST_PASSWORD).await;
    let phone = app.login("admin@acme.test", TEST_PASSWORD).await;

    let response = app
        .post_json_with_auth(
            "/api/v1/auth/change-password",
            json!({
                "currentPassword": TEST_PASSWORD,
                "newPassword": "a brand new passphrase"
            }),
            &laptop.access_token,
        )
        .await;
    response.assert_ok();
    let changed: serde_json::Value = response.json();
    let new_refresh = changed["refreshToken"].as_str().unwrap();

    for old in [&laptop.refresh_token, &phone.refresh_token] {
        app.post_json("/api/v1/auth/refresh", json!({ "refreshToken": old }))
            .await
            .assert_unauthorized();
    }

    app.post_json("/api/v1/auth/refresh", json!({ "refreshToken": new_refresh }))
        .await
        .assert_created();

    app.post_json(
        "/api/v1/auth/login",
        json!({ "email": "admin@acme.test", "password": TEST_PASSWORD }),
    )
    .await
    .assert_unauthorized();
    app.login("admin@acme.test", "a brand new passphrase").await;
}

#[tokio::test]
async fn test_password_change_with_wrong_current_password() {
    let app = TestApp::new().await;
    app.seed_tenant("acme").await;
    let login = app.login("admin@acme.test", TEST_PASSWORD).await;

    app.post_json_with_auth(
        "/api/v1/auth/change-password",
        json!({
            "currentPassword": "not my password",
            "newPassword": "a brand new passphrase"
        }),
        &login.access_token,
    )
    .await
    .assert_bad_request();

    // Nothing was revoked
    app.post_json(
        "/api/v1/auth/refresh",
        json!({ "refreshToken": login.refresh_token }),
    )
    .await
    .assert_created();
}

#[tokio::test]
async fn test_password_change_enforces_policy() {
    let app = TestApp::new().await;
    app.seed_tenant("acme").await;
    let login = app.login("admin@acme.test", TEST_PASSWORD).await;

    app.post_json_with_auth(
        "/api/v1/auth/change-password",
        json!({ "currentPassword": TEST_PASSWORD, "newPassword": "short" }),
        &login.access_token,
    )
    .await
    .assert_bad_request();
}

#[tokio::test]
async fn test_organization_change_invalidates_access_token() {
    let app = TestApp::new().await;
    let tenant = app.seed_tenant("acme").await;
    let other = app.seed_organization("globex").await;
    let login = app.login("admin@acme.test", TEST_PASSWORD).await;

    app.get_with_auth("/api/v1/auth/me", &login.access_token)
        .await
        .assert_ok();

    app.move_user(tenant.admin.id, other.id).await;

    app.get_with_auth("/api/v1/auth/me", &login.access_token)
        .await
        .assert_unauthorized();
}

#[tokio::test]
async fn test_deactivation_invalidates_access_and_refresh() {
    let app = TestApp::new().await;
    let tenant = app.seed_tenant("acme").await;
    let login = app.login("admin@acme.test", TEST_PASSWORD).await;

    app.set_user_active(tenant.admin.id, false).await;

    app.get_with_auth("/api/v1/auth/me", &login.access_token)
        .await
        .assert_unauthorized();
    app.post_json(
        "/api/v1/auth/refresh",
        json!({ "refreshToken": login.refresh_token }),
    )
    .await
    .assert_unauthorized();
}

#[tokio::test]
async fn test_credential_limiter_blocks_repeated_login_attempts() {
    let mut config = test_config();
    config.rate_limit = RateLimitConfig {
        auth_max_attempts: 2,
        auth_window_secs: 60,
        ..RateLimitConfig::default()
    };
    let app = TestApp::with_config(config).await;
    app.seed_tenant("acme").await;

    let attempt = json!({ "email": "admin@acme.test", "password": "guess-guess" });
    for _ in 0..2 {
        let response = app.post_json("/api/v1/auth/login", attempt.clone()).await;
        response.assert_unauthorized();
        assert!(response.header("x-ratelimit-limit").is_some());
    }

    let blocked = app.post_json("/api/v1/auth/login", attempt).await;
    blocked.assert_too_many_requests();
    assert!(blocked.header("retry-after").is_some());
    let body: serde_json::Value = blocked.json();
    assert!(body["retryAfter"].as_u64().unwrap() >= 1);

    // Another email from the same client is tracked separately
    app.post_json(
        "/api/v1/auth/login",
        json!({ "email": "someone@acme.test", "password": "guess-guess" }),
    )
    .await
    .assert_unauthorized();
}

fn credential_limited_config(max_attempts: u32) -> leadgate::AppConfig {
    let mut config = test_config();
    config.rate_limit = RateLimitConfig {
        auth_max_attempts: max_attempts,
        auth_window_secs: 60,
        ..RateLimitConfig::default()
    };
    config
}

#[tokio::test]
async fn test_rotating_forwarded_for_does_not_reset_credential_limit() {
    let app = TestApp::with_config(credential_limited_config(2)).await;
    app.seed_tenant("acme").await;

    let peer: SocketAddr = "198.51.100.20:40000".parse().unwrap();
    let attempt = json!({ "email": "admin@acme.test", "password": "guess-guess" });

    let mut statuses = Vec::new();
    for i in 0..6 {
        let response = app
            .post_json_via("/api/v1/auth/login", attempt.clone(), peer, &format!("10.0.0.{}", i))
            .await;
        statuses.push(response.status);
    }

    assert_eq!(&statuses[..2], &[StatusCode::UNAUTHORIZED; 2]);
    assert!(statuses[2..]
        .iter()
        .all(|s| *s == StatusCode::TOO_MANY_REQUESTS));
}

#[tokio::test]
async fn test_trusted_proxy_limits_by_the_address_it_appended() {
    let mut config = credential_limited_config(2);
    config.server.trusted_proxies = vec!["10.0.0.1".parse().unwrap()];
    let app = TestApp::with_config(config).await;
    app.seed_tenant("acme").await;

    let proxy: SocketAddr = "10.0.0.1:443".parse().unwrap();
    let attempt = json!({ "email": "admin@acme.test", "password": "guess-guess" });

    // Forged leftmost hops change every time; the proxy-appended hop does not
    for i in 0..2 {
        app.post_json_via(
            "/api/v1/auth/login",
            attempt.clone(),
            proxy,
            &format!("172.16.0.{}, 203.0.113.9", i),
        )
        .await
        .assert_unauthorized();
    }
    app.post_json_via(
        "/api/v1/auth/login",
        attempt.clone(),
        proxy,
        "172.16.0.99, 203.0.113.9",
    )
    .await
    .assert_too_many_requests();

    // A different client behind the same proxy has its own budget
    app.post_json_via("/api/v1/auth/login", attempt, proxy, "203.0.113.10")
        .await
        .assert_unauthorized();
}
