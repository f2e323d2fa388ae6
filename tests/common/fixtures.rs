//! Test fixtures for common test data
//!
//! Seeds organizations, users and API keys straight into the store and logs
//! users in through the API.

use serde_json::json;
use uuid::Uuid;

use leadgate::{
    db::{OrganizationRepository, UserRepository},
    models::{CreateApiKeyResponse, NewUser, Organization, User, ADMIN_ROLE, DEFAULT_ROLE},
    services::crypto::{hash_secret, sha256_hex},
};

use super::TestApp;

pub const TEST_PASSWORD: &str = "correct horse battery";

/// Tokens from a successful login
#[derive(Debug, Clone)]
pub struct LoggedIn {
    pub access_token: String,
    pub refresh_token: String,
}

/// A seeded organization with one admin
pub struct Tenant {
    pub organization: Organization,
    pub admin: User,
}

impl TestApp {
    pub async fn seed_organization(&self, name: &str) -> Organization {
        OrganizationRepository::new(&self.state.db)
            .create(name)
            .await
            .expect("Failed to create organization")
    }

    pub async fn seed_user(&self, organization_id: Uuid, email: &str, role: &str) -> User {
        let password_hash = hash_secret(TEST_PASSWORD).expect("Failed to hash password");
        UserRepository::new(&self.state.db)
            .create(&NewUser {
                organization_id,
                sub_organization_id: None,
                email: email.to_string(),
                name: Some("Test User".to_string()),
                password_hash,
                role: role.to_string(),
                email_verified: true,
            })
            .await
            .expect("Failed to create user")
    }

    /// Organization named `name` with an admin `admin@{name}.test`
    pub async fn seed_tenant(&self, name: &str) -> Tenant {
        let organization = self.seed_organization(name).await;
        let admin = self
            .seed_user(organization.id, &format!("admin@{}.test", name), ADMIN_ROLE)
            .await;
        Tenant {
            organization,
            admin,
        }
    }

    pub async fn seed_agent(&self, organization_id: Uuid, email: &str) -> User {
        self.seed_user(organization_id, email, DEFAULT_ROLE).await
    }

    pub async fn login(&self, email: &str, password: &str) -> LoggedIn {
        let response = self
            .post_json(
                "/api/v1/auth/login",
                json!({ "email": email, "password": password }),
            )
            .await;
        response.assert_created();

        let body: serde_json::Value = response.json();
        LoggedIn {
            access_token: body["accessToken"].as_str().unwrap().to_string(),
            refresh_token: body["refreshToken"].as_str().unwrap().to_string(),
        }
    }

    /// Flip a user's active flag directly in the store
    pub async fn set_user_active(&self, user_id: Uuid, is_active: bool) {
        sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(user_id.to_string())
            .execute(&self.state.db)
            .await
            .expect("Failed to update user");
    }

    /// Reassign a user to another organization directly in the store
    pub async fn move_user(&self, user_id: Uuid, organization_id: Uuid) {
        sqlx::query("UPDATE users SET organization_id = ? WHERE id = ?")
            .bind(organization_id.to_string())
            .bind(user_id.to_string())
            .execute(&self.state.db)
            .await
            .expect("Failed to move user");
    }

    /// `used_at` of the one-time token with this raw value; `None` if it is unknown
    pub async fn one_time_token_used_at(&self, raw_token: &str) -> Option<Option<String>> {
        sqlx::query_scalar("SELECT used_at FROM one_time_tokens WHERE token_hash = ?")
            .bind(sha256_hex(raw_token))
            .fetch_optional(&self.state.db)
            .await
            .expect("Failed to read one-time token")
    }

    /// Create an API key through the admin endpoint
    pub async fn create_api_key(&self, admin_token: &str, name: &str) -> CreateApiKeyResponse {
        let response = self
            .post_json_with_auth("/api/v1/api-keys", json!({ "name": name }), admin_token)
            .await;
        response.assert_created();
        serde_json::from_slice(&response.body).expect("Failed to parse api key response")
    }
}
