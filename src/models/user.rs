//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The only privileged role; every other role is an ordinary member
pub const ADMIN_ROLE: &str = "admin";

/// Role given to users created without an explicit role
pub const DEFAULT_ROLE: &str = "agent";

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub public_id: String,
    pub organization_id: Uuid,
    pub sub_organization_id: Option<Uuid>,
    pub email: String,
    pub name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }

    /// Active and email-verified users may log in
    pub fn can_log_in(&self) -> bool {
        self.is_active && self.email_verified_at.is_some()
    }
}

/// Fields needed to insert a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub organization_id: Uuid,
    pub sub_organization_id: Option<Uuid>,
    pub email: String,
    pub name: Option<String>,
    pub password_hash: String,
    pub role: String,
    pub email_verified: bool,
}

/// Public user profile (without sensitive data)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: Uuid,
    pub public_id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub role: String,
    pub organization_id: Uuid,
    pub sub_organization_id: Option<Uuid>,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            public_id: user.public_id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role.clone(),
            organization_id: user.organization_id,
            sub_organization_id: user.sub_organization_id,
        }
    }
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        UserInfo::from(&user)
    }
}
