//! User session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client details captured when a session is issued
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMetadata {
    pub user_agent: Option<String>,
    pub ip: Option<String>,
}

/// One row per issued refresh token
#[derive(Debug, Clone)]
pub struct UserSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub refresh_token_id: Uuid,
    pub refresh_token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub remember_me: bool,
    pub device: DeviceMetadata,
    pub created_at: DateTime<Utc>,
}

impl UserSession {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Session entry returned by the session listing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub remember_me: bool,
    pub device_metadata: DeviceMetadata,
    pub active: bool,
}

impl SessionInfo {
    pub fn from_session(session: UserSession, now: DateTime<Utc>) -> Self {
        let active = session.is_active_at(now);
        Self {
            id: session.id,
            created_at: session.created_at,
            expires_at: session.expires_at,
            remember_me: session.remember_me,
            device_metadata: session.device,
            active,
        }
    }
}
