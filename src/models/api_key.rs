//! API key models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::utils::validation::validate_key_name;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyStatus {
    Active,
    Revoked,
}

/// Stored API key, without any secret material
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    pub id: Uuid,
    pub public_id: String,
    pub organization_id: Uuid,
    pub name: String,
    pub status: ApiKeyStatus,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Result of resolving a presented plaintext key
#[derive(Debug, Clone)]
pub struct ResolvedApiKey {
    pub api_key_id: Uuid,
    pub organization_id: Uuid,
    pub hmac_secret: String,
}

/// Tenant context attached to webhook requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiKeyContext {
    pub organization_id: Uuid,
    pub api_key_id: Uuid,
}

impl From<&ResolvedApiKey> for ApiKeyContext {
    fn from(key: &ResolvedApiKey) -> Self {
        Self {
            organization_id: key.organization_id,
            api_key_id: key.api_key_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiKeyRequest {
    #[validate(custom(function = "key_name"))]
    pub name: String,
}

fn key_name(name: &str) -> Result<(), ValidationError> {
    if validate_key_name(name) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_key_name"))
    }
}

/// Creation response; the only time the plaintext key and secret are shown
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiKeyResponse {
    pub id: Uuid,
    pub public_id: String,
    pub name: String,
    pub key: String,
    pub hmac_secret: String,
    pub created_at: DateTime<Utc>,
}
