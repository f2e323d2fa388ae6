//! API key issuance, resolution and revocation

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::crypto::{generate_api_key, generate_hmac_secret, generate_public_id, sha256_hex};
use crate::db::{api_key_repository::NewApiKey, ApiKeyRepository, DbPool};
use crate::models::{ApiKey, CreateApiKeyResponse, ResolvedApiKey};

#[derive(Clone)]
pub struct ApiKeyService {
    db: DbPool,
}

impl ApiKeyService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Resolve a presented plaintext key to its owning tenant.
    ///
    /// On a hit, `last_used_at` is updated in the background; failures there are
    /// logged and never affect the caller.
    pub async fn resolve(&self, plaintext: &str) -> Result<Option<ResolvedApiKey>> {
        let key_hash = sha256_hex(plaintext);
        let resolved = ApiKeyRepository::new(&self.db)
            .find_active_by_hash(&key_hash)
            .await?;

        match resolved {
            Some(key) => {
                let db = self.db.clone();
                let key_id = key.api_key_id;
                tokio::spawn(async move {
                    if let Err(e) = ApiKeyRepository::new(&db)
                        .touch_last_used(key_id, Utc::now())
                        .await
                    {
                        warn!(api_key_id = %key_id, "Failed to record api key usage: {:#}", e);
                    }
                });
                Ok(Some(key))
            }
            None => {
                debug!("No active api key matches the presented value");
                Ok(None)
            }
        }
    }

    /// Create a key for the organization. The plaintext is returned once and only
    /// its hash is stored.
    pub async fn create(&self, organization_id: Uuid, name: &str) -> Result<CreateApiKeyResponse> {
        let plaintext = generate_api_key();
        let hmac_secret = generate_hmac_secret();
        let public_id = generate_public_id("key");
        let key_hash = sha256_hex(&plaintext);

        let key = ApiKeyRepository::new(&self.db)
            .create(NewApiKey {
                organization_id,
                public_id: &public_id,
                name,
                key_hash: &key_hash,
                hmac_secret: &hmac_secret,
            })
            .await?;

        info!(api_key_id = %key.id, organization_id = %organization_id, "API key created");

        Ok(CreateApiKeyResponse {
            id: key.id,
            public_id: key.public_id,
            name: key.name,
            key: plaintext,
            hmac_secret,
            created_at: key.created_at,
        })
    }

    pub async fn list(&self, organization_id: Uuid) -> Result<Vec<ApiKey>> {
        ApiKeyRepository::new(&self.db)
            .list_for_organization(organization_id)
            .await
    }

    /// Revoke a key. Returns false when no active key with this id exists in the
    /// organization.
    pub async fn revoke(&self, organization_id: Uuid, id: Uuid) -> Result<bool> {
        let revoked = ApiKeyRepository::new(&self.db)
            .revoke(organization_id, id, Utc::now())
            .await?;
        if revoked {
            info!(api_key_id = %id, organization_id = %organization_id, "API key revoked");
        }
        Ok(revoked)
    }
}
