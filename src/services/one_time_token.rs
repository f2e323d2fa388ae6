//! Password-reset and invite tokens
//!
//! The raw token is 32 random bytes (base64url) and only its SHA-256 is stored.
//! Consuming a token and applying its effect happen in one transaction, so a
//! failed effect leaves the token unused.

use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::crypto::{generate_token, sha256_hex, PasswordHasherPool};
use crate::config::AuthConfig;
use crate::db::{
    is_unique_violation, one_time_token_repository, refresh_token_repository,
    session_repository, user_repository, DbPool, UserRepository,
};
use crate::models::{NewOneTimeToken, NewUser, OneTimeTokenType, User};
use crate::utils::validation::{check_password_policy, normalize_email};
use crate::utils::{AppError, AppResult};

/// Message for any unknown, used, expired or mistyped token
const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired token";

/// A freshly created token; `raw` is never stored
#[derive(Debug, Clone)]
pub struct IssuedOneTimeToken {
    pub raw: String,
    pub expires_at: DateTime<Utc>,
}

pub struct OneTimeTokenService {
    db: DbPool,
    hasher: PasswordHasherPool,
    auth: AuthConfig,
}

impl OneTimeTokenService {
    pub fn new(db: DbPool, hasher: PasswordHasherPool, auth: AuthConfig) -> Self {
        Self { db, hasher, auth }
    }

    /// Create a reset token for the first active user with this email.
    ///
    /// Returns `None` when no such user exists; callers must answer identically
    /// either way.
    pub async fn request_password_reset(&self, email: &str) -> AppResult<Option<IssuedOneTimeToken>> {
        let email = normalize_email(email);
        let user = UserRepository::new(&self.db)
            .find_by_email(&email)
            .await?
            .into_iter()
            .find(|u| u.is_active);

        let Some(user) = user else {
            debug!("Password reset requested for unknown or inactive email");
            return Ok(None);
        };

        let now = Utc::now();
        let issued = issue(now, self.auth.reset_token_ttl())?;
        let new_token = NewOneTimeToken {
            token_type: OneTimeTokenType::PasswordReset,
            user_id: Some(user.id),
            organization_id: Some(user.organization_id),
            invite_email: None,
            invite_role: None,
            expires_at: issued.expires_at,
        };

        let mut tx = self.db.begin().await?;
        let superseded = one_time_token_repository::expire_outstanding(
            &mut tx,
            user.id,
            OneTimeTokenType::PasswordReset,
            now,
        )
        .await?;
        one_time_token_repository::insert(&mut tx, &sha256_hex(&issued.raw), &new_token).await?;
        tx.commit().await?;

        info!(user_id = %user.id, superseded, "Password reset token issued");
        Ok(Some(issued))
    }

    /// Set a new password with a reset token and end every session of the user
    pub async fn reset_password(&self, raw_token: &str, new_password: &str) -> AppResult<()> {
        check_password_policy(new_password, self.auth.password_min_length)
            .map_err(AppError::BadRequest)?;
        let new_hash = self.hasher.hash(new_password.to_string()).await?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let token = one_time_token_repository::consume(
            &mut tx,
            &sha256_hex(raw_token),
            OneTimeTokenType::PasswordReset,
            now,
        )
        .await?
        .ok_or_else(|| {
            debug!("Password reset rejected: token unknown, used or expired");
            AppError::bad_request(INVALID_TOKEN_MESSAGE)
        })?;

        let user_id = token
            .user_id
            .context("Password reset token without a user")?;

        if !user_repository::update_password(&mut tx, user_id, &new_hash, now).await? {
            warn!(user_id = %user_id, "Password reset for a user that no longer exists");
            return Err(AppError::bad_request(INVALID_TOKEN_MESSAGE));
        }
        let revoked = refresh_token_repository::revoke_all_for_user(&mut tx, user_id, now).await?;
        session_repository::expire_all_for_user(&mut tx, user_id, now).await?;
        tx.commit().await?;

        info!(user_id = %user_id, revoked_tokens = revoked, "Password reset completed");
        Ok(())
    }

    /// Invite an email address into the admin's organization
    pub async fn create_invite(
        &self,
        admin: &User,
        email: &str,
        role: &str,
    ) -> AppResult<IssuedOneTimeToken> {
        let now = Utc::now();
        let issued = issue(now, self.auth.invite_token_ttl())?;
        let new_token = NewOneTimeToken {
            token_type: OneTimeTokenType::Invite,
            user_id: None,
            organization_id: Some(admin.organization_id),
            invite_email: Some(normalize_email(email)),
            invite_role: Some(role.to_string()),
            expires_at: issued.expires_at,
        };

        let mut conn = self.db.acquire().await?;
        one_time_token_repository::insert(&mut conn, &sha256_hex(&issued.raw), &new_token).await?;

        info!(
            organization_id = %admin.organization_id,
            invited_by = %admin.id,
            role,
            "Invite created"
        );
        Ok(issued)
    }

    /// Create the invited user and consume the invite in one transaction
    pub async fn accept_invite(&self, raw_token: &str, name: &str, password: &str) -> AppResult<User> {
        check_password_policy(password, self.auth.password_min_length)
            .map_err(AppError::BadRequest)?;
        let password_hash = self.hasher.hash(password.to_string()).await?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let token = one_time_token_repository::consume(
            &mut tx,
            &sha256_hex(raw_token),
            OneTimeTokenType::Invite,
            now,
        )
        .await?
        .ok_or_else(|| {
            debug!("Invite rejected: token unknown, used or expired");
            AppError::bad_request(INVALID_TOKEN_MESSAGE)
        })?;

        let new_user = NewUser {
            organization_id: token
                .organization_id
                .context("Invite token without an organization")?,
            sub_organization_id: None,
            email: token.invite_email.context("Invite token without an email")?,
            name: Some(name.trim().to_string()),
            password_hash,
            role: token.invite_role.context("Invite token without a role")?,
            email_verified: true,
        };

        let user = match user_repository::insert(&mut tx, &new_user).await {
            Ok(user) => user,
            Err(e) if is_unique_violation(&e) => {
                // Dropping the transaction rolls back the consumption as well
                debug!(organization_id = %new_user.organization_id, "Invite rejected: email already registered");
                return Err(AppError::conflict("A user with this email already exists"));
            }
            Err(e) => return Err(e.into()),
        };
        tx.commit().await?;

        info!(user_id = %user.id, organization_id = %user.organization_id, "Invite accepted");
        Ok(user)
    }
}

fn issue(now: DateTime<Utc>, ttl: Duration) -> AppResult<IssuedOneTimeToken> {
    let ttl = chrono::Duration::from_std(ttl).context("Token lifetime out of range")?;
    Ok(IssuedOneTimeToken {
        raw: generate_token(),
        expires_at: now + ttl,
    })
}
