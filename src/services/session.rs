//! Session and token lifecycle
//!
//! A login issues a short-lived access token and a refresh token. Every refresh
//! token row is paired with a session row; both are created together and ended
//! together. Presenting a refresh token rotates it: the old row is revoked and
//! linked to its successor, and the old session is expired. Presenting a token
//! that was already rotated away ends every session of its user.

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::crypto::PasswordHasherPool;
use super::token::{TokenSigner, TokenType};
use crate::config::AuthConfig;
use crate::db::{
    refresh_token_repository, session_repository, user_repository, DbPool,
    OrganizationRepository, RefreshTokenRepository, SessionRepository, UserRepository,
};
use crate::models::{DeviceMetadata, RefreshToken, SessionInfo, User, UserSession};
use crate::utils::validation::{check_password_policy, normalize_email};
use crate::utils::{AppError, AppResult};

/// Token pair handed to a client
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_token_id: Uuid,
}

/// A refresh token and its session, prepared before any write
struct PreparedSession {
    token: RefreshToken,
    session: UserSession,
    jwt: String,
}

pub struct SessionService {
    db: DbPool,
    signer: TokenSigner,
    hasher: PasswordHasherPool,
    auth: AuthConfig,
}

impl SessionService {
    pub fn new(db: DbPool, signer: TokenSigner, hasher: PasswordHasherPool, auth: AuthConfig) -> Self {
        Self {
            db,
            signer,
            hasher,
            auth,
        }
    }

    /// Password login
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
        device: DeviceMetadata,
    ) -> AppResult<(User, IssuedTokens)> {
        let email = normalize_email(email);
        let candidates = UserRepository::new(&self.db).find_by_email(&email).await?;

        if candidates.is_empty() {
            self.hasher.verify_dummy(password.to_string()).await;
            debug!("Login rejected: unknown email");
            return Err(AppError::Unauthorized);
        }

        let mut matched = None;
        for candidate in candidates {
            match self
                .hasher
                .verify(password.to_string(), candidate.password_hash.clone())
                .await
            {
                Ok(true) => {
                    matched = Some(candidate);
                    break;
                }
                Ok(false) => {}
                Err(e) => warn!(user_id = %candidate.id, "Unusable password hash: {:#}", e),
            }
        }

        let Some(user) = matched else {
            debug!("Login rejected: wrong password");
            return Err(AppError::Unauthorized);
        };

        if !user.can_log_in() {
            debug!(user_id = %user.id, "Login rejected: inactive or unverified account");
            return Err(AppError::Unauthorized);
        }

        if !OrganizationRepository::new(&self.db)
            .exists(user.organization_id)
            .await?
        {
            warn!(user_id = %user.id, "Login rejected: organization no longer exists");
            return Err(AppError::Unauthorized);
        }

        let prepared = self.prepare_session(&user, remember_me, device).await?;
        let mut tx = self.db.begin().await?;
        refresh_token_repository::insert(&mut tx, &prepared.token).await?;
        session_repository::insert(&mut tx, &prepared.session).await?;
        tx.commit().await?;

        let tokens = self.finish(&user, prepared)?;
        info!(user_id = %user.id, remember_me, "User logged in");
        Ok((user, tokens))
    }

    /// Exchange a refresh token for a new pair, revoking the presented one
    pub async fn refresh(&self, presented: &str, device: DeviceMetadata) -> AppResult<IssuedTokens> {
        let claims = self
            .signer
            .verify(presented, TokenType::Refresh)
            .map_err(|e| {
                debug!("Refresh rejected: {}", e);
                AppError::Unauthorized
            })?;
        let user_id = claims.subject().ok_or(AppError::Unauthorized)?;

        let user = UserRepository::new(&self.db)
            .get_by_id(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| {
                debug!(user_id = %user_id, "Refresh rejected: user missing or inactive");
                AppError::Unauthorized
            })?;

        let tokens = RefreshTokenRepository::new(&self.db)
            .list_for_user(user.id)
            .await?;
        let stored = self
            .find_matching(presented, claims.token_id(), tokens)
            .await?
            .ok_or_else(|| {
                debug!(user_id = %user.id, "Refresh rejected: no stored token matches");
                AppError::Unauthorized
            })?;

        if stored.is_revoked() {
            if stored.replaced_by_token_id.is_some() {
                self.revoke_family(user.id, stored.id).await?;
            } else {
                debug!(token_id = %stored.id, "Refresh rejected: token was revoked");
            }
            return Err(AppError::Unauthorized);
        }

        let now = Utc::now();
        let session = SessionRepository::new(&self.db)
            .find_by_refresh_token(stored.id)
            .await?
            .filter(|s| s.is_active_at(now))
            .ok_or_else(|| {
                debug!(token_id = %stored.id, "Refresh rejected: session missing or expired");
                AppError::Unauthorized
            })?;

        let max_age = chrono::Duration::from_std(self.auth.refresh_ttl(session.remember_me))
            .context("Refresh lifetime out of range")?;
        if now - stored.created_at > max_age {
            debug!(token_id = %stored.id, "Refresh rejected: token older than its lifetime");
            return Err(AppError::Unauthorized);
        }

        let prepared = self
            .prepare_session(&user, session.remember_me, device)
            .await?;

        let mut tx = self.db.begin().await?;
        if !refresh_token_repository::mark_rotated(&mut tx, stored.id, prepared.token.id, now).await? {
            // Another request rotated this token first
            warn!(token_id = %stored.id, "Refresh token reuse detected during rotation");
            return Err(AppError::Unauthorized);
        }
        refresh_token_repository::insert(&mut tx, &prepared.token).await?;
        session_repository::insert(&mut tx, &prepared.session).await?;
        session_repository::expire_for_refresh_token(&mut tx, stored.id, now).await?;
        tx.commit().await?;

        debug!(user_id = %user.id, old = %stored.id, new = %prepared.token.id, "Refresh token rotated");
        self.finish(&user, prepared)
    }

    /// Revoke the presented refresh token if it is known. Never fails on a bad token.
    pub async fn logout(&self, presented: &str) -> AppResult<()> {
        let Ok(claims) = self.signer.verify(presented, TokenType::Refresh) else {
            debug!("Logout with an unusable refresh token");
            return Ok(());
        };
        let Some(user_id) = claims.subject() else {
            return Ok(());
        };

        let tokens = RefreshTokenRepository::new(&self.db)
            .list_unrevoked_for_user(user_id)
            .await?;
        let Some(stored) = self.find_matching(presented, claims.token_id(), tokens).await? else {
            return Ok(());
        };

        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        if refresh_token_repository::revoke(&mut tx, stored.id, now).await? {
            session_repository::expire_for_refresh_token(&mut tx, stored.id, now).await?;
        }
        tx.commit().await?;

        info!(user_id = %user_id, token_id = %stored.id, "User logged out");
        Ok(())
    }

    /// Verify an access token and load its user live from the store
    pub async fn authenticate_access(&self, token: &str) -> AppResult<User> {
        let claims = self.signer.verify(token, TokenType::Access).map_err(|e| {
            debug!("Access token rejected: {}", e);
            AppError::Unauthorized
        })?;
        let user_id = claims.subject().ok_or(AppError::Unauthorized)?;
        let organization_id = claims.organization().ok_or(AppError::Unauthorized)?;

        let user = UserRepository::new(&self.db)
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| {
                debug!(user_id = %user_id, "Access token rejected: user no longer exists");
                AppError::Unauthorized
            })?;

        if !user.is_active {
            debug!(user_id = %user_id, "Access token rejected: user inactive");
            return Err(AppError::Unauthorized);
        }

        if user.organization_id != organization_id {
            warn!(
                user_id = %user_id,
                token_org = %organization_id,
                current_org = %user.organization_id,
                "Access token rejected: organization changed"
            );
            return Err(AppError::Unauthorized);
        }

        Ok(user)
    }

    /// Change the password of an authenticated user.
    ///
    /// Every existing refresh token is revoked and every session ended; one fresh
    /// pair is issued for the calling device.
    pub async fn change_password(
        &self,
        user: &User,
        current_password: &str,
        new_password: &str,
        remember_me: bool,
        device: DeviceMetadata,
    ) -> AppResult<IssuedTokens> {
        let valid = self
            .hasher
            .verify(current_password.to_string(), user.password_hash.clone())
            .await?;
        if !valid {
            debug!(user_id = %user.id, "Password change rejected: wrong current password");
            return Err(AppError::bad_request("Current password is incorrect"));
        }

        check_password_policy(new_password, self.auth.password_min_length)
            .map_err(AppError::BadRequest)?;

        let new_hash = self.hasher.hash(new_password.to_string()).await?;
        let prepared = self.prepare_session(user, remember_me, device).await?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        user_repository::update_password(&mut tx, user.id, &new_hash, now).await?;
        let revoked = refresh_token_repository::revoke_all_for_user(&mut tx, user.id, now).await?;
        session_repository::expire_all_for_user(&mut tx, user.id, now).await?;
        refresh_token_repository::insert(&mut tx, &prepared.token).await?;
        session_repository::insert(&mut tx, &prepared.session).await?;
        tx.commit().await?;

        info!(user_id = %user.id, revoked_tokens = revoked, "Password changed");
        self.finish(user, prepared)
    }

    /// Sessions of a user, newest first
    pub async fn list_sessions(&self, user_id: Uuid) -> AppResult<Vec<SessionInfo>> {
        let now = Utc::now();
        let sessions = SessionRepository::new(&self.db).list_for_user(user_id).await?;
        Ok(sessions
            .into_iter()
            .map(|s| SessionInfo::from_session(s, now))
            .collect())
    }

    /// Find the stored token matching the presented value.
    ///
    /// The row named by the `jti` claim is tried first; the remaining rows are then
    /// verified newest first.
    /// A rotated-away token came back: its successor may be in the wrong hands, so
    /// every refresh token of the user is revoked and every session ended.
    async fn revoke_family(&self, user_id: Uuid, reused: Uuid) -> AppResult<()> {
        let chain = RefreshTokenRepository::new(&self.db).chain_from(reused).await?;
        let successor = chain.last().filter(|t| t.id != reused).map(|t| t.id);

        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let revoked = refresh_token_repository::revoke_all_for_user(&mut tx, user_id, now).await?;
        let expired = session_repository::expire_all_for_user(&mut tx, user_id, now).await?;
        tx.commit().await?;

        warn!(
            user_id = %user_id,
            token_id = %reused,
            successor = ?successor,
            chain_len = chain.len(),
            revoked,
            expired,
            "Refresh token reuse detected, all sessions ended"
        );
        Ok(())
    }

    async fn find_matching(
        &self,
        presented: &str,
        hinted: Option<Uuid>,
        mut tokens: Vec<RefreshToken>,
    ) -> AppResult<Option<RefreshToken>> {
        if let Some(pos) = hinted.and_then(|id| tokens.iter().position(|t| t.id == id)) {
            let hinted = tokens.remove(pos);
            tokens.insert(0, hinted);
        }

        for token in tokens {
            match self
                .hasher
                .verify(presented.to_string(), token.token_hash.clone())
                .await
            {
                Ok(true) => return Ok(Some(token)),
                Ok(false) => {}
                Err(e) => warn!(token_id = %token.id, "Unusable refresh token hash: {:#}", e),
            }
        }

        Ok(None)
    }

    async fn prepare_session(
        &self,
        user: &User,
        remember_me: bool,
        device: DeviceMetadata,
    ) -> AppResult<PreparedSession> {
        let now = Utc::now();
        let ttl = self.auth.refresh_ttl(remember_me);
        let token_id = Uuid::new_v4();
        let jwt = self.signer.issue_refresh(user.id, token_id, ttl)?;
        let token_hash = self.hasher.hash(jwt.clone()).await?;

        let token = RefreshToken {
            id: token_id,
            user_id: user.id,
            token_hash: token_hash.clone(),
            created_at: now,
            revoked_at: None,
            replaced_by_token_id: None,
            user_agent: device.user_agent.clone(),
            ip: device.ip.clone(),
        };
        let session = UserSession {
            id: Uuid::new_v4(),
            user_id: user.id,
            organization_id: user.organization_id,
            refresh_token_id: token_id,
            refresh_token_hash: token_hash,
            expires_at: expires_after(now, ttl)?,
            remember_me,
            device,
            created_at: now,
        };

        Ok(PreparedSession {
            token,
            session,
            jwt,
        })
    }

    fn finish(&self, user: &User, prepared: PreparedSession) -> AppResult<IssuedTokens> {
        Ok(IssuedTokens {
            access_token: self.signer.issue_access(user)?,
            refresh_token: prepared.jwt,
            refresh_token_id: prepared.token.id,
        })
    }
}

fn expires_after(now: DateTime<Utc>, ttl: std::time::Duration) -> anyhow::Result<DateTime<Utc>> {
    let ttl = chrono::Duration::from_std(ttl).context("Session lifetime out of range")?;
    Ok(now + ttl)
}
