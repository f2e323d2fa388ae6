//! One-time token model (password reset and invites)

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneTimeTokenType {
    PasswordReset,
    Invite,
}

impl OneTimeTokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OneTimeTokenType::PasswordReset => "password_reset",
            OneTimeTokenType::Invite => "invite",
        }
    }
}

impl std::fmt::Display for OneTimeTokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OneTimeTokenType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password_reset" => Ok(OneTimeTokenType::PasswordReset),
            "invite" => Ok(OneTimeTokenType::Invite),
            _ => Err(format!("Invalid one-time token type: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OneTimeToken {
    pub id: Uuid,
    pub token_type: OneTimeTokenType,
    pub user_id: Option<Uuid>,
    pub organization_id: Option<Uuid>,
    pub invite_email: Option<String>,
    pub invite_role: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new token row; the hash is supplied separately
#[derive(Debug, Clone)]
pub struct NewOneTimeToken {
    pub token_type: OneTimeTokenType,
    pub user_id: Option<Uuid>,
    pub organization_id: Option<Uuid>,
    pub invite_email: Option<String>,
    pub invite_role: Option<String>,
    pub expires_at: DateTime<Utc>,
}
