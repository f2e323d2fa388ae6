//! Input validation utilities

use once_cell::sync::Lazy;
use regex::Regex;

/// Regex for validating role names
static ROLE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]{1,31}$").unwrap());

/// Regex for validating API key display names
static KEY_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 ._-]{0,63}$").unwrap());

/// Validate a role name
pub fn validate_role(role: &str) -> bool {
    ROLE_REGEX.is_match(role)
}

/// Validate an API key display name
pub fn validate_key_name(name: &str) -> bool {
    KEY_NAME_REGEX.is_match(name)
}

/// Validate a new password against the configured policy.
///
/// Returns the reason the password was rejected, if any.
pub fn check_password_policy(password: &str, min_length: usize) -> Result<(), String> {
    if password.chars().count() < min_length {
        return Err(format!(
            "Password must be at least {} characters",
            min_length
        ));
    }
    if password.len() > 1024 {
        return Err("Password is too long".to_string());
    }
    if password.trim().is_empty() {
        return Err("Password cannot be blank".to_string());
    }
    Ok(())
}

/// Normalize an email address for lookups
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
