use crate::config::PasswordPolicy;
use crate::error::{SecurityError, Result};

/// Validates a username.
///
/// # Arguments
///
/// * `username` - The username to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the username is valid.
pub fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() || username.len() < 3 {
        return Err(SecurityError::Validation(
            "Username must be at least 3 characters long".to_string(),
        ));
    }

    if username.len() > 255 {
        return Err(SecurityError::Validation(
            "Username must be at most 255 characters".to_string(),
        ));
    }

    if !username.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.') {
        return Err(SecurityError::Validation(
            "Username can only contain letters, numbers, dots, underscores, and hyphens".to_string(),
        ));
    }

    Ok(())
}

/// Validates a password against the configured policy.
///
/// # Arguments
///
/// * `password` - The password to validate.
/// * `policy` - The rules to enforce.
///
/// # Returns
///
/// A `Result<()>` indicating whether the password is acceptable.
pub fn validate_password(password: &str, policy: &PasswordPolicy) -> Result<()> {
    let length = password.chars().count();

    if length < policy.min_length {
        return Err(SecurityError::Validation(format!(
            "Password must be at least {} characters long",
            policy.min_length
        )));
    }

    if length > policy.max_length {
        return Err(SecurityError::Validation(format!(
            "Password must be at most {} characters",
            policy.max_length
        )));
    }

    if policy.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
        return Err(SecurityError::Validation(
            "Password must contain an uppercase letter".to_string(),
        ));
    }

    if policy.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
        return Err(SecurityError::Validation(
            "Password must contain a lowercase letter".to_string(),
        ));
    }

    if policy.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(SecurityError::Validation(
            "Password must contain a digit".to_string(),
        ));
    }

    if policy.require_special && password.chars().all(|c| c.is_alphanumeric()) {
        return Err(SecurityError::Validation(
            "Password must contain a special character".to_string(),
        ));
    }

    Ok(())
}
