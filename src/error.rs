use std::fmt;
use thiserror::Error;

/// Why a login attempt was refused.
///
/// Callers render different UX for each case, so they stay distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// Unknown user or wrong password.
    InvalidCredentials,
    /// The account reached the failed-login threshold.
    AccountLocked,
    /// The account has been deactivated.
    AccountDisabled,
    /// The password was correct but a second factor is needed.
    MfaRequired,
    /// The second factor was supplied but rejected.
    MfaInvalid,
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            AuthFailure::InvalidCredentials => "invalid username or password",
            AuthFailure::AccountLocked => "account is locked",
            AuthFailure::AccountDisabled => "account is disabled",
            AuthFailure::MfaRequired => "MFA token required",
            AuthFailure::MfaInvalid => "invalid MFA token",
        };
        f.write_str(msg)
    }
}

/// Why an access token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFailure {
    /// Not a well-formed token.
    Malformed,
    /// The signature does not match the signing secret.
    InvalidSignature,
    /// The `exp` claim is in the past.
    Expired,
    /// The session behind the token was logged out or swept.
    Revoked,
}

impl fmt::Display for TokenFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            TokenFailure::Malformed => "malformed token",
            TokenFailure::InvalidSignature => "invalid token signature",
            TokenFailure::Expired => "token expired",
            TokenFailure::Revoked => "token revoked",
        };
        f.write_str(msg)
    }
}

/// The security core's error type.
#[derive(Error, Debug)]
pub enum SecurityError {
    /// Malformed configuration or request.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A login was refused.
    #[error("Authentication failed: {0}")]
    Authentication(AuthFailure),

    /// An access token was rejected.
    #[error("Token error: {0}")]
    Token(TokenFailure),

    /// A token referenced a user that no longer exists.
    #[error("User not found")]
    UserNotFound,

    /// A session, key or other record was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An encryption error.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Start while running, stop before start.
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// The backing store failed.
    #[error("Store error: {0}")]
    Store(String),

    /// An external collaborator did not answer in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// An internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `SecurityError` as the error type.
pub type Result<T> = std::result::Result<T, SecurityError>;

impl From<garde::Report> for SecurityError {
    fn from(report: garde::Report) -> Self {
        SecurityError::Validation(report.to_string())
    }
}

impl SecurityError {
    /// Short machine-friendly label, used as the audit `result` field.
    pub fn kind(&self) -> &'static str {
        match self {
            SecurityError::Validation(_) => "validation_error",
            SecurityError::Authentication(AuthFailure::AccountLocked) => "locked",
            SecurityError::Authentication(AuthFailure::MfaRequired) => "mfa_required",
            SecurityError::Authentication(_) => "denied",
            SecurityError::Token(TokenFailure::Expired) => "expired",
            SecurityError::Token(_) => "invalid_token",
            SecurityError::UserNotFound => "user_not_found",
            SecurityError::NotFound(_) => "not_found",
            SecurityError::Encryption(_) => "encryption_error",
            SecurityError::Lifecycle(_) => "lifecycle_error",
            SecurityError::Store(_) => "store_error",
            SecurityError::Timeout(_) => "timeout",
            SecurityError::Internal(_) => "internal_error",
        }
    }
}
