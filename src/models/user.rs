use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

/// Represents a user account.
///
/// `failed_logins` only resets on a successful login and `locked` never
/// clears on its own once set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    /// The unique identifier for the user.
    pub id: String,
    /// The user's username.
    pub username: String,
    /// The user's email address.
    pub email: Option<String>,
    /// Argon2id PHC string.
    pub password_hash: String,
    /// The user's roles.
    pub roles: Vec<String>,
    /// Fine-grained permissions, interpreted by the access policy.
    pub permissions: Vec<String>,
    pub mfa_enabled: bool,
    /// Provider-specific MFA seed. Opaque to the core.
    pub mfa_secret: Option<String>,
    /// Consecutive failed logins.
    pub failed_logins: u32,
    pub locked: bool,
    pub active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// The view handed to callers, without credentials.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            roles: self.roles.clone(),
            permissions: self.permissions.clone(),
            mfa_enabled: self.mfa_enabled,
            locked: self.locked,
            active: self.active,
            last_login: self.last_login,
        }
    }
}

/// A user as seen by callers of the security core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub mfa_enabled: bool,
    pub locked: bool,
    pub active: bool,
    pub last_login: Option<DateTime<Utc>>,
}

/// The request payload for account creation.
#[derive(Clone, Validate)]
pub struct NewUser {
    #[garde(length(min = 3, max = 255))]
    pub username: String,
    #[garde(skip)]
    pub password: String,
    #[garde(email)]
    pub email: Option<String>,
    #[garde(skip)]
    pub roles: Vec<String>,
    #[garde(skip)]
    pub permissions: Vec<String>,
    #[garde(skip)]
    pub mfa_enabled: bool,
    #[garde(skip)]
    pub mfa_secret: Option<String>,
}

impl NewUser {
    /// A plain account with no roles.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            email: None,
            roles: Vec::new(),
            permissions: Vec::new(),
            mfa_enabled: false,
            mfa_secret: None,
        }
    }

    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_mfa(mut self, secret: Option<String>) -> Self {
        self.mfa_enabled = true;
        self.mfa_secret = secret;
        self
    }
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("roles", &self.roles)
            .field("mfa_enabled", &self.mfa_enabled)
            .finish_non_exhaustive()
    }
}
