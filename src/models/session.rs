use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::user::UserProfile;

/// Represents a login session.
///
/// `expires_at` is always later than `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Random identifier, independent of the token.
    pub id: String,
    /// The ID of the user this session belongs to.
    pub user_id: String,
    /// The signed access token minted with this session.
    pub token: String,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// Last successful token validation.
    pub last_used: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A long-lived opaque token exchanged for a fresh session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    pub token: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Claims carried by a signed access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub username: String,
    pub roles: Vec<String>,
    /// Session id.
    pub sid: String,
    pub iat: i64,
    pub exp: i64,
}

/// The result of a successful login or refresh.
#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub session_id: String,
    pub user: UserProfile,
}
