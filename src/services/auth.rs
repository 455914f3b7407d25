use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use garde::Validate;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

use crate::config::AuthConfig;
use crate::crypto::{password, token};
use crate::error::{AuthFailure, SecurityError, Result, TokenFailure};
use crate::models::session::{Claims, LoginResponse, RefreshToken, Session};
use crate::models::status::AuthStatus;
use crate::models::user::{NewUser, User, UserProfile};
use crate::store::{self, Store};
use crate::validation::auth::{validate_password, validate_username};
use crate::worker::{self, Lifecycle};

const USER_PREFIX: &str = "user:";
const SESSION_PREFIX: &str = "session:";

/// Second-factor check. Real TOTP/SMS providers live outside the core.
pub trait MfaValidator: Send + Sync {
    fn validate(&self, user_id: &str, token: &str) -> bool;
}

/// Rejects every token. Used when no provider is configured.
pub struct DenyAllMfa;

impl MfaValidator for DenyAllMfa {
    fn validate(&self, _user_id: &str, _token: &str) -> bool {
        false
    }
}

/// Accepts one explicitly configured code, compared in constant time.
pub struct StaticCodeMfa {
    code: Zeroizing<String>,
}

impl StaticCodeMfa {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: Zeroizing::new(code.into()),
        }
    }
}

impl MfaValidator for StaticCodeMfa {
    fn validate(&self, _user_id: &str, token: &str) -> bool {
        self.code.as_bytes().ct_eq(token.as_bytes()).into()
    }
}

#[derive(Default)]
struct AuthState {
    users: HashMap<String, User>,
    /// username -> user id
    usernames: HashMap<String, String>,
    sessions: HashMap<String, Session>,
    refresh_tokens: HashMap<String, RefreshToken>,
}

struct AuthShared {
    config: AuthConfig,
    store: Arc<dyn Store>,
    mfa: Arc<dyn MfaValidator>,
    state: RwLock<AuthState>,
}

/// Identity, sessions and lockout.
pub struct AuthManager {
    shared: Arc<AuthShared>,
    lifecycle: Lifecycle,
}

fn denied(reason: AuthFailure) -> SecurityError {
    SecurityError::Authentication(reason)
}

/// `now + lifetime`, rejecting lifetimes past the representable range.
fn expires_after(now: DateTime<Utc>, lifetime: std::time::Duration) -> Result<DateTime<Utc>> {
    chrono::Duration::from_std(lifetime)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| SecurityError::Validation(format!("lifetime {:?} is out of range", lifetime)))
}

impl AuthShared {
    fn sign(&self, claims: &Claims) -> Result<String> {
        jsonwebtoken::encode(
            &Header::new(jsonwebtoken::Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(&self.config.jwt_secret),
        )
        .map_err(|e| SecurityError::Internal(format!("token signing failed: {}", e)))
    }

    fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.config.jwt_secret),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| {
            let failure = match e.kind() {
                ErrorKind::ExpiredSignature => TokenFailure::Expired,
                ErrorKind::InvalidSignature => TokenFailure::InvalidSignature,
                _ => TokenFailure::Malformed,
            };
            SecurityError::Token(failure)
        })
    }

    /// Mints a session, access token and refresh token for `user`.
    fn issue(&self, state: &mut AuthState, user: &User, now: DateTime<Utc>) -> Result<(LoginResponse, Session)> {
        let session_id = token::generate_id();
        let expires_at = expires_after(now, self.config.session_timeout)?;

        let claims = Claims {
            sub: user.id.clone(),
            username: user.username.clone(),
            roles: user.roles.clone(),
            sid: session_id.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let access_token = self.sign(&claims)?;

        let refresh = RefreshToken {
            token: token::generate_token(),
            user_id: user.id.clone(),
            expires_at: expires_after(now, self.config.refresh_token_ttl)?,
        };

        let session = Session {
            id: session_id.clone(),
            user_id: user.id.clone(),
            token: access_token.clone(),
            expires_at,
            created_at: now,
            last_used: now,
        };

        state.sessions.insert(session_id.clone(), session.clone());
        state.refresh_tokens.insert(refresh.token.clone(), refresh.clone());

        let response = LoginResponse {
            access_token,
            refresh_token: refresh.token,
            expires_at,
            session_id,
            user: user.profile(),
        };
        Ok((response, session))
    }

    fn persist_user(&self, user: &User) -> Result<()> {
        store::put_record(self.store.as_ref(), &format!("{}{}", USER_PREFIX, user.id), user)
    }

    fn persist_session(&self, session: &Session) -> Result<()> {
        store::put_record(
            self.store.as_ref(),
            &format!("{}{}", SESSION_PREFIX, session.id),
            session,
        )
    }

    /// Removes expired sessions and refresh tokens.
    async fn sweep(&self) -> Result<usize> {
        let now = Utc::now();
        let expired: Vec<String> = {
            let mut state = self.state.write().await;
            let expired: Vec<String> = state
                .sessions
                .values()
                .filter(|s| s.is_expired(now))
                .map(|s| s.id.clone())
                .collect();
            for id in &expired {
                state.sessions.remove(id);
            }
            state.refresh_tokens.retain(|_, t| t.expires_at > now);
            expired
        };

        for id in &expired {
            self.store.delete(&format!("{}{}", SESSION_PREFIX, id))?;
        }
        if !expired.is_empty() {
            tracing::info!(removed = expired.len(), "🧹 Expired sessions removed");
        }
        Ok(expired.len())
    }
}

impl AuthManager {
    /// Creates a new `AuthManager`.
    pub fn new(config: AuthConfig, store: Arc<dyn Store>, mfa: Arc<dyn MfaValidator>) -> Self {
        Self {
            shared: Arc::new(AuthShared {
                config,
                store,
                mfa,
                state: RwLock::new(AuthState::default()),
            }),
            lifecycle: Lifecycle::new("auth manager"),
        }
    }

    /// Creates the bootstrap admin if configured and starts the session sweep.
    pub async fn start(&self) -> Result<()> {
        let shutdown = self.lifecycle.begin_start().await?;

        if let Some(admin) = self.shared.config.bootstrap_admin.clone() {
            let exists = self
                .shared
                .state
                .read()
                .await
                .usernames
                .contains_key(&admin.username);
            if !exists {
                let mut new_user = NewUser::new(admin.username.clone(), admin.password.as_str())
                    .with_roles(&["admin"]);
                new_user.email = admin.email.clone();
                if let Err(e) = self.create_user(new_user).await {
                    tracing::error!("❌ Failed to create bootstrap admin: {}", e);
                    self.lifecycle.abort_start().await;
                    return Err(e);
                }
                tracing::info!(username = %admin.username, "✅ Bootstrap admin created");
            }
        }

        if self.shared.config.enabled {
            let shared = self.shared.clone();
            let handle = worker::spawn_periodic(
                "session-sweep",
                self.shared.config.session_cleanup_interval,
                shutdown,
                move || {
                    let shared = shared.clone();
                    async move {
                        tracing::debug!("🧹 Running scheduled session cleanup...");
                        if let Err(e) = shared.sweep().await {
                            tracing::error!("❌ Session cleanup failed: {}", e);
                        }
                    }
                },
            );
            match handle {
                Ok(handle) => self.lifecycle.attach(handle).await,
                Err(e) => {
                    self.lifecycle.abort_start().await;
                    return Err(e);
                }
            }
        }

        tracing::info!("✅ Auth manager started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        if self.lifecycle.stop().await? {
            tracing::info!("Auth manager stopped");
        }
        Ok(())
    }

    fn ensure_enabled(&self) -> Result<()> {
        if !self.shared.config.enabled {
            return Err(SecurityError::Validation(
                "authentication is disabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Creates an account.
    ///
    /// # Returns
    ///
    /// The new user's profile.
    #[tracing::instrument(skip(self, new_user), fields(username = %new_user.username))]
    pub async fn create_user(&self, new_user: NewUser) -> Result<UserProfile> {
        new_user.validate()?;
        validate_username(&new_user.username)?;
        validate_password(&new_user.password, &self.shared.config.password_policy)?;

        if self
            .shared
            .state
            .read()
            .await
            .usernames
            .contains_key(&new_user.username)
        {
            return Err(SecurityError::Validation(
                "Username already exists".to_string(),
            ));
        }

        let password_hash = password::hash_password(&new_user.password, &self.shared.config.hashing)?;

        let user = User {
            id: token::generate_id(),
            username: new_user.username,
            email: new_user.email,
            password_hash,
            roles: new_user.roles,
            permissions: new_user.permissions,
            mfa_enabled: new_user.mfa_enabled,
            mfa_secret: new_user.mfa_secret,
            failed_logins: 0,
            locked: false,
            active: true,
            last_login: None,
            created_at: Utc::now(),
        };

        {
            let mut state = self.shared.state.write().await;
            if state.usernames.contains_key(&user.username) {
                return Err(SecurityError::Validation(
                    "Username already exists".to_string(),
                ));
            }
            state.usernames.insert(user.username.clone(), user.id.clone());
            state.users.insert(user.id.clone(), user.clone());
        }
        self.shared.persist_user(&user)?;

        tracing::info!("✅ User created with ID: {}", user.id);
        Ok(user.profile())
    }

    /// Authenticates a user and opens a session.
    ///
    /// The write lock is held across the whole check-then-mutate sequence.
    #[tracing::instrument(skip(self, username, password, mfa_token), fields(username = %username))]
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        mfa_token: Option<&str>,
    ) -> Result<LoginResponse> {
        self.ensure_enabled()?;
        let threshold = self.shared.config.max_failed_logins;
        let now = Utc::now();

        let mut state = self.shared.state.write().await;

        let user_id = state
            .usernames
            .get(username)
            .cloned()
            .ok_or_else(|| {
                tracing::warn!("❌ Login failed: unknown user");
                denied(AuthFailure::InvalidCredentials)
            })?;

        let user = {
            let user = state
                .users
                .get_mut(&user_id)
                .ok_or_else(|| denied(AuthFailure::InvalidCredentials))?;

            if user.locked {
                tracing::warn!(user_id = %user.id, "🔒 Login refused: account locked");
                return Err(denied(AuthFailure::AccountLocked));
            }

            if !user.active {
                tracing::warn!(user_id = %user.id, "❌ Login refused: account disabled");
                return Err(denied(AuthFailure::AccountDisabled));
            }

            if !password::verify_password(password, &user.password_hash)? {
                user.failed_logins += 1;
                if user.failed_logins >= threshold {
                    user.locked = true;
                    tracing::warn!(
                        user_id = %user.id,
                        failed_logins = user.failed_logins,
                        "🔒 Account locked after repeated failures"
                    );
                } else {
                    tracing::warn!(
                        user_id = %user.id,
                        failed_logins = user.failed_logins,
                        "❌ Login failed: invalid password"
                    );
                }
                let snapshot = user.clone();
                drop(state);
                self.shared.persist_user(&snapshot)?;
                return Err(denied(AuthFailure::InvalidCredentials));
            }

            if user.mfa_enabled && self.shared.config.mfa_enabled {
                match mfa_token {
                    None => {
                        tracing::info!(user_id = %user.id, "MFA token required");
                        return Err(denied(AuthFailure::MfaRequired));
                    }
                    Some(code) => {
                        if !self.shared.mfa.validate(&user.id, code) {
                            tracing::warn!(user_id = %user.id, "❌ Login failed: invalid MFA token");
                            return Err(denied(AuthFailure::MfaInvalid));
                        }
                    }
                }
            }

            user.failed_logins = 0;
            user.last_login = Some(now);
            user.clone()
        };

        let (response, session) = self.shared.issue(&mut state, &user, now)?;
        drop(state);

        self.shared.persist_user(&user)?;
        self.shared.persist_session(&session)?;

        tracing::info!(user_id = %user.id, session_id = %session.id, "✅ User authenticated");
        Ok(response)
    }

    /// Ends a session.
    ///
    /// # Returns
    ///
    /// The id of the user who owned the session.
    #[tracing::instrument(skip(self))]
    pub async fn logout(&self, session_id: &str) -> Result<String> {
        let removed = self.shared.state.write().await.sessions.remove(session_id);
        match removed {
            Some(session) => {
                self.shared
                    .store
                    .delete(&format!("{}{}", SESSION_PREFIX, session.id))?;
                tracing::info!(user_id = %session.user_id, "👋 Session closed");
                Ok(session.user_id.clone())
            }
            None => Err(SecurityError::NotFound(format!("session {}", session_id))),
        }
    }

    /// Verifies an access token and loads its user.
    #[tracing::instrument(skip(self, token))]
    pub async fn validate_token(&self, token: &str) -> Result<UserProfile> {
        let claims = self.shared.verify(token)?;
        let now = Utc::now();

        let mut state = self.shared.state.write().await;
        let profile = state
            .users
            .get(&claims.sub)
            .map(User::profile)
            .ok_or(SecurityError::UserNotFound)?;

        let session = state
            .sessions
            .get_mut(&claims.sid)
            .ok_or(SecurityError::Token(TokenFailure::Revoked))?;
        if session.is_expired(now) {
            return Err(SecurityError::Token(TokenFailure::Expired));
        }
        session.last_used = now;

        Ok(profile)
    }

    /// Exchanges a refresh token for a new session.
    ///
    /// The refresh token is single-use; a new one is returned.
    #[tracing::instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<LoginResponse> {
        self.ensure_enabled()?;
        let now = Utc::now();

        let mut state = self.shared.state.write().await;
        let stored = state
            .refresh_tokens
            .remove(refresh_token)
            .ok_or(SecurityError::Token(TokenFailure::Revoked))?;
        if stored.expires_at <= now {
            return Err(SecurityError::Token(TokenFailure::Expired));
        }

        let user = state
            .users
            .get(&stored.user_id)
            .cloned()
            .ok_or(SecurityError::UserNotFound)?;
        if user.locked {
            return Err(denied(AuthFailure::AccountLocked));
        }
        if !user.active {
            return Err(denied(AuthFailure::AccountDisabled));
        }

        let (response, session) = self.shared.issue(&mut state, &user, now)?;
        drop(state);

        self.shared.persist_session(&session)?;
        tracing::info!(user_id = %user.id, "🔄 Session refreshed");
        Ok(response)
    }

    /// Changes a user's password after checking the current one.
    #[tracing::instrument(skip(self, current_password, new_password))]
    pub async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let current_hash = self
            .shared
            .state
            .read()
            .await
            .users
            .get(user_id)
            .map(|u| u.password_hash.clone())
            .ok_or(SecurityError::UserNotFound)?;

        if !password::verify_password(current_password, &current_hash)? {
            return Err(denied(AuthFailure::InvalidCredentials));
        }
        validate_password(new_password, &self.shared.config.password_policy)?;
        let new_hash = password::hash_password(new_password, &self.shared.config.hashing)?;

        let user = {
            let mut state = self.shared.state.write().await;
            let user = state
                .users
                .get_mut(user_id)
                .ok_or(SecurityError::UserNotFound)?;
            user.password_hash = new_hash;
            user.clone()
        };
        self.shared.persist_user(&user)?;

        tracing::info!("✅ Password changed for user: {}", user_id);
        Ok(())
    }

    /// Checks a second factor through the configured provider.
    pub fn validate_mfa(&self, user_id: &str, token: &str) -> bool {
        self.shared.mfa.validate(user_id, token)
    }

    pub async fn get_user(&self, user_id: &str) -> Result<UserProfile> {
        self.shared
            .state
            .read()
            .await
            .users
            .get(user_id)
            .map(User::profile)
            .ok_or(SecurityError::UserNotFound)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<UserProfile> {
        let state = self.shared.state.read().await;
        state
            .usernames
            .get(username)
            .and_then(|id| state.users.get(id))
            .map(User::profile)
            .ok_or(SecurityError::UserNotFound)
    }

    /// Sessions whose expiry is still ahead.
    pub async fn active_session_count(&self) -> usize {
        let now = Utc::now();
        self.shared
            .state
            .read()
            .await
            .sessions
            .values()
            .filter(|s| !s.is_expired(now))
            .count()
    }

    /// Runs the expiry sweep immediately.
    ///
    /// # Returns
    ///
    /// The number of sessions removed.
    pub async fn cleanup_expired_sessions(&self) -> Result<usize> {
        self.shared.sweep().await
    }

    pub async fn status(&self) -> Result<AuthStatus> {
        let running = self.lifecycle.is_running().await;
        let now = Utc::now();
        let state = self.shared.state.read().await;
        Ok(AuthStatus {
            enabled: self.shared.config.enabled,
            running,
            total_users: state.users.len(),
            locked_users: state.users.values().filter(|u| u.locked).count(),
            active_sessions: state.sessions.values().filter(|s| !s.is_expired(now)).count(),
            mfa_enabled: self.shared.config.mfa_enabled,
        })
    }
}
