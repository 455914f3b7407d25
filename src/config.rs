use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use garde::Validate;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::models::key::{Algorithm, KeyRetention};

/// Minimum length of the token signing secret in bytes.
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Upper bound for every configured interval and lifetime.
pub const MAX_DURATION: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

/// The security core's configuration.
#[derive(Clone, Debug, Validate)]
pub struct SecurityConfig {
    /// Master switch. When false, `start` spawns no workers.
    #[garde(skip)]
    pub enabled: bool,
    #[garde(dive)]
    pub encryption: EncryptionConfig,
    #[garde(dive)]
    pub auth: AuthConfig,
    #[garde(dive)]
    pub audit: AuditConfig,
    #[garde(skip)]
    pub access: AccessConfig,
    #[garde(dive)]
    pub monitor: MonitorConfig,
}

/// Settings for the encryption manager.
#[derive(Clone, Debug, Validate)]
pub struct EncryptionConfig {
    #[garde(skip)]
    pub enabled: bool,
    #[garde(skip)]
    pub algorithm: Algorithm,
    /// Key size in bits.
    #[garde(custom(aes_key_size))]
    pub key_size: usize,
    /// Lifetime of a key, and the period of the rotation worker.
    #[garde(custom(bounded_duration))]
    pub key_rotation: Duration,
    /// Spawn the periodic rotation worker on start.
    #[garde(skip)]
    pub auto_rotate: bool,
    #[garde(skip)]
    pub retention: KeyRetention,
}

/// Password rules enforced on account creation and password change.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct PasswordPolicy {
    #[garde(range(min = 1, max = 128))]
    pub min_length: usize,
    #[garde(range(min = 1, max = 1024))]
    pub max_length: usize,
    #[garde(skip)]
    pub require_uppercase: bool,
    #[garde(skip)]
    pub require_lowercase: bool,
    #[garde(skip)]
    pub require_digit: bool,
    #[garde(skip)]
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 128,
            require_uppercase: false,
            require_lowercase: true,
            require_digit: true,
            require_special: false,
        }
    }
}

/// Argon2id cost parameters used when hashing new passwords.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct HashingConfig {
    /// Memory cost in KiB.
    #[garde(range(min = 64))]
    pub memory_kib: u32,
    #[garde(range(min = 1))]
    pub iterations: u32,
    #[garde(range(min = 1, max = 16))]
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 3,
            parallelism: 6,
        }
    }
}

/// An administrator account created on first start.
#[derive(Clone, Validate)]
pub struct BootstrapAdmin {
    #[garde(length(min = 3, max = 255))]
    pub username: String,
    #[garde(skip)]
    pub password: Zeroizing<String>,
    #[garde(email)]
    pub email: Option<String>,
}

impl fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("email", &self.email)
            .finish()
    }
}

/// Settings for the authentication manager.
#[derive(Clone, Validate)]
pub struct AuthConfig {
    #[garde(skip)]
    pub enabled: bool,
    /// HMAC secret used to sign access tokens.
    #[garde(custom(secret_length))]
    pub jwt_secret: Zeroizing<Vec<u8>>,
    #[garde(custom(bounded_duration))]
    pub session_timeout: Duration,
    #[garde(custom(bounded_duration))]
    pub refresh_token_ttl: Duration,
    #[garde(custom(bounded_duration))]
    pub session_cleanup_interval: Duration,
    /// Consecutive failures that lock an account.
    #[garde(range(min = 1))]
    pub max_failed_logins: u32,
    /// Global MFA switch; per-user `mfa_enabled` also has to be set.
    #[garde(skip)]
    pub mfa_enabled: bool,
    #[garde(dive)]
    pub password_policy: PasswordPolicy,
    #[garde(dive)]
    pub hashing: HashingConfig,
    #[garde(dive)]
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("enabled", &self.enabled)
            .field("jwt_secret", &"<redacted>")
            .field("session_timeout", &self.session_timeout)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("session_cleanup_interval", &self.session_cleanup_interval)
            .field("max_failed_logins", &self.max_failed_logins)
            .field("mfa_enabled", &self.mfa_enabled)
            .field("password_policy", &self.password_policy)
            .field("hashing", &self.hashing)
            .field("bootstrap_admin", &self.bootstrap_admin)
            .finish()
    }
}

/// Settings for the audit logger.
#[derive(Clone, Debug, Validate)]
pub struct AuditConfig {
    #[garde(skip)]
    pub enabled: bool,
    /// Declared retention period. Nothing enforces it inside the core.
    #[garde(range(min = 1))]
    pub retention_days: u32,
}

/// Settings for the access controller.
#[derive(Clone, Debug)]
pub struct AccessConfig {
    pub enabled: bool,
}

/// Settings for the threat monitor loop.
#[derive(Clone, Debug, Validate)]
pub struct MonitorConfig {
    #[garde(skip)]
    pub enabled: bool,
    #[garde(custom(bounded_duration))]
    pub interval: Duration,
    /// Forward high and critical findings to the incident responder.
    #[garde(skip)]
    pub auto_response: bool,
    #[garde(custom(bounded_duration))]
    pub response_timeout: Duration,
}

fn bounded_duration(value: &Duration, _ctx: &()) -> garde::Result {
    if value.is_zero() {
        return Err(garde::Error::new("duration must be greater than zero"));
    }
    if *value > MAX_DURATION {
        return Err(garde::Error::new("duration must not exceed ten years"));
    }
    Ok(())
}

fn aes_key_size(value: &usize, _ctx: &()) -> garde::Result {
    if *value != 256 {
        return Err(garde::Error::new("AES-256-GCM requires a 256-bit key"));
    }
    Ok(())
}

fn secret_length(value: &Zeroizing<Vec<u8>>, _ctx: &()) -> garde::Result {
    if value.len() < MIN_JWT_SECRET_LEN {
        return Err(garde::Error::new(format!(
            "signing secret must be at least {} bytes",
            MIN_JWT_SECRET_LEN
        )));
    }
    Ok(())
}

impl SecurityConfig {
    /// Builds a configuration with default settings around a signing secret.
    ///
    /// No bootstrap admin is configured; set `auth.bootstrap_admin` explicitly.
    pub fn new(jwt_secret: Vec<u8>) -> Self {
        Self {
            enabled: true,
            encryption: EncryptionConfig {
                enabled: true,
                algorithm: Algorithm::Aes256Gcm,
                key_size: 256,
                key_rotation: Duration::from_secs(24 * 3600),
                auto_rotate: true,
                retention: KeyRetention::CurrentOnly,
            },
            auth: AuthConfig {
                enabled: true,
                jwt_secret: Zeroizing::new(jwt_secret),
                session_timeout: Duration::from_secs(24 * 3600),
                refresh_token_ttl: Duration::from_secs(7 * 24 * 3600),
                session_cleanup_interval: Duration::from_secs(3600),
                max_failed_logins: 5,
                mfa_enabled: false,
                password_policy: PasswordPolicy::default(),
                hashing: HashingConfig::default(),
                bootstrap_admin: None,
            },
            audit: AuditConfig {
                enabled: true,
                retention_days: 90,
            },
            access: AccessConfig { enabled: true },
            monitor: MonitorConfig {
                enabled: true,
                interval: Duration::from_secs(30),
                auto_response: true,
                response_timeout: Duration::from_secs(10),
            },
        }
    }

    /// Creates a new `SecurityConfig` from `SENTINEL_*` environment variables.
    ///
    /// `SENTINEL_JWT_SECRET` is required (hex, at least 32 bytes). The
    /// bootstrap admin is only created when both `SENTINEL_ADMIN_USERNAME`
    /// and `SENTINEL_ADMIN_PASSWORD` are set.
    pub fn from_env() -> Result<Self> {
        let mut secret_hex = env::var("SENTINEL_JWT_SECRET")
            .context("SENTINEL_JWT_SECRET must be set (generate with: openssl rand -hex 32)")?;

        let secret = hex::decode(&secret_hex)
            .context("SENTINEL_JWT_SECRET must be valid hexadecimal")?;

        secret_hex.zeroize();

        let mut config = Self::new(secret);

        config.enabled = env_or("SENTINEL_ENABLED", true)?;

        config.encryption.enabled = env_or("SENTINEL_ENCRYPTION_ENABLED", true)?;
        config.encryption.key_rotation =
            Duration::from_secs(env_or("SENTINEL_KEY_ROTATION_SECS", 24 * 3600)?);
        config.encryption.auto_rotate = env_or("SENTINEL_KEY_AUTO_ROTATE", true)?;
        config.encryption.retention = env_or("SENTINEL_KEY_RETENTION", KeyRetention::CurrentOnly)?;

        config.auth.enabled = env_or("SENTINEL_AUTH_ENABLED", true)?;
        config.auth.session_timeout =
            Duration::from_secs(env_or("SENTINEL_SESSION_TIMEOUT_SECS", 24 * 3600)?);
        config.auth.max_failed_logins = env_or("SENTINEL_MAX_FAILED_LOGINS", 5)?;
        config.auth.mfa_enabled = env_or("SENTINEL_MFA_ENABLED", false)?;
        config.auth.password_policy.min_length = env_or("SENTINEL_PASSWORD_MIN_LENGTH", 8)?;

        match (
            env::var("SENTINEL_ADMIN_USERNAME").ok(),
            env::var("SENTINEL_ADMIN_PASSWORD").ok(),
        ) {
            (Some(username), Some(password)) => {
                config.auth.bootstrap_admin = Some(BootstrapAdmin {
                    username,
                    password: Zeroizing::new(password),
                    email: env::var("SENTINEL_ADMIN_EMAIL").ok(),
                });
            }
            (None, None) => {}
            _ => anyhow::bail!(
                "SENTINEL_ADMIN_USERNAME and SENTINEL_ADMIN_PASSWORD must be set together"
            ),
        }

        config.audit.enabled = env_or("SENTINEL_AUDIT_ENABLED", true)?;
        config.audit.retention_days = env_or("SENTINEL_AUDIT_RETENTION_DAYS", 90)?;

        config.access.enabled = env_or("SENTINEL_ACCESS_ENABLED", true)?;

        config.monitor.enabled = env_or("SENTINEL_MONITOR_ENABLED", true)?;
        config.monitor.interval =
            Duration::from_secs(env_or("SENTINEL_MONITOR_INTERVAL_SECS", 30)?);
        config.monitor.auto_response = env_or("SENTINEL_AUTO_RESPONSE", true)?;
        config.monitor.response_timeout =
            Duration::from_secs(env_or("SENTINEL_RESPONSE_TIMEOUT_SECS", 10)?);

        Ok(config)
    }

    /// Rejects malformed settings.
    pub fn check(&self) -> crate::error::Result<()> {
        self.validate()?;
        if self.auth.password_policy.min_length > self.auth.password_policy.max_length {
            return Err(crate::error::SecurityError::Validation(
                "password policy min_length exceeds max_length".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}
