use std::collections::HashMap;
use std::sync::Arc;

use aes_gcm::Aes256Gcm;
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use zeroize::Zeroize;

use crate::config::EncryptionConfig;
use crate::crypto::{aes, token};
use crate::error::{SecurityError, Result};
use crate::models::envelope::EncryptedData;
use crate::models::key::{EncryptionKey, KeyInfo, KeyRetention};
use crate::models::status::EncryptionStatus;
use crate::store::{self, Store};
use crate::worker::{self, Lifecycle};

const KEY_PREFIX: &str = "key:";

/// Keys and the cipher instances built from them.
#[derive(Default)]
struct KeyRing {
    keys: Vec<EncryptionKey>,
    ciphers: HashMap<String, Aes256Gcm>,
    active: Option<String>,
    last_rotation: Option<DateTime<Utc>>,
}

struct EncryptionShared {
    config: EncryptionConfig,
    store: Arc<dyn Store>,
    ring: RwLock<KeyRing>,
}

/// Confidentiality and integrity for opaque byte payloads.
pub struct EncryptionManager {
    shared: Arc<EncryptionShared>,
    lifecycle: Lifecycle,
}

fn not_started() -> SecurityError {
    SecurityError::Encryption("encryption manager is not started".to_string())
}

fn decryption_failed() -> SecurityError {
    SecurityError::Encryption("decryption failed".to_string())
}

impl EncryptionShared {
    fn generate_key(&self) -> Result<EncryptionKey> {
        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(self.config.key_rotation)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| {
                SecurityError::Validation(format!(
                    "key rotation interval {:?} is out of range",
                    self.config.key_rotation
                ))
            })?;
        let mut bytes = aes::generate_key(self.config.key_size / 8);

        Ok(EncryptionKey {
            id: token::generate_id(),
            key: std::mem::take(&mut *bytes),
            algorithm: self.config.algorithm,
            created_at: now,
            expires_at,
            active: true,
        })
    }

    /// Generates a key and makes it the only active one.
    ///
    /// With `require_active`, refuses to install a key into an unloaded ring.
    /// The check runs under the write lock, so it cannot race `stop`.
    async fn rotate(&self, require_active: bool) -> Result<String> {
        let key = self.generate_key()?;
        let cipher = aes::cipher_from_key(&key.key)?;
        let key_id = key.id.clone();

        let infos = {
            let mut ring = self.ring.write().await;
            if require_active && ring.active.is_none() {
                return Err(not_started());
            }
            for old in ring.keys.iter_mut() {
                old.active = false;
                if self.config.retention == KeyRetention::CurrentOnly {
                    old.key.zeroize();
                }
            }
            if self.config.retention == KeyRetention::CurrentOnly {
                ring.ciphers.clear();
            }
            ring.ciphers.insert(key_id.clone(), cipher);
            ring.keys.push(key);
            ring.active = Some(key_id.clone());
            ring.last_rotation = Some(Utc::now());
            ring.keys.iter().map(EncryptionKey::info).collect::<Vec<_>>()
        };

        for info in &infos {
            store::put_record(self.store.as_ref(), &format!("{}{}", KEY_PREFIX, info.id), info)?;
        }

        tracing::info!(key_id = %key_id, "🔑 Encryption key rotated");
        Ok(key_id)
    }

    /// Drops every cipher and wipes all key material.
    async fn unload(&self) {
        let mut ring = self.ring.write().await;
        ring.ciphers.clear();
        ring.active = None;
        for key in ring.keys.iter_mut() {
            key.active = false;
            key.key.zeroize();
        }
    }
}

impl EncryptionManager {
    /// Creates a new `EncryptionManager`.
    ///
    /// No key exists until `start`.
    pub fn new(config: EncryptionConfig, store: Arc<dyn Store>) -> Self {
        Self {
            shared: Arc::new(EncryptionShared {
                config,
                store,
                ring: RwLock::new(KeyRing::default()),
            }),
            lifecycle: Lifecycle::new("encryption manager"),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.config.enabled
    }

    /// Creates the master key and, if configured, the rotation worker.
    pub async fn start(&self) -> Result<()> {
        let shutdown = self.lifecycle.begin_start().await?;

        if !self.shared.config.enabled {
            tracing::info!("Encryption disabled, payloads pass through unchanged");
            return Ok(());
        }

        if let Err(e) = self.shared.rotate(false).await {
            self.lifecycle.abort_start().await;
            return Err(e);
        }

        if self.shared.config.auto_rotate {
            let shared = self.shared.clone();
            let handle = worker::spawn_periodic(
                "key-rotation",
                self.shared.config.key_rotation,
                shutdown,
                move || {
                    let shared = shared.clone();
                    async move {
                        if let Err(e) = shared.rotate(true).await {
                            tracing::error!("❌ Scheduled key rotation failed: {}", e);
                        }
                    }
                },
            );
            match handle {
                Ok(handle) => self.lifecycle.attach(handle).await,
                Err(e) => {
                    self.shared.unload().await;
                    self.lifecycle.abort_start().await;
                    return Err(e);
                }
            }
        }

        tracing::info!(
            algorithm = %self.shared.config.algorithm,
            retention = ?self.shared.config.retention,
            "✅ Encryption manager started"
        );
        Ok(())
    }

    /// Stops the rotation worker and unloads every cipher.
    ///
    /// Calls already holding the read lock finish first.
    pub async fn stop(&self) -> Result<()> {
        if !self.lifecycle.stop().await? {
            return Ok(());
        }
        self.shared.unload().await;
        tracing::info!("Encryption manager stopped");
        Ok(())
    }

    /// Generates a new key without installing it.
    pub fn generate_key(&self) -> Result<EncryptionKey> {
        self.shared.generate_key()
    }

    /// Replaces the active key.
    ///
    /// Existing ciphertexts are not re-encrypted.
    ///
    /// # Returns
    ///
    /// The new key id.
    pub async fn rotate_key(&self) -> Result<String> {
        self.shared.rotate(true).await
    }

    /// Seals `plaintext` into a serialized envelope.
    ///
    /// When encryption is disabled the input is returned unchanged. Callers
    /// that require confidentiality must check `is_enabled`.
    #[tracing::instrument(skip(self, plaintext), fields(len = plaintext.len()))]
    pub async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if !self.shared.config.enabled {
            return Ok(plaintext.to_vec());
        }

        let ring = self.shared.ring.read().await;
        let key_id = ring.active.as_ref().ok_or_else(not_started)?;
        let cipher = ring.ciphers.get(key_id).ok_or_else(not_started)?;

        let algorithm = self.shared.config.algorithm;
        let created_at = Utc::now().timestamp_millis();
        let aad = EncryptedData::associated_data(key_id, algorithm, created_at);
        let (data, nonce) = aes::seal(cipher, plaintext, &aad)?;

        let envelope = EncryptedData {
            data,
            key_id: key_id.clone(),
            algorithm,
            nonce: nonce.to_vec(),
            created_at,
        };

        sonic_rs::to_vec(&envelope)
            .map_err(|e| SecurityError::Encryption(format!("envelope encoding failed: {}", e)))
    }

    /// Opens a serialized envelope produced by `encrypt`.
    ///
    /// Tampering and a wrong key produce the same error.
    #[tracing::instrument(skip(self, envelope), fields(len = envelope.len()))]
    pub async fn decrypt(&self, envelope: &[u8]) -> Result<Vec<u8>> {
        if !self.shared.config.enabled {
            return Ok(envelope.to_vec());
        }

        let ring = self.shared.ring.read().await;
        let active = ring.active.as_ref().ok_or_else(not_started)?;

        let envelope: EncryptedData =
            sonic_rs::from_slice(envelope).map_err(|_| decryption_failed())?;

        if envelope.data.len() < aes::NONCE_SIZE
            || envelope.algorithm != self.shared.config.algorithm
            || envelope.nonce.as_slice() != &envelope.data[..aes::NONCE_SIZE]
        {
            return Err(decryption_failed());
        }

        let cipher = match self.shared.config.retention {
            KeyRetention::CurrentOnly => ring.ciphers.get(active),
            KeyRetention::Historical => ring.ciphers.get(&envelope.key_id),
        }
        .ok_or_else(decryption_failed)?;

        let aad = EncryptedData::associated_data(
            &envelope.key_id,
            envelope.algorithm,
            envelope.created_at,
        );
        aes::open(cipher, &envelope.data, &aad)
    }

    /// `encrypt` followed by standard base64.
    pub async fn encrypt_string(&self, plaintext: &str) -> Result<String> {
        let sealed = self.encrypt(plaintext.as_bytes()).await?;
        Ok(general_purpose::STANDARD.encode(sealed))
    }

    /// Inverse of `encrypt_string`.
    pub async fn decrypt_string(&self, encoded: &str) -> Result<String> {
        let sealed = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| decryption_failed())?;
        let plaintext = self.decrypt(&sealed).await?;
        String::from_utf8(plaintext)
            .map_err(|_| SecurityError::Encryption("plaintext is not valid UTF-8".to_string()))
    }

    pub async fn active_key_id(&self) -> Option<String> {
        self.shared.ring.read().await.active.clone()
    }

    /// Metadata for every key ever installed, oldest first.
    pub async fn list_keys(&self) -> Vec<KeyInfo> {
        self.shared
            .ring
            .read()
            .await
            .keys
            .iter()
            .map(EncryptionKey::info)
            .collect()
    }

    /// Persisted metadata for `key_id`, including keys unloaded by rotation
    /// or `stop`.
    pub fn key_info(&self, key_id: &str) -> Result<KeyInfo> {
        store::get_record(self.shared.store.as_ref(), &format!("{}{}", KEY_PREFIX, key_id))?
            .ok_or_else(|| SecurityError::NotFound(format!("key {}", key_id)))
    }

    pub async fn status(&self) -> Result<EncryptionStatus> {
        let running = self.lifecycle.is_running().await;
        let ring = self.shared.ring.read().await;
        Ok(EncryptionStatus {
            enabled: self.shared.config.enabled,
            running,
            algorithm: self.shared.config.algorithm.to_string(),
            active_key_id: ring.active.clone(),
            key_count: ring.keys.len(),
            last_rotation: ring.last_rotation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::key::Algorithm;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn config(retention: KeyRetention) -> EncryptionConfig {
        EncryptionConfig {
            enabled: true,
            algorithm: Algorithm::Aes256Gcm,
            key_size: 256,
            key_rotation: Duration::from_secs(3600),
            auto_rotate: false,
            retention,
        }
    }

    async fn started(retention: KeyRetention) -> EncryptionManager {
        let manager = EncryptionManager::new(config(retention), Arc::new(MemoryStore::new()));
        manager.start().await.unwrap();
        manager
    }

    #[tokio::test]
    async fn test_round_trip() {
        let manager = started(KeyRetention::CurrentOnly).await;
        for plaintext in [&b""[..], &b"hello"[..], &[0u8; 4096][..]] {
            let sealed = manager.encrypt(plaintext).await.unwrap();
            assert_ne!(sealed.as_slice(), plaintext);
            assert_eq!(manager.decrypt(&sealed).await.unwrap(), plaintext);
        }
    }

    #[tokio::test]
    async fn test_nonce_freshness() {
        let manager = started(KeyRetention::CurrentOnly).await;
        let a = manager.encrypt(b"hello").await.unwrap();
        let b = manager.encrypt(b"hello").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(manager.decrypt(&a).await.unwrap(), b"hello");
        assert_eq!(manager.decrypt(&b).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_every_bit_flip_is_detected() {
        let manager = started(KeyRetention::CurrentOnly).await;
        let sealed = manager.encrypt(b"hello").await.unwrap();

        for byte in 0..sealed.len() {
            for bit in 0..8 {
                let mut tampered = sealed.clone();
                tampered[byte] ^= 1 << bit;
                let result = manager.decrypt(&tampered).await;
                assert!(
                    matches!(result, Err(SecurityError::Encryption(_))),
                    "flip at byte {} bit {} was not detected",
                    byte,
                    bit
                );
            }
        }
    }

    #[tokio::test]
    async fn test_before_start_is_error() {
        let manager =
            EncryptionManager::new(config(KeyRetention::CurrentOnly), Arc::new(MemoryStore::new()));
        assert!(matches!(
            manager.encrypt(b"x").await,
            Err(SecurityError::Encryption(_))
        ));
        assert!(matches!(
            manager.decrypt(b"{}").await,
            Err(SecurityError::Encryption(_))
        ));
        assert!(manager.rotate_key().await.is_err());
    }

    #[tokio::test]
    async fn test_disabled_passes_through() {
        let mut cfg = config(KeyRetention::CurrentOnly);
        cfg.enabled = false;
        let manager = EncryptionManager::new(cfg, Arc::new(MemoryStore::new()));
        assert_eq!(manager.encrypt(b"plain").await.unwrap(), b"plain");
        assert_eq!(manager.decrypt(b"plain").await.unwrap(), b"plain");
    }

    #[tokio::test]
    async fn test_rotation_current_only() {
        let manager = started(KeyRetention::CurrentOnly).await;
        let first = manager.active_key_id().await.unwrap();
        let sealed = manager.encrypt(b"before").await.unwrap();

        let second = manager.rotate_key().await.unwrap();
        assert_ne!(first, second);

        assert!(matches!(
            manager.decrypt(&sealed).await,
            Err(SecurityError::Encryption(_))
        ));

        let keys = manager.list_keys().await;
        assert_eq!(keys.len(), 2);
        assert_eq!(keys.iter().filter(|k| k.active).count(), 1);
        assert!(keys.iter().any(|k| k.id == second && k.active));
    }

    #[tokio::test]
    async fn test_rotation_historical() {
        let manager = started(KeyRetention::Historical).await;
        let sealed = manager.encrypt(b"before").await.unwrap();
        manager.rotate_key().await.unwrap();
        manager.rotate_key().await.unwrap();

        assert_eq!(manager.decrypt(&sealed).await.unwrap(), b"before");
        let fresh = manager.encrypt(b"after").await.unwrap();
        assert_eq!(manager.decrypt(&fresh).await.unwrap(), b"after");
        assert_eq!(manager.list_keys().await.iter().filter(|k| k.active).count(), 1);
    }

    #[tokio::test]
    async fn test_string_helpers() {
        let manager = started(KeyRetention::CurrentOnly).await;
        let encoded = manager.encrypt_string("secret text").await.unwrap();
        assert_eq!(manager.decrypt_string(&encoded).await.unwrap(), "secret text");
        assert!(manager.decrypt_string("%%%not base64").await.is_err());
    }

    #[tokio::test]
    async fn test_generate_key_shape() {
        let manager = started(KeyRetention::CurrentOnly).await;
        let key = manager.generate_key().unwrap();
        assert_eq!(key.key.len(), 32);
        assert!(key.expires_at > key.created_at);
        assert_ne!(Some(key.id.clone()), manager.active_key_id().await);
    }

    #[tokio::test]
    async fn test_stop_unloads_cipher() {
        let manager = started(KeyRetention::CurrentOnly).await;
        manager.stop().await.unwrap();
        manager.stop().await.unwrap();
        assert!(manager.encrypt(b"x").await.is_err());
        let status = manager.status().await.unwrap();
        assert!(!status.running);
        assert!(status.active_key_id.is_none());
    }

    #[tokio::test]
    async fn test_short_ciphertext_matches_tamper_error() {
        let manager = started(KeyRetention::CurrentOnly).await;
        let sealed = manager.encrypt(b"hello").await.unwrap();
        let mut envelope: EncryptedData = sonic_rs::from_slice(&sealed).unwrap();

        let mut tampered = envelope.clone();
        let last = tampered.data.len() - 1;
        tampered.data[last] ^= 1;
        let tampered = sonic_rs::to_vec(&tampered).unwrap();

        envelope.data.truncate(4);
        envelope.nonce.truncate(4);
        let short = sonic_rs::to_vec(&envelope).unwrap();

        let tampered_err = manager.decrypt(&tampered).await.unwrap_err().to_string();
        let short_err = manager.decrypt(&short).await.unwrap_err().to_string();
        assert_eq!(short_err, tampered_err);
        assert_eq!(short_err, decryption_failed().to_string());
    }

    #[tokio::test]
    async fn test_rotate_after_stop_is_rejected() {
        let manager = started(KeyRetention::CurrentOnly).await;
        manager.stop().await.unwrap();

        assert!(matches!(
            manager.rotate_key().await,
            Err(SecurityError::Encryption(_))
        ));
        assert!(manager.active_key_id().await.is_none());
        assert!(manager.encrypt(b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_out_of_range_rotation_interval_fails_start() {
        let mut cfg = config(KeyRetention::CurrentOnly);
        cfg.key_rotation = Duration::from_secs(1_000_000_000_000_000);
        let manager = EncryptionManager::new(cfg, Arc::new(MemoryStore::new()));

        assert!(matches!(manager.generate_key(), Err(SecurityError::Validation(_))));
        assert!(matches!(manager.start().await, Err(SecurityError::Validation(_))));
        assert!(!manager.status().await.unwrap().running);
    }

    #[tokio::test]
    async fn test_zero_rotation_interval_fails_start() {
        let mut cfg = config(KeyRetention::CurrentOnly);
        cfg.key_rotation = Duration::ZERO;
        cfg.auto_rotate = true;
        let manager = EncryptionManager::new(cfg, Arc::new(MemoryStore::new()));

        assert!(matches!(manager.start().await, Err(SecurityError::Validation(_))));
        let status = manager.status().await.unwrap();
        assert!(!status.running);
        assert!(status.active_key_id.is_none());
    }

    #[tokio::test]
    async fn test_key_info_survives_rotation() {
        let manager = started(KeyRetention::CurrentOnly).await;
        let first = manager.active_key_id().await.unwrap();
        let second = manager.rotate_key().await.unwrap();

        assert!(!manager.key_info(&first).unwrap().active);
        assert!(manager.key_info(&second).unwrap().active);
        assert!(matches!(
            manager.key_info("missing"),
            Err(SecurityError::NotFound(_))
        ));
    }
}
