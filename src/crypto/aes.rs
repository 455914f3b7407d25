use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use aes_gcm::aead::rand_core::RngCore;
use zeroize::Zeroizing;
use crate::error::{SecurityError, Result};

/// The size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// The size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Generates `len` random key bytes, wiped on drop.
pub fn generate_key(len: usize) -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(vec![0u8; len]);
    OsRng.fill_bytes(&mut key);
    key
}

/// Generates a new random AES-GCM nonce.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Builds an AES-256-GCM instance from raw key bytes.
pub fn cipher_from_key(key: &[u8]) -> Result<Aes256Gcm> {
    if key.len() != KEY_SIZE {
        return Err(SecurityError::Encryption(format!(
            "invalid key size: expected {} bytes, got {}",
            KEY_SIZE,
            key.len()
        )));
    }
    Aes256Gcm::new_from_slice(key)
        .map_err(|e| SecurityError::Encryption(format!("Invalid key: {}", e)))
}

/// Seals `plaintext` under a fresh nonce.
///
/// # Returns
///
/// `nonce || ciphertext` and the nonce on its own.
pub fn seal(cipher: &Aes256Gcm, plaintext: &[u8], aad: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_SIZE])> {
    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|e| SecurityError::Encryption(format!("Encryption failed: {}", e)))?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);

    Ok((sealed, nonce_bytes))
}

/// Opens `nonce || ciphertext`.
///
/// Every failure maps to the same error so callers cannot tell a tampered
/// payload from a wrong key.
pub fn open(cipher: &Aes256Gcm, sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_SIZE {
        return Err(decryption_failed());
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad })
        .map_err(|_| decryption_failed())
}

fn decryption_failed() -> SecurityError {
    SecurityError::Encryption("decryption failed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let key = generate_key(KEY_SIZE);
        let cipher = cipher_from_key(&key).unwrap();
        let (sealed, nonce) = seal(&cipher, b"payload", b"aad").unwrap();
        assert_eq!(&sealed[..NONCE_SIZE], &nonce);
        assert_eq!(open(&cipher, &sealed, b"aad").unwrap(), b"payload");
    }

    #[test]
    fn test_wrong_aad_rejected() {
        let key = generate_key(KEY_SIZE);
        let cipher = cipher_from_key(&key).unwrap();
        let (sealed, _) = seal(&cipher, b"payload", b"aad").unwrap();
        assert!(open(&cipher, &sealed, b"other").is_err());
    }

    #[test]
    fn test_short_input_rejected() {
        let key = generate_key(KEY_SIZE);
        let cipher = cipher_from_key(&key).unwrap();
        let short = open(&cipher, &[0u8; 4], b"").unwrap_err().to_string();
        let (mut sealed, _) = seal(&cipher, b"payload", b"aad").unwrap();
        sealed[NONCE_SIZE] ^= 1;
        let tampered = open(&cipher, &sealed, b"aad").unwrap_err().to_string();
        assert_eq!(short, tampered);
    }

    #[test]
    fn test_bad_key_size() {
        assert!(cipher_from_key(&[0u8; 16]).is_err());
    }
}
