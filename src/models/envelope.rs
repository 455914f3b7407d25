use serde::{Deserialize, Serialize};

use crate::models::key::Algorithm;

/// The serialized unit produced by `encrypt`.
///
/// `data` is `nonce || ciphertext`. `nonce` repeats the prefix and must
/// match it. `key_id`, `algorithm` and `created_at` are bound to the
/// ciphertext as associated data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    pub data: Vec<u8>,
    pub key_id: String,
    pub algorithm: Algorithm,
    pub nonce: Vec<u8>,
    /// Unix milliseconds.
    pub created_at: i64,
}

impl EncryptedData {
    /// Associated data covering the envelope metadata.
    pub fn associated_data(key_id: &str, algorithm: Algorithm, created_at: i64) -> Vec<u8> {
        format!("{}|{}|{}", key_id, algorithm.as_str(), created_at).into_bytes()
    }
}
