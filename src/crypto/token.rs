use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use rand::rngs::OsRng;

/// The size of an opaque token in bytes.
const TOKEN_SIZE: usize = 32;

/// Generates a new random opaque token.
///
/// # Returns
///
/// A URL-safe base64-encoded token carrying 256 bits of entropy.
pub fn generate_token() -> String {
    let mut token = [0u8; TOKEN_SIZE];
    OsRng.fill_bytes(&mut token);

    general_purpose::URL_SAFE_NO_PAD.encode(token)
}

/// Generates a random record identifier.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), 43);
        assert!(general_purpose::URL_SAFE_NO_PAD.decode(&token).is_ok());
        assert_ne!(token, generate_token());
    }
}
