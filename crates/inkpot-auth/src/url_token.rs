//! One-time URL token generation
//!
//! Opaque random tokens embedded in emailed links for address
//! verification and password reset. They carry no claims; the paired
//! database record supplies ownership and the validity window.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;

/// Bytes of entropy per token
const TOKEN_BYTES: usize = 32;

/// Generate a cryptographically secure one-time token.
///
/// 256 bits from the thread-local CSPRNG, base64url-encoded without
/// padding so the value drops into a link unescaped.
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    let token_bytes: [u8; TOKEN_BYTES] = rng.gen();
    URL_SAFE_NO_PAD.encode(token_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_length_and_charset() {
        let token = generate();
        // 32 bytes -> 43 base64url characters, no padding
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = generate();
        let b = generate();
        assert_ne!(a, b);
    }
}
