//! Cryptographically secure random values.
//!
//! Used for RelayState tokens, transient NameIDs and anything else a peer
//! must not be able to guess.

use base64::Engine;
use rand::distr::{Alphanumeric, SampleString};
use rand::Rng;

/// Byte length of a RelayState token (256 bits).
pub const RELAY_TOKEN_BYTES: usize = 32;

/// Generates a cryptographically secure random byte array.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

/// Generates a random string of `len` alphanumeric characters.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    let mut rng = rand::rng();
    Alphanumeric.sample_string(&mut rng, len)
}

/// Generates a URL-safe base64-encoded random string.
///
/// The output is unpadded and about 4/3 of `byte_len` characters long.
#[must_use]
pub fn random_base64url(byte_len: usize) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes(byte_len))
}

/// Generates an opaque RelayState token.
///
/// The token is 43 URL-safe characters and can travel in a query string
/// without escaping.
#[must_use]
pub fn generate_relay_token() -> String {
    random_base64url(RELAY_TOKEN_BYTES)
}

/// Generates a value for a transient NameID.
#[must_use]
pub fn generate_transient_id() -> String {
    format!("_{}", random_alphanumeric(40))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn random_bytes_produces_correct_length() {
        assert_eq!(random_bytes(16).len(), 16);
        assert_eq!(random_bytes(32).len(), 32);
    }

    #[test]
    fn relay_token_is_url_safe_and_long_enough() {
        let token = generate_relay_token();
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn relay_tokens_are_unique() {
        let tokens: HashSet<String> = (0..1000).map(|_| generate_relay_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn transient_ids_are_valid_ncnames() {
        let id = generate_transient_id();
        assert!(id.starts_with('_'));
        assert_eq!(id.len(), 41);
        assert_ne!(id, generate_transient_id());
    }
}
