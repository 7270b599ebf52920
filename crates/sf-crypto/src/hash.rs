//! Hash functions.

use crate::algorithm::DigestAlgorithm;
use aws_lc_rs::{constant_time, digest};

/// Computes a hash of the input data.
#[must_use]
pub fn hash(algorithm: DigestAlgorithm, data: &[u8]) -> Vec<u8> {
    let alg = match algorithm {
        DigestAlgorithm::Sha256 => &digest::SHA256,
        DigestAlgorithm::Sha384 => &digest::SHA384,
        DigestAlgorithm::Sha512 => &digest::SHA512,
    };

    digest::digest(alg, data).as_ref().to_vec()
}

/// Computes a SHA-256 hash of the input data.
#[must_use]
pub fn sha256(data: &[u8]) -> Vec<u8> {
    hash(DigestAlgorithm::Sha256, data)
}

/// Computes a SHA-384 hash of the input data.
#[must_use]
pub fn sha384(data: &[u8]) -> Vec<u8> {
    hash(DigestAlgorithm::Sha384, data)
}

/// Computes a SHA-512 hash of the input data.
#[must_use]
pub fn sha512(data: &[u8]) -> Vec<u8> {
    hash(DigestAlgorithm::Sha512, data)
}

/// Compares two digests in constant time.
///
/// Slices of different lengths never match.
#[must_use]
pub fn digests_match(expected: &[u8], actual: &[u8]) -> bool {
    constant_time::verify_slices_are_equal(expected, actual).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_produce_correct_length() {
        assert_eq!(sha256(b"test").len(), 32);
        assert_eq!(sha384(b"test").len(), 48);
        assert_eq!(sha512(b"test").len(), 64);
    }

    #[test]
    fn sha256_known_vector() {
        let digest = sha256(b"abc");
        assert_eq!(
            digest[..4],
            [0xba, 0x78, 0x16, 0xbf],
            "FIPS 180-2 test vector prefix"
        );
    }

    #[test]
    fn digest_comparison() {
        let digest = sha256(b"abc");
        assert!(digests_match(&digest, &sha256(b"abc")));
        assert!(!digests_match(&digest, &sha256(b"abd")));
        assert!(!digests_match(&digest, &digest[..16]));
    }

    #[test]
    fn different_inputs_produce_different_hashes() {
        assert_ne!(sha256(b"hello"), sha256(b"world"));
    }
}
