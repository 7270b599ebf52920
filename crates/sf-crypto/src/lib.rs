//! # sf-crypto
//!
//! Cryptographic operations for SAML federation using aws-lc-rs.
//!
//! The rest of the workspace never touches key material directly. It talks
//! to a [`CryptoCapability`], which signs with the local key and verifies
//! with certificates taken from partner metadata.
//!
//! Supported XML-DSig signature methods are ECDSA (P-256 and P-384) and
//! RSA PKCS#1 v1.5, always with SHA-2 digests.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod algorithm;
pub mod capability;
pub mod certificate;
pub mod hash;
pub mod keys;
pub mod random;

pub use algorithm::{DigestAlgorithm, SignatureAlgorithm};
pub use capability::{CryptoCapability, CryptoError, CryptoResult};
pub use certificate::{Certificate, PublicKeyKind};
pub use hash::{sha256, sha384, sha512};
pub use keys::{KeyPairCapability, SigningKey};
