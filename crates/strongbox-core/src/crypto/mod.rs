//! Key model and primitive provider for Strongbox envelope encryption

pub mod keys;
pub mod primitives;

use thiserror::Error;

/// Errors that can occur while handling keys and envelopes.
///
/// # Classification
///
/// Every variant here is a **caller-input error**: synchronously detectable
/// and surfaced immediately. Integrity failures on decrypt (MAC mismatch,
/// key/envelope type mismatch, bad padding) are deliberately *not* errors:
/// decryption reports them as an absent result, because corrupted or
/// foreign-keyed data is an expected condition callers branch on.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// No usable encryption key was supplied for the operation.
    ///
    /// Also raised for key material that cannot be decoded at all (bad
    /// base64, undecodable DER): an unreadable key is no key.
    #[error("no encryption key provided")]
    MissingKey,

    /// No payload was supplied where one is required.
    #[error("no data provided for {0}")]
    MissingInput(&'static str),

    /// Key material has a length the key type does not accept.
    #[error("invalid key length: expected {expected}, got {actual} bytes")]
    InvalidKeyLength { expected: &'static str, actual: usize },

    /// An envelope failed structural parsing.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(&'static str),

    /// The encryption type is unknown, or known but invalid for the
    /// operation (an AES tag handed to RSA decryption, an RSA tag handed to
    /// the symmetric key model).
    #[error("unsupported encryption type {0}")]
    UnsupportedEncryptionType(u8),

    /// An RSA-OAEP operation failed outright, e.g. the payload exceeds the
    /// modulus capacity or the ciphertext does not decrypt under this key.
    #[error("rsa operation failed: {0}")]
    Rsa(&'static str),
}

// Re-export commonly used types
pub use keys::{EncryptionType, SymmetricCryptoKey};
pub use primitives::{CryptoProvider, RsaHash, StdCrypto};
