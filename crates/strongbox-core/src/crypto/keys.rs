#![forbid(unsafe_code)]

//! Symmetric key model
//!
//! A [`SymmetricCryptoKey`] owns the AES encryption key, the optional
//! HMAC-SHA256 key, and the [`EncryptionType`] tag that fixes both lengths.
//! Keys are immutable once constructed, zeroized on drop, and redacted in
//! `Debug` output.

use std::fmt;

use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::CryptoError;
use crate::envelope::{IV_LENGTH, MAC_LENGTH};

// =============================================================================
// Encryption types
// =============================================================================

/// Wire tag identifying the scheme an envelope or key uses.
///
/// The numeric values are persisted inside stored envelopes and must never
/// change:
///
/// | Tag | Scheme                                                   |
/// |-----|----------------------------------------------------------|
/// | 0   | AES-CBC-256, no MAC                                      |
/// | 1   | AES-CBC-128 + HMAC-SHA256                                |
/// | 2   | AES-CBC-256 + HMAC-SHA256                                |
/// | 3   | RSA-2048 OAEP-SHA256                                     |
/// | 4   | RSA-2048 OAEP-SHA1                                       |
/// | 5   | RSA-2048 OAEP-SHA256 + HMAC-SHA256 (retired, parse only) |
/// | 6   | RSA-2048 OAEP-SHA1 + HMAC-SHA256 (retired, parse only)   |
///
/// Tags 5 and 6 survive so that historical data still parses; new
/// encryptions never produce them and their MAC segment is not verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum EncryptionType {
    AesCbc256B64 = 0,
    AesCbc128HmacSha256B64 = 1,
    AesCbc256HmacSha256B64 = 2,
    Rsa2048OaepSha256B64 = 3,
    Rsa2048OaepSha1B64 = 4,
    Rsa2048OaepSha256HmacSha256B64 = 5,
    Rsa2048OaepSha1HmacSha256B64 = 6,
}

impl EncryptionType {
    /// True when envelopes of this type carry a 32-byte MAC segment.
    #[must_use]
    pub const fn has_mac(self) -> bool {
        matches!(
            self,
            Self::AesCbc128HmacSha256B64
                | Self::AesCbc256HmacSha256B64
                | Self::Rsa2048OaepSha256HmacSha256B64
                | Self::Rsa2048OaepSha1HmacSha256B64
        )
    }

    /// True for the AES-CBC tags, the only tags valid for symmetric keys
    /// and for the binary envelope framing.
    #[must_use]
    pub const fn is_symmetric(self) -> bool {
        matches!(
            self,
            Self::AesCbc256B64 | Self::AesCbc128HmacSha256B64 | Self::AesCbc256HmacSha256B64
        )
    }

    /// IV length in bytes for envelopes of this type. RSA envelopes carry
    /// none.
    #[must_use]
    pub const fn iv_len(self) -> usize {
        if self.is_symmetric() { IV_LENGTH } else { 0 }
    }

    /// MAC length in bytes for envelopes of this type.
    #[must_use]
    pub const fn mac_len(self) -> usize {
        if self.has_mac() { MAC_LENGTH } else { 0 }
    }
}

impl fmt::Display for EncryptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

impl From<EncryptionType> for u8 {
    fn from(value: EncryptionType) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for EncryptionType {
    type Error = CryptoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::AesCbc256B64),
            1 => Ok(Self::AesCbc128HmacSha256B64),
            2 => Ok(Self::AesCbc256HmacSha256B64),
            3 => Ok(Self::Rsa2048OaepSha256B64),
            4 => Ok(Self::Rsa2048OaepSha1B64),
            5 => Ok(Self::Rsa2048OaepSha256HmacSha256B64),
            6 => Ok(Self::Rsa2048OaepSha1HmacSha256B64),
            other => Err(CryptoError::UnsupportedEncryptionType(other)),
        }
    }
}

// =============================================================================
// Symmetric keys
// =============================================================================

/// An AES encryption key plus the optional HMAC key that authenticates
/// envelopes produced under it.
///
/// The `mac_key` is present iff the type is one of the HMAC variants; key
/// byte lengths are fixed per type. Construct with [`Self::new`] (length
/// infers the type) or [`Self::with_type`] (explicit tag).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricCryptoKey {
    enc_key: Vec<u8>,
    mac_key: Option<Vec<u8>>,
    #[zeroize(skip)]
    enc_type: EncryptionType,
}

impl SymmetricCryptoKey {
    /// Builds a key from raw material, inferring the type from its length.
    ///
    /// 32 bytes → `AesCbc256B64` (no MAC key); 48 bytes →
    /// `AesCbc128HmacSha256B64` split 16+32; 64 bytes →
    /// `AesCbc256HmacSha256B64` split 32+32.
    pub fn new(bytes: &[u8]) -> Result<Self, CryptoError> {
        let enc_type = match bytes.len() {
            32 => EncryptionType::AesCbc256B64,
            48 => EncryptionType::AesCbc128HmacSha256B64,
            64 => EncryptionType::AesCbc256HmacSha256B64,
            actual => {
                return Err(CryptoError::InvalidKeyLength {
                    expected: "32, 48, or 64",
                    actual,
                });
            }
        };
        Self::with_type(bytes, enc_type)
    }

    /// Builds a key from raw material under an explicit tag.
    ///
    /// Accepts the canonical length for each symmetric tag, plus the
    /// 32-byte (16+16) shape for `AesCbc128HmacSha256B64` that the
    /// legacy-key bridge synthesizes from a no-MAC key. RSA tags are
    /// rejected outright.
    pub fn with_type(bytes: &[u8], enc_type: EncryptionType) -> Result<Self, CryptoError> {
        use EncryptionType::{AesCbc128HmacSha256B64, AesCbc256B64, AesCbc256HmacSha256B64};

        let split = match (enc_type, bytes.len()) {
            (AesCbc256B64, 32) => 32,
            (AesCbc128HmacSha256B64, 48 | 32) => 16,
            (AesCbc256HmacSha256B64, 64) => 32,
            (AesCbc256B64, actual) => {
                return Err(CryptoError::InvalidKeyLength { expected: "32", actual });
            }
            (AesCbc128HmacSha256B64, actual) => {
                return Err(CryptoError::InvalidKeyLength { expected: "48 or 32", actual });
            }
            (AesCbc256HmacSha256B64, actual) => {
                return Err(CryptoError::InvalidKeyLength { expected: "64", actual });
            }
            (other, _) => return Err(CryptoError::UnsupportedEncryptionType(other as u8)),
        };

        let (enc_key, mac_key) = bytes.split_at(split);
        Ok(Self {
            enc_key: enc_key.to_vec(),
            mac_key: enc_type.has_mac().then(|| mac_key.to_vec()),
            enc_type,
        })
    }

    /// Generates a fresh random key of the tag's canonical length.
    pub fn generate(enc_type: EncryptionType) -> Result<Self, CryptoError> {
        use EncryptionType::{AesCbc128HmacSha256B64, AesCbc256B64, AesCbc256HmacSha256B64};

        let len = match enc_type {
            AesCbc256B64 => 32,
            AesCbc128HmacSha256B64 => 48,
            AesCbc256HmacSha256B64 => 64,
            other => return Err(CryptoError::UnsupportedEncryptionType(other as u8)),
        };
        let mut bytes = Zeroizing::new(vec![0u8; len]);
        rand::rng().fill_bytes(&mut bytes);
        Self::with_type(&bytes, enc_type)
    }

    /// The AES encryption key bytes.
    #[must_use]
    pub fn enc_key(&self) -> &[u8] {
        &self.enc_key
    }

    /// The HMAC-SHA256 key bytes, if the type carries one.
    #[must_use]
    pub fn mac_key(&self) -> Option<&[u8]> {
        self.mac_key.as_deref()
    }

    /// The tag this key encrypts under.
    #[must_use]
    pub const fn enc_type(&self) -> EncryptionType {
        self.enc_type
    }

    /// The raw key material, `encryptionKey ‖ macKey`.
    #[must_use]
    pub fn raw_key(&self) -> Zeroizing<Vec<u8>> {
        let mac_len = self.mac_key.as_ref().map_or(0, Vec::len);
        let mut raw = Vec::with_capacity(self.enc_key.len() + mac_len);
        raw.extend_from_slice(&self.enc_key);
        if let Some(mac_key) = &self.mac_key {
            raw.extend_from_slice(mac_key);
        }
        Zeroizing::new(raw)
    }

    /// Base64 of [`Self::raw_key`], the serialized form shipped across
    /// process and worker boundaries.
    #[must_use]
    pub fn to_b64(&self) -> String {
        general_purpose::STANDARD.encode(self.raw_key().as_slice())
    }

    /// Rebuilds a key from its [`Self::to_b64`] form, inferring the type
    /// from the decoded length.
    pub fn from_b64(s: &str) -> Result<Self, CryptoError> {
        if s.is_empty() {
            return Err(CryptoError::MissingKey);
        }
        let bytes = Zeroizing::new(
            general_purpose::STANDARD
                .decode(s)
                .map_err(|_| CryptoError::MissingKey)?,
        );
        Self::new(&bytes)
    }

    /// Rebuilds a key from its [`Self::to_b64`] form under an explicit tag.
    ///
    /// Required for keys in the legacy 16+16 shape, whose decoded length
    /// alone would be misread as a 32-byte no-MAC key.
    pub fn from_b64_with_type(s: &str, enc_type: EncryptionType) -> Result<Self, CryptoError> {
        if s.is_empty() {
            return Err(CryptoError::MissingKey);
        }
        let bytes = Zeroizing::new(
            general_purpose::STANDARD
                .decode(s)
                .map_err(|_| CryptoError::MissingKey)?,
        );
        Self::with_type(&bytes, enc_type)
    }
}

impl fmt::Debug for SymmetricCryptoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricCryptoKey")
            .field("enc_type", &self.enc_type)
            .field("enc_key", &"[REDACTED]")
            .field("mac_key", &self.mac_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
