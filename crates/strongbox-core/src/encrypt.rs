#![forbid(unsafe_code)]

//! Envelope encryption service
//!
//! [`EncryptService`] orchestrates AES-CBC + HMAC-SHA256 envelope
//! encryption (encrypt-then-MAC over `iv ‖ ciphertext`) and RSA-OAEP
//! envelopes, on top of a pluggable [`CryptoProvider`].
//!
//! Decryption distinguishes two failure classes. Structural problems in the
//! caller's input (no key, no data) are errors. Integrity problems (MAC
//! mismatch, key/envelope type mismatch, padding failure, non-UTF-8 output)
//! are an `Ok(None)` result: corrupted and foreign-keyed data is an
//! expected condition, and callers branch on "cannot decrypt" rather than
//! catching errors.

use std::borrow::Cow;
use std::sync::Arc;

use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

use crate::crypto::{
    CryptoError, CryptoProvider, EncryptionType, RsaHash, StdCrypto, SymmetricCryptoKey,
};
use crate::envelope::{EncBytes, EncString, IV_LENGTH};

/// Envelope encryption over a [`CryptoProvider`].
///
/// Purely computational: no shared mutable state, so one instance may be
/// shared freely across threads.
pub struct EncryptService {
    crypto: Arc<dyn CryptoProvider>,
    log_mac_failures: bool,
}

impl EncryptService {
    /// Builds a service over `crypto`.
    ///
    /// `log_mac_failures` chooses the log level for MAC verification
    /// failures: `warn` when set, `debug` otherwise. Callers that routinely
    /// probe-decrypt with candidate keys keep this off.
    #[must_use]
    pub fn new(crypto: Arc<dyn CryptoProvider>, log_mac_failures: bool) -> Self {
        Self { crypto, log_mac_failures }
    }

    // =========================================================================
    // Symmetric encryption
    // =========================================================================

    /// Encrypts a UTF-8 string into a string-framed envelope.
    pub fn encrypt(&self, plain: &str, key: &SymmetricCryptoKey) -> Result<EncString, CryptoError> {
        self.encrypt_bytes(plain.as_bytes(), key)
    }

    /// Encrypts raw bytes into a string-framed envelope.
    #[instrument(level = "debug", skip_all, fields(enc_type = %key.enc_type(), len = plain.len()))]
    pub fn encrypt_bytes(
        &self,
        plain: &[u8],
        key: &SymmetricCryptoKey,
    ) -> Result<EncString, CryptoError> {
        let (iv, data, mac) = self.aes_encrypt_parts(plain, key)?;
        EncString::from_parts(key.enc_type(), Some(iv.as_slice()), data, mac.as_deref())
    }

    /// Encrypts raw bytes into a binary-framed envelope.
    #[instrument(level = "debug", skip_all, fields(enc_type = %key.enc_type(), len = plain.len()))]
    pub fn encrypt_to_bytes(
        &self,
        plain: &[u8],
        key: &SymmetricCryptoKey,
    ) -> Result<EncBytes, CryptoError> {
        let (iv, data, mac) = self.aes_encrypt_parts(plain, key)?;
        EncBytes::from_parts(key.enc_type(), &iv, data, mac.as_deref())
    }

    /// Decrypts a string-framed envelope to a UTF-8 string.
    ///
    /// `Ok(None)` when the envelope cannot be decrypted under `key` or the
    /// plaintext is not valid UTF-8.
    pub fn decrypt_to_utf8(
        &self,
        enc: &EncString,
        key: &SymmetricCryptoKey,
    ) -> Result<Option<String>, CryptoError> {
        match self.decrypt_bytes(enc, key)? {
            Some(plain) => match String::from_utf8(plain) {
                Ok(text) => Ok(Some(text)),
                Err(_) => {
                    debug!("decrypted payload is not valid utf-8");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Decrypts a string-framed envelope to raw bytes.
    ///
    /// `Ok(None)` when the envelope cannot be decrypted under `key`.
    #[instrument(level = "debug", skip_all, fields(enc_type = %enc.enc_type()))]
    pub fn decrypt_bytes(
        &self,
        enc: &EncString,
        key: &SymmetricCryptoKey,
    ) -> Result<Option<Vec<u8>>, CryptoError> {
        if enc.data().is_empty() {
            return Err(CryptoError::MissingInput("decryption"));
        }
        let Some(iv) = enc.iv() else {
            // RSA-framed string handed to the symmetric path.
            debug!("envelope type carries no IV, cannot symmetric-decrypt");
            return Ok(None);
        };
        self.aes_decrypt_parts(enc.enc_type(), iv, enc.mac(), enc.data(), key)
    }

    /// Decrypts a binary-framed envelope to raw bytes.
    ///
    /// `Ok(None)` when the envelope cannot be decrypted under `key`.
    #[instrument(level = "debug", skip_all, fields(enc_type = %enc.enc_type()))]
    pub fn decrypt_to_bytes(
        &self,
        enc: &EncBytes,
        key: &SymmetricCryptoKey,
    ) -> Result<Option<Vec<u8>>, CryptoError> {
        self.aes_decrypt_parts(enc.enc_type(), enc.iv(), enc.mac(), enc.data(), key)
    }

    /// Reinterprets a no-MAC key for an envelope framed under the legacy
    /// HMAC-128 tag: the same 32 raw bytes, split 16+16 into encryption and
    /// MAC halves.
    ///
    /// This is a compatibility bridge for historical data, deliberately a
    /// separate call; the decrypt methods never apply it implicitly. Any
    /// other key/envelope combination is returned unchanged.
    pub fn resolve_legacy_key<'a>(
        &self,
        key: &'a SymmetricCryptoKey,
        enc_type: EncryptionType,
    ) -> Result<Cow<'a, SymmetricCryptoKey>, CryptoError> {
        if enc_type == EncryptionType::AesCbc128HmacSha256B64
            && key.enc_type() == EncryptionType::AesCbc256B64
        {
            debug!("bridging no-MAC key to the legacy 16+16 shape");
            let legacy = SymmetricCryptoKey::with_type(
                key.enc_key(),
                EncryptionType::AesCbc128HmacSha256B64,
            )?;
            return Ok(Cow::Owned(legacy));
        }
        Ok(Cow::Borrowed(key))
    }

    /// True iff `s` is structurally a serialized string envelope. See
    /// [`EncString::is_serialized_enc_string`].
    #[must_use]
    pub fn string_is_enc_string(&self, s: &str) -> bool {
        EncString::is_serialized_enc_string(s)
    }

    // =========================================================================
    // RSA encryption
    // =========================================================================

    /// Encrypts `data` under a DER-encoded (SPKI) public key, producing an
    /// OAEP-SHA1 envelope, the tag clients exchange with each other.
    #[instrument(level = "debug", skip_all, fields(len = data.len()))]
    pub fn rsa_encrypt(
        &self,
        data: &[u8],
        public_key_der: &[u8],
    ) -> Result<EncString, CryptoError> {
        if data.is_empty() {
            return Err(CryptoError::MissingInput("rsa encryption"));
        }
        if public_key_der.is_empty() {
            return Err(CryptoError::MissingKey);
        }
        let ciphertext = self.crypto.rsa_encrypt(data, public_key_der, RsaHash::Sha1)?;
        EncString::from_parts(EncryptionType::Rsa2048OaepSha1B64, None, ciphertext, None)
    }

    /// Decrypts an RSA envelope under a DER-encoded (PKCS#8) private key.
    ///
    /// The tag selects the OAEP hash; the retired MAC-carrying tags decrypt
    /// with their MAC segment ignored. AES tags are rejected with
    /// [`CryptoError::UnsupportedEncryptionType`].
    #[instrument(level = "debug", skip_all, fields(enc_type = %enc.enc_type()))]
    pub fn rsa_decrypt(
        &self,
        enc: &EncString,
        private_key_der: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if private_key_der.is_empty() {
            return Err(CryptoError::MissingKey);
        }
        let hash = match enc.enc_type() {
            EncryptionType::Rsa2048OaepSha256B64
            | EncryptionType::Rsa2048OaepSha256HmacSha256B64 => RsaHash::Sha256,
            EncryptionType::Rsa2048OaepSha1B64 | EncryptionType::Rsa2048OaepSha1HmacSha256B64 => {
                RsaHash::Sha1
            }
            symmetric => {
                return Err(CryptoError::UnsupportedEncryptionType(symmetric as u8));
            }
        };
        if enc.data().is_empty() {
            return Err(CryptoError::MissingInput("rsa decryption"));
        }
        self.crypto.rsa_decrypt(enc.data(), private_key_der, hash)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn aes_encrypt_parts(
        &self,
        plain: &[u8],
        key: &SymmetricCryptoKey,
    ) -> Result<(Vec<u8>, Vec<u8>, Option<Vec<u8>>), CryptoError> {
        let iv = self.crypto.random_bytes(IV_LENGTH);
        let data = self.crypto.aes_encrypt(plain, &iv, key.enc_key())?;
        let mac = match key.mac_key() {
            Some(mac_key) => Some(self.mac_over(&iv, &data, mac_key)),
            None => None,
        };
        Ok((iv, data, mac))
    }

    fn aes_decrypt_parts(
        &self,
        enc_type: EncryptionType,
        iv: &[u8],
        mac: Option<&[u8; 32]>,
        data: &[u8],
        key: &SymmetricCryptoKey,
    ) -> Result<Option<Vec<u8>>, CryptoError> {
        if data.is_empty() {
            return Err(CryptoError::MissingInput("decryption"));
        }
        // MAC presence must agree on both sides before anything else.
        if key.mac_key().is_some() != mac.is_some() {
            debug!("MAC presence mismatch between key and envelope");
            return Ok(None);
        }
        // Strict tag equality; the legacy bridge is explicit, never implied.
        if key.enc_type() != enc_type {
            debug!(
                key_type = %key.enc_type(),
                envelope_type = %enc_type,
                "encryption type mismatch"
            );
            return Ok(None);
        }
        if let (Some(mac_key), Some(expected_mac)) = (key.mac_key(), mac) {
            let computed = self.mac_over(iv, data, mac_key);
            if !self.crypto.compare(&computed, expected_mac) {
                if self.log_mac_failures {
                    warn!("MAC verification failed, data corrupted or foreign-keyed");
                } else {
                    debug!("MAC verification failed");
                }
                return Ok(None);
            }
        }
        let plain = self.crypto.aes_decrypt(data, iv, key.enc_key())?;
        if plain.is_none() {
            debug!("padding check failed after decrypt");
        }
        Ok(plain)
    }

    /// HMAC-SHA256 over `iv ‖ data` — the authenticated portion of every
    /// MAC-bearing envelope.
    fn mac_over(&self, iv: &[u8], data: &[u8], mac_key: &[u8]) -> Vec<u8> {
        let mut macable = Zeroizing::new(Vec::with_capacity(iv.len() + data.len()));
        macable.extend_from_slice(iv);
        macable.extend_from_slice(data);
        self.crypto.hmac_sha256(&macable, mac_key)
    }
}

impl Default for EncryptService {
    /// A service over [`StdCrypto`] that logs MAC failures at `warn`.
    fn default() -> Self {
        Self::new(Arc::new(StdCrypto), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> EncryptService {
        EncryptService::default()
    }

    fn key(enc_type: EncryptionType) -> SymmetricCryptoKey {
        SymmetricCryptoKey::generate(enc_type).unwrap()
    }

    #[test]
    fn test_string_round_trip_all_key_types() {
        let service = service();
        for enc_type in [
            EncryptionType::AesCbc256B64,
            EncryptionType::AesCbc128HmacSha256B64,
            EncryptionType::AesCbc256HmacSha256B64,
        ] {
            let key = key(enc_type);
            let envelope = service.encrypt("vault item name", &key).unwrap();
            assert_eq!(envelope.enc_type(), enc_type);
            let plain = service.decrypt_to_utf8(&envelope, &key).unwrap();
            assert_eq!(plain.as_deref(), Some("vault item name"));
        }
    }

    #[test]
    fn test_empty_plaintext_round_trips() {
        let service = service();
        let key = key(EncryptionType::AesCbc256HmacSha256B64);
        let envelope = service.encrypt("", &key).unwrap();
        // PKCS7 always emits at least one block.
        assert_eq!(envelope.data().len(), 16);
        assert_eq!(service.decrypt_to_utf8(&envelope, &key).unwrap().as_deref(), Some(""));
    }

    #[test]
    fn test_foreign_key_yields_none() {
        let service = service();
        let key_a = key(EncryptionType::AesCbc256HmacSha256B64);
        let key_b = key(EncryptionType::AesCbc256HmacSha256B64);
        let envelope = service.encrypt("secret", &key_a).unwrap();
        assert_eq!(service.decrypt_to_utf8(&envelope, &key_b).unwrap(), None);
    }

    #[test]
    fn test_type_mismatch_yields_none() {
        let service = service();
        let mac_key = key(EncryptionType::AesCbc256HmacSha256B64);
        let plain_key = key(EncryptionType::AesCbc256B64);
        let envelope = service.encrypt("secret", &mac_key).unwrap();
        // MAC presence disagrees.
        assert_eq!(service.decrypt_to_utf8(&envelope, &plain_key).unwrap(), None);

        // Same MAC presence, different tag: 128 vs 256 HMAC variants.
        let key_128 = key(EncryptionType::AesCbc128HmacSha256B64);
        let envelope = service.encrypt("secret", &key_128).unwrap();
        assert_eq!(service.decrypt_to_utf8(&envelope, &mac_key).unwrap(), None);
    }

    #[test]
    fn test_rsa_string_handed_to_symmetric_decrypt_yields_none() {
        use base64::{Engine as _, engine::general_purpose};

        let service = service();
        let key = key(EncryptionType::AesCbc256HmacSha256B64);
        let envelope: EncString = format!("4.{}", general_purpose::STANDARD.encode([1u8; 256]))
            .parse()
            .unwrap();
        assert_eq!(service.decrypt_bytes(&envelope, &key).unwrap(), None);
    }

    #[test]
    fn test_non_utf8_plaintext_yields_none_for_utf8_decrypt() {
        let service = service();
        let key = key(EncryptionType::AesCbc256HmacSha256B64);
        let envelope = service.encrypt_bytes(&[0xFF, 0xFE, 0x80], &key).unwrap();
        assert_eq!(service.decrypt_to_utf8(&envelope, &key).unwrap(), None);
        // The bytes themselves still come back.
        assert_eq!(
            service.decrypt_bytes(&envelope, &key).unwrap().as_deref(),
            Some(&[0xFF, 0xFE, 0x80][..])
        );
    }

    #[test]
    fn test_resolve_legacy_key_bridges_only_the_legacy_pair() {
        let service = service();
        let no_mac = key(EncryptionType::AesCbc256B64);

        let bridged = service
            .resolve_legacy_key(&no_mac, EncryptionType::AesCbc128HmacSha256B64)
            .unwrap();
        assert!(matches!(bridged, Cow::Owned(_)));
        assert_eq!(bridged.enc_type(), EncryptionType::AesCbc128HmacSha256B64);
        assert_eq!(bridged.enc_key(), &no_mac.enc_key()[..16]);
        assert_eq!(bridged.mac_key().unwrap(), &no_mac.enc_key()[16..]);

        // Everything else passes through untouched.
        let same = service
            .resolve_legacy_key(&no_mac, EncryptionType::AesCbc256B64)
            .unwrap();
        assert!(matches!(same, Cow::Borrowed(_)));
        let mac_key = key(EncryptionType::AesCbc256HmacSha256B64);
        let same = service
            .resolve_legacy_key(&mac_key, EncryptionType::AesCbc128HmacSha256B64)
            .unwrap();
        assert!(matches!(same, Cow::Borrowed(_)));
    }

    #[test]
    fn test_legacy_bridge_round_trip() {
        let service = service();
        // Data written under the legacy shape of a key now held as no-MAC.
        let stored = key(EncryptionType::AesCbc256B64);
        let legacy_form = SymmetricCryptoKey::with_type(
            stored.enc_key(),
            EncryptionType::AesCbc128HmacSha256B64,
        )
        .unwrap();
        let envelope = service.encrypt("old data", &legacy_form).unwrap();

        // Without the bridge: type mismatch, no result.
        assert_eq!(service.decrypt_to_utf8(&envelope, &stored).unwrap(), None);

        // With the explicit bridge.
        let resolved = service
            .resolve_legacy_key(&stored, envelope.enc_type())
            .unwrap();
        assert_eq!(
            service.decrypt_to_utf8(&envelope, &resolved).unwrap().as_deref(),
            Some("old data")
        );
    }

    #[test]
    fn test_rsa_guards() {
        let service = service();
        assert!(matches!(
            service.rsa_encrypt(b"", b"key").unwrap_err(),
            CryptoError::MissingInput(_)
        ));
        assert!(matches!(
            service.rsa_encrypt(b"data", b"").unwrap_err(),
            CryptoError::MissingKey
        ));
        let aes_envelope = service
            .encrypt("x", &key(EncryptionType::AesCbc256HmacSha256B64))
            .unwrap();
        assert!(matches!(
            service.rsa_decrypt(&aes_envelope, b"key").unwrap_err(),
            CryptoError::UnsupportedEncryptionType(2)
        ));
        assert!(matches!(
            service.rsa_decrypt(&aes_envelope, b"").unwrap_err(),
            CryptoError::MissingKey
        ));
    }
}
