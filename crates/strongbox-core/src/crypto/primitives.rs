//! Crypto primitive provider
//!
//! [`CryptoProvider`] is the seam between the envelope service and the raw
//! primitives: randomness, AES-CBC with PKCS7 padding, HMAC-SHA256,
//! constant-time comparison, and RSA-OAEP. [`StdCrypto`] is the default
//! implementation. The service layer never touches a cipher directly, so
//! alternative providers (hardware-backed, FIPS builds) slot in behind this
//! trait.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use rand::RngCore;
use ring::hmac;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::CryptoError;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Hash used inside RSA-OAEP padding.
///
/// SHA-1 is what envelopes exchanged between clients use; SHA-256 exists
/// for two historical tags that are still decryptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaHash {
    Sha1,
    Sha256,
}

/// The primitive operations the envelope service is built on.
///
/// Implementations must be stateless with respect to calls: every method is
/// a pure function of its inputs (plus fresh randomness), so a single
/// provider instance may serve any number of threads.
pub trait CryptoProvider: Send + Sync {
    /// Fills a fresh buffer with `n` cryptographically secure random bytes.
    fn random_bytes(&self, n: usize) -> Vec<u8>;

    /// AES-CBC-PKCS7 encryption. Key length selects AES-128 (16 bytes) or
    /// AES-256 (32 bytes).
    fn aes_encrypt(&self, data: &[u8], iv: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// AES-CBC-PKCS7 decryption. Returns `None` when the ciphertext does
    /// not decrypt cleanly under this key (block shape or padding failure);
    /// that is a "cannot decrypt" outcome, not an error.
    fn aes_decrypt(
        &self,
        data: &[u8],
        iv: &[u8],
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, CryptoError>;

    /// HMAC-SHA256 of `data` under `key`. Always 32 bytes.
    fn hmac_sha256(&self, data: &[u8], key: &[u8]) -> Vec<u8>;

    /// Constant-time equality. False for slices of different lengths.
    fn compare(&self, a: &[u8], b: &[u8]) -> bool;

    /// RSA-OAEP encryption under a DER-encoded (SPKI) public key.
    fn rsa_encrypt(
        &self,
        data: &[u8],
        public_key_der: &[u8],
        hash: RsaHash,
    ) -> Result<Vec<u8>, CryptoError>;

    /// RSA-OAEP decryption under a DER-encoded (PKCS#8) private key.
    fn rsa_decrypt(
        &self,
        data: &[u8],
        private_key_der: &[u8],
        hash: RsaHash,
    ) -> Result<Vec<u8>, CryptoError>;
}

/// Default [`CryptoProvider`] backed by the RustCrypto AES-CBC
/// implementation, `ring` for HMAC, and the `rsa` crate for OAEP.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdCrypto;

impl CryptoProvider for StdCrypto {
    fn random_bytes(&self, n: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; n];
        rand::rng().fill_bytes(&mut bytes);
        bytes
    }

    fn aes_encrypt(&self, data: &[u8], iv: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match key.len() {
            16 => {
                let cipher = Aes128CbcEnc::new_from_slices(key, iv)
                    .map_err(|_| CryptoError::MalformedEnvelope("IV must be 16 bytes"))?;
                Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(data))
            }
            32 => {
                let cipher = Aes256CbcEnc::new_from_slices(key, iv)
                    .map_err(|_| CryptoError::MalformedEnvelope("IV must be 16 bytes"))?;
                Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(data))
            }
            actual => Err(CryptoError::InvalidKeyLength { expected: "16 or 32", actual }),
        }
    }

    fn aes_decrypt(
        &self,
        data: &[u8],
        iv: &[u8],
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, CryptoError> {
        match key.len() {
            16 => {
                let cipher = Aes128CbcDec::new_from_slices(key, iv)
                    .map_err(|_| CryptoError::MalformedEnvelope("IV must be 16 bytes"))?;
                Ok(cipher.decrypt_padded_vec_mut::<Pkcs7>(data).ok())
            }
            32 => {
                let cipher = Aes256CbcDec::new_from_slices(key, iv)
                    .map_err(|_| CryptoError::MalformedEnvelope("IV must be 16 bytes"))?;
                Ok(cipher.decrypt_padded_vec_mut::<Pkcs7>(data).ok())
            }
            actual => Err(CryptoError::InvalidKeyLength { expected: "16 or 32", actual }),
        }
    }

    fn hmac_sha256(&self, data: &[u8], key: &[u8]) -> Vec<u8> {
        let key = hmac::Key::new(hmac::HMAC_SHA256, key);
        hmac::sign(&key, data).as_ref().to_vec()
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> bool {
        a.ct_eq(b).into()
    }

    fn rsa_encrypt(
        &self,
        data: &[u8],
        public_key_der: &[u8],
        hash: RsaHash,
    ) -> Result<Vec<u8>, CryptoError> {
        let public_key = RsaPublicKey::from_public_key_der(public_key_der)
            .map_err(|_| CryptoError::MissingKey)?;
        let padding = oaep_for(hash);
        public_key
            .encrypt(&mut rand_core::OsRng, padding, data)
            .map_err(|_| CryptoError::Rsa("encryption failed"))
    }

    fn rsa_decrypt(
        &self,
        data: &[u8],
        private_key_der: &[u8],
        hash: RsaHash,
    ) -> Result<Vec<u8>, CryptoError> {
        let private_key =
            RsaPrivateKey::from_pkcs8_der(private_key_der).map_err(|_| CryptoError::MissingKey)?;
        let padding = oaep_for(hash);
        private_key
            .decrypt(padding, data)
            .map_err(|_| CryptoError::Rsa("decryption failed"))
    }
}

fn oaep_for(hash: RsaHash) -> Oaep {
    match hash {
        RsaHash::Sha1 => Oaep::new::<Sha1>(),
        RsaHash::Sha256 => Oaep::new::<Sha256>(),
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn test_aes_round_trip_both_key_sizes() {
        let crypto = StdCrypto;
        let iv = [0x42u8; 16];
        for key_len in [16usize, 32] {
            let key = vec![0x11u8; key_len];
            let plain = b"the quick brown fox";
            let ct = crypto.aes_encrypt(plain, &iv, &key).unwrap();
            assert_ne!(&ct[..], &plain[..]);
            // PKCS7 pads to the next block boundary.
            assert_eq!(ct.len() % 16, 0);
            let decrypted = crypto.aes_decrypt(&ct, &iv, &key).unwrap().unwrap();
            assert_eq!(decrypted, plain);
        }
    }

    #[test]
    fn test_aes_rejects_bad_key_length() {
        let crypto = StdCrypto;
        let err = crypto.aes_encrypt(b"data", &[0u8; 16], &[0u8; 24]).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::InvalidKeyLength { expected: "16 or 32", actual: 24 }
        ));
    }

    #[test]
    fn test_aes_decrypt_garbage_is_none_not_error() {
        let crypto = StdCrypto;
        // Not a multiple of the block size.
        let result = crypto.aes_decrypt(&[1, 2, 3], &[0u8; 16], &[0u8; 32]).unwrap();
        assert!(result.is_none());
        // Block-aligned noise fails padding with overwhelming probability.
        let result = crypto.aes_decrypt(&[0xFFu8; 32], &[0u8; 16], &[0u8; 32]).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_hmac_sha256_rfc4231_case_2() {
        let crypto = StdCrypto;
        let mac = crypto.hmac_sha256(b"what do ya want for nothing?", b"Jefe");
        assert_eq!(
            mac,
            hex!("5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843")
        );
    }

    #[test]
    fn test_compare_is_length_aware() {
        let crypto = StdCrypto;
        assert!(crypto.compare(b"same", b"same"));
        assert!(!crypto.compare(b"same", b"diff"));
        assert!(!crypto.compare(b"short", b"longer input"));
        assert!(crypto.compare(b"", b""));
    }

    #[test]
    fn test_random_bytes_length_and_variation() {
        let crypto = StdCrypto;
        let a = crypto.random_bytes(16);
        let b = crypto.random_bytes(16);
        assert_eq!(a.len(), 16);
        assert_eq!(b.len(), 16);
        assert_ne!(a, b);
    }

    #[test]
    fn test_rsa_rejects_undecodable_der() {
        let crypto = StdCrypto;
        let err = crypto
            .rsa_encrypt(b"data", b"not a der blob", RsaHash::Sha1)
            .unwrap_err();
        assert!(matches!(err, CryptoError::MissingKey));
        let err = crypto
            .rsa_decrypt(b"data", b"not a der blob", RsaHash::Sha1)
            .unwrap_err();
        assert!(matches!(err, CryptoError::MissingKey));
    }
}
