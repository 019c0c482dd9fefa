//! Binary-framed envelopes
//!
//! Packed layout: `[type:1][iv:16][mac:32 if MAC type][data:≥1]`. Only the
//! AES-CBC tags are valid here; RSA payloads are never binary-framed.

use std::fmt;

use base64::{Engine as _, engine::general_purpose};

use super::{ENC_TYPE_LENGTH, IV_LENGTH, MAC_LENGTH, MIN_DATA_LENGTH};
use crate::crypto::{CryptoError, EncryptionType};

/// A parsed binary-framed envelope.
#[derive(Clone, PartialEq, Eq)]
pub struct EncBytes {
    enc_type: EncryptionType,
    iv: [u8; IV_LENGTH],
    mac: Option<[u8; MAC_LENGTH]>,
    data: Vec<u8>,
}

impl EncBytes {
    /// Parses the packed wire form. The whole buffer is consumed: whatever
    /// follows the fixed header is the ciphertext, and at least one
    /// ciphertext byte must be present.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, CryptoError> {
        if buf.is_empty() {
            return Err(CryptoError::MissingInput("envelope parsing"));
        }
        let enc_type = EncryptionType::try_from(buf[0])
            .map_err(|_| CryptoError::MalformedEnvelope("unrecognized encryption type tag"))?;
        if !enc_type.is_symmetric() {
            return Err(CryptoError::MalformedEnvelope(
                "binary framing requires an AES-CBC type",
            ));
        }
        let header_len = ENC_TYPE_LENGTH + IV_LENGTH + enc_type.mac_len();
        if buf.len() < header_len + MIN_DATA_LENGTH {
            return Err(CryptoError::MalformedEnvelope(
                "buffer shorter than the type's header",
            ));
        }

        let iv: [u8; IV_LENGTH] = buf[ENC_TYPE_LENGTH..ENC_TYPE_LENGTH + IV_LENGTH]
            .try_into()
            .map_err(|_| CryptoError::MalformedEnvelope("IV must be 16 bytes"))?;
        let mac = if enc_type.has_mac() {
            let start = ENC_TYPE_LENGTH + IV_LENGTH;
            Some(
                buf[start..start + MAC_LENGTH]
                    .try_into()
                    .map_err(|_| CryptoError::MalformedEnvelope("MAC must be 32 bytes"))?,
            )
        } else {
            None
        };
        let data = buf[header_len..].to_vec();
        Ok(Self { enc_type, iv, mac, data })
    }

    /// Assembles an envelope from decoded parts, enforcing the tag's shape.
    pub fn from_parts(
        enc_type: EncryptionType,
        iv: &[u8],
        data: Vec<u8>,
        mac: Option<&[u8]>,
    ) -> Result<Self, CryptoError> {
        if !enc_type.is_symmetric() {
            return Err(CryptoError::MalformedEnvelope(
                "binary framing requires an AES-CBC type",
            ));
        }
        if data.len() < MIN_DATA_LENGTH {
            return Err(CryptoError::MissingInput("envelope data"));
        }
        let iv: [u8; IV_LENGTH] = iv
            .try_into()
            .map_err(|_| CryptoError::MalformedEnvelope("IV must be 16 bytes"))?;
        let mac = match (enc_type.has_mac(), mac) {
            (true, Some(mac)) => Some(
                mac.try_into()
                    .map_err(|_| CryptoError::MalformedEnvelope("MAC must be 32 bytes"))?,
            ),
            (true, None) => {
                return Err(CryptoError::MalformedEnvelope("MAC type without a MAC segment"));
            }
            (false, Some(_)) => {
                return Err(CryptoError::MalformedEnvelope("MAC segment on a no-MAC type"));
            }
            (false, None) => None,
        };
        Ok(Self { enc_type, iv, mac, data })
    }

    /// Serializes the packed wire form. The result is exactly
    /// `1 + 16 + (32 if MAC) + data.len()` bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mac_len = self.enc_type.mac_len();
        let mut buf =
            Vec::with_capacity(ENC_TYPE_LENGTH + IV_LENGTH + mac_len + self.data.len());
        buf.push(self.enc_type as u8);
        buf.extend_from_slice(&self.iv);
        if let Some(mac) = &self.mac {
            buf.extend_from_slice(mac);
        }
        buf.extend_from_slice(&self.data);
        buf
    }

    /// Base64 of [`Self::to_bytes`], the form used when a binary envelope
    /// rides inside a text field.
    #[must_use]
    pub fn to_b64(&self) -> String {
        general_purpose::STANDARD.encode(self.to_bytes())
    }

    /// Parses an envelope from its [`Self::to_b64`] form.
    pub fn from_b64(s: &str) -> Result<Self, CryptoError> {
        if s.is_empty() {
            return Err(CryptoError::MissingInput("envelope parsing"));
        }
        let bytes = general_purpose::STANDARD
            .decode(s)
            .map_err(|_| CryptoError::MalformedEnvelope("envelope is not valid base64"))?;
        Self::from_bytes(&bytes)
    }

    /// The tag this envelope was framed under.
    #[must_use]
    pub const fn enc_type(&self) -> EncryptionType {
        self.enc_type
    }

    /// The IV.
    #[must_use]
    pub const fn iv(&self) -> &[u8; IV_LENGTH] {
        &self.iv
    }

    /// The MAC, present for MAC tags.
    #[must_use]
    pub fn mac(&self) -> Option<&[u8; MAC_LENGTH]> {
        self.mac.as_ref()
    }

    /// The ciphertext bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for EncBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncBytes")
            .field("enc_type", &self.enc_type)
            .field("iv", &hex::encode(self.iv))
            .field("mac", &self.mac.as_ref().map(hex::encode))
            .field("data_len", &self.data.len())
            .finish()
    }
}
