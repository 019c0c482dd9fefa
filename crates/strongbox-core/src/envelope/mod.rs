//! Encrypted envelope codec
//!
//! Two physical framings of the same logical envelope (type + IV + optional
//! MAC + ciphertext):
//!
//! - [`EncString`]: the `.`/`|`-delimited base64 text form used for
//!   encrypted string fields, e.g. `2.<ivB64>|<dataB64>|<macB64>`.
//! - [`EncBytes`]: the packed binary form used for encrypted blobs,
//!   `[type:1][iv:16][mac:32 if MAC type][data:≥1]`.
//!
//! Both framings are persisted wire formats; parsing and re-serialization
//! must stay byte-for-byte compatible with stored data.

pub mod bytes;
pub mod string;

/// Length of the leading type tag in the binary framing.
pub const ENC_TYPE_LENGTH: usize = 1;
/// AES-CBC initialization vector length.
pub const IV_LENGTH: usize = 16;
/// HMAC-SHA256 output length.
pub const MAC_LENGTH: usize = 32;
/// An envelope must carry at least one ciphertext byte.
pub const MIN_DATA_LENGTH: usize = 1;

pub use bytes::EncBytes;
pub use string::EncString;
