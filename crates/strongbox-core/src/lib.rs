pub mod crypto;
pub mod encrypt;
pub mod envelope;
pub mod vault;

#[cfg(feature = "async")]
pub mod bulk;

// Re-export commonly used types at crate root
pub use crypto::{
    CryptoError, CryptoProvider, EncryptionType, RsaHash, StdCrypto, SymmetricCryptoKey,
};
pub use encrypt::EncryptService;
pub use envelope::{EncBytes, EncString};
pub use vault::{DecryptableItem, DecryptedItem, InitializerKey};

#[cfg(feature = "async")]
pub use bulk::{BulkDecryptError, BulkDecryptService};
