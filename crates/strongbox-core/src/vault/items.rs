//! Vault item types
//!
//! Encrypted items hold [`EncString`] fields; decrypting one produces its
//! view with plain strings. A field that fails to decrypt renders as
//! [`DECRYPT_ERROR_PLACEHOLDER`] instead of aborting the item, so a batch
//! always yields one output per input.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::crypto::SymmetricCryptoKey;
use crate::encrypt::EncryptService;
use crate::envelope::EncString;

/// Rendered in place of a field that would not decrypt.
pub const DECRYPT_ERROR_PLACEHOLDER: &str = "[error: cannot decrypt]";

/// Discriminant naming the constructor that rehydrates an item after it
/// crosses a serialization boundary. Serialized as the `initializerKey`
/// field on every item and view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InitializerKey {
    Cipher,
    Folder,
    Collection,
}

// =============================================================================
// Encrypted items
// =============================================================================

/// A vault entry: name plus optional free-form notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cipher {
    pub id: Uuid,
    pub name: EncString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<EncString>,
}

/// A user folder grouping vault entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: Uuid,
    pub name: EncString,
}

/// An organization collection grouping shared entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: Uuid,
    pub name: EncString,
}

/// Tagged union over every encrypted item kind the bulk path accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "initializerKey", rename_all = "camelCase")]
pub enum DecryptableItem {
    Cipher(Cipher),
    Folder(Folder),
    Collection(Collection),
}

impl DecryptableItem {
    /// The discriminant this item rehydrates under.
    #[must_use]
    pub const fn initializer_key(&self) -> InitializerKey {
        match self {
            Self::Cipher(_) => InitializerKey::Cipher,
            Self::Folder(_) => InitializerKey::Folder,
            Self::Collection(_) => InitializerKey::Collection,
        }
    }
}

// =============================================================================
// Decrypted views
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CipherView {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderView {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionView {
    pub id: Uuid,
    pub name: String,
}

/// Tagged union over every decrypted view kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "initializerKey", rename_all = "camelCase")]
pub enum DecryptedItem {
    Cipher(CipherView),
    Folder(FolderView),
    Collection(CollectionView),
}

impl DecryptedItem {
    /// The discriminant this view was rehydrated under.
    #[must_use]
    pub const fn initializer_key(&self) -> InitializerKey {
        match self {
            Self::Cipher(_) => InitializerKey::Cipher,
            Self::Folder(_) => InitializerKey::Folder,
            Self::Collection(_) => InitializerKey::Collection,
        }
    }
}

// =============================================================================
// Decryption
// =============================================================================

/// Items that decrypt into a view via the envelope service.
///
/// Infallible on purpose: a field that cannot be decrypted becomes the
/// placeholder, so one bad field never sinks a batch.
pub trait Decryptable {
    type Output;

    fn decrypt(&self, service: &EncryptService, key: &SymmetricCryptoKey) -> Self::Output;
}

fn decrypt_field(service: &EncryptService, key: &SymmetricCryptoKey, enc: &EncString) -> String {
    match service.decrypt_to_utf8(enc, key) {
        Ok(Some(plain)) => plain,
        Ok(None) => DECRYPT_ERROR_PLACEHOLDER.to_owned(),
        Err(err) => {
            debug!(%err, "field rejected before decryption");
            DECRYPT_ERROR_PLACEHOLDER.to_owned()
        }
    }
}

impl Decryptable for Cipher {
    type Output = CipherView;

    fn decrypt(&self, service: &EncryptService, key: &SymmetricCryptoKey) -> CipherView {
        CipherView {
            id: self.id,
            name: decrypt_field(service, key, &self.name),
            notes: self.notes.as_ref().map(|notes| decrypt_field(service, key, notes)),
        }
    }
}

impl Decryptable for Folder {
    type Output = FolderView;

    fn decrypt(&self, service: &EncryptService, key: &SymmetricCryptoKey) -> FolderView {
        FolderView { id: self.id, name: decrypt_field(service, key, &self.name) }
    }
}

impl Decryptable for Collection {
    type Output = CollectionView;

    fn decrypt(&self, service: &EncryptService, key: &SymmetricCryptoKey) -> CollectionView {
        CollectionView { id: self.id, name: decrypt_field(service, key, &self.name) }
    }
}

impl Decryptable for DecryptableItem {
    type Output = DecryptedItem;

    fn decrypt(&self, service: &EncryptService, key: &SymmetricCryptoKey) -> DecryptedItem {
        match self {
            Self::Cipher(cipher) => DecryptedItem::Cipher(cipher.decrypt(service, key)),
            Self::Folder(folder) => DecryptedItem::Folder(folder.decrypt(service, key)),
            Self::Collection(collection) => {
                DecryptedItem::Collection(collection.decrypt(service, key))
            }
        }
    }
}
