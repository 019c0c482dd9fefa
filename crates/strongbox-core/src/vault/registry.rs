//! Initializer registry
//!
//! Maps an [`InitializerKey`] discriminant to the constructor that rebuilds
//! the typed view from its serialized form. The table is deliberately an
//! explicit match: adding a vault type means adding an arm here, and an
//! unknown discriminant never silently constructs the wrong type.

use serde_json::Value;

use super::items::{CipherView, CollectionView, DecryptedItem, FolderView, InitializerKey};

/// Constructor that rebuilds a typed view from its serialized form.
pub type ViewInitializer = fn(Value) -> Result<DecryptedItem, serde_json::Error>;

/// Returns the constructor registered for `key`.
#[must_use]
pub fn initializer_for(key: InitializerKey) -> ViewInitializer {
    match key {
        InitializerKey::Cipher => {
            |value| serde_json::from_value::<CipherView>(value).map(DecryptedItem::Cipher)
        }
        InitializerKey::Folder => {
            |value| serde_json::from_value::<FolderView>(value).map(DecryptedItem::Folder)
        }
        InitializerKey::Collection => {
            |value| serde_json::from_value::<CollectionView>(value).map(DecryptedItem::Collection)
        }
    }
}
