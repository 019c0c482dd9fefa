//! Typed vault items and their decrypted views
//!
//! These are the domain objects bulk decryption ships across the worker
//! boundary: serde round-trippable, each tagged with the
//! [`items::InitializerKey`] discriminant that selects its reconstruction
//! function on the way back.

pub mod items;
pub mod registry;

pub use items::{
    Cipher, CipherView, Collection, CollectionView, Decryptable, DecryptableItem, DecryptedItem,
    Folder, FolderView, InitializerKey,
};
pub use registry::initializer_for;
