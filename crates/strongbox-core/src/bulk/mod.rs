//! Bulk decryption on a dedicated worker task
//!
//! [`BulkDecryptService`] fans batches of [`crate::vault::DecryptableItem`]s
//! out to one lazily-spawned, long-lived worker task, correlates replies by
//! id, and tears the worker down the moment the account-unlock signal goes
//! false, abandoning rather than draining whatever was in flight. Callers
//! whose reply can no longer arrive resolve to `Ok(None)` instead of
//! hanging.

mod coordinator;
mod worker;

use thiserror::Error;

pub use coordinator::BulkDecryptService;

/// Errors from the bulk decryption path.
///
/// Worker teardown is deliberately not represented here: a call overtaken
/// by the lock signal resolves to `Ok(None)`, the same "no result" shape as
/// an undecryptable envelope.
#[derive(Error, Debug)]
pub enum BulkDecryptError {
    /// A request or reply payload failed JSON serialization.
    #[error("bulk payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A reply item carried a discriminant with no registered constructor.
    #[error("no initializer registered for {0}")]
    UnknownInitializer(String),

    /// The worker reported a failure for this call.
    #[error("decrypt worker error: {0}")]
    Worker(String),
}
