//! The bulk decryption coordinator
//!
//! Owns at most one live [`DecryptWorker`] and the supervisor that watches
//! the account-unlock signal. The worker is spawned lazily on first use and
//! shared by every concurrent call; calls are distinguished purely by
//! correlation id, so no ordering holds between calls while order within a
//! call's result always matches its input.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, instrument, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::BulkDecryptError;
use super::worker::{DecryptRequest, DecryptResponse, DecryptWorker, KeyPayload};
use crate::crypto::SymmetricCryptoKey;
use crate::encrypt::EncryptService;
use crate::vault::items::{DecryptableItem, DecryptedItem, InitializerKey};
use crate::vault::registry::initializer_for;

/// Requests queued toward the worker before senders start waiting.
const REQUEST_QUEUE_DEPTH: usize = 32;
/// Reply fan-out capacity. Sized so a caller polling its own reply never
/// realistically lags out; a caller that does treats its reply as lost.
const REPLY_CHANNEL_CAPACITY: usize = 256;

struct WorkerHandle {
    requests: mpsc::Sender<Zeroizing<String>>,
    replies: broadcast::Sender<String>,
    worker_task: JoinHandle<()>,
    supervisor_task: JoinHandle<()>,
}

/// Fans bulk decryption out to a dedicated worker task.
///
/// Construction takes the unlock signal: `true` means the account is
/// unlocked. The moment it flips to `false` the worker is terminated
/// (queued and in-flight batches are abandoned) and the handle cleared, so
/// the next call after re-unlock spawns a fresh worker. Calls overtaken by
/// the flip resolve to `Ok(None)`.
pub struct BulkDecryptService {
    service: Arc<EncryptService>,
    unlock_rx: watch::Receiver<bool>,
    worker: Arc<Mutex<Option<WorkerHandle>>>,
}

impl BulkDecryptService {
    #[must_use]
    pub fn new(service: Arc<EncryptService>, unlock_rx: watch::Receiver<bool>) -> Self {
        Self { service, unlock_rx, worker: Arc::new(Mutex::new(None)) }
    }

    /// Decrypts `items` on the worker, returning views in input order.
    ///
    /// - Empty input resolves to `Ok(Some(vec![]))` without touching the
    ///   worker.
    /// - `Ok(None)` means the account locked (before or during the call)
    ///   or the worker disappeared before replying: "no result", not an
    ///   error.
    #[instrument(level = "debug", skip_all, fields(items = items.len()))]
    pub async fn decrypt_items(
        &self,
        items: &[DecryptableItem],
        key: &SymmetricCryptoKey,
    ) -> Result<Option<Vec<DecryptedItem>>, BulkDecryptError> {
        if items.is_empty() {
            return Ok(Some(Vec::new()));
        }
        if !*self.unlock_rx.borrow() {
            debug!("account locked, refusing bulk decrypt");
            return Ok(None);
        }

        let (requests, mut replies) = self.ensure_worker().await;
        let id = Uuid::new_v4();
        let request = DecryptRequest {
            id,
            items: serde_json::to_string(items)?,
            key: KeyPayload::from_key(key),
        };
        // The serialized request embeds the key, so the buffer is wiped
        // wherever it ends up dropped.
        let raw = Zeroizing::new(serde_json::to_string(&request)?);
        if requests.send(raw).await.is_err() {
            debug!(%id, "decrypt worker gone before the request was sent");
            return Ok(None);
        }

        let mut unlock_rx = self.unlock_rx.clone();
        loop {
            tokio::select! {
                changed = unlock_rx.changed() => {
                    let still_unlocked = changed.is_ok() && *unlock_rx.borrow();
                    if !still_unlocked {
                        debug!(%id, "bulk decrypt cancelled by the lock signal");
                        return Ok(None);
                    }
                }
                reply = replies.recv() => match reply {
                    Ok(raw) => {
                        let Ok(response) = serde_json::from_str::<DecryptResponse>(&raw) else {
                            warn!("undecodable reply on the decrypt channel");
                            continue;
                        };
                        if response.id != id {
                            // Another in-flight call's reply.
                            continue;
                        }
                        return finish(response);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%id, skipped, "reply channel lagged, treating the reply as lost");
                        return Ok(None);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(%id, "decrypt worker torn down mid-call");
                        return Ok(None);
                    }
                },
            }
        }
    }

    /// Returns the live worker's channels, spawning worker and supervisor
    /// first if none is live. The reply receiver is subscribed while the
    /// handle lock is held, before any request can be sent.
    async fn ensure_worker(
        &self,
    ) -> (mpsc::Sender<Zeroizing<String>>, broadcast::Receiver<String>) {
        let mut slot = self.worker.lock().await;
        if let Some(handle) = slot.as_ref() {
            return (handle.requests.clone(), handle.replies.subscribe());
        }

        let (req_tx, req_rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let (reply_tx, reply_rx) = broadcast::channel(REPLY_CHANNEL_CAPACITY);
        let worker = DecryptWorker::new(Arc::clone(&self.service), req_rx, reply_tx.clone());
        let worker_task = tokio::spawn(worker.run());
        let supervisor_task = tokio::spawn(supervise(
            self.unlock_rx.clone(),
            Arc::clone(&self.worker),
            worker_task.abort_handle(),
        ));
        debug!("spawned decrypt worker");

        *slot = Some(WorkerHandle {
            requests: req_tx.clone(),
            replies: reply_tx,
            worker_task,
            supervisor_task,
        });
        (req_tx, reply_rx)
    }
}

impl Drop for BulkDecryptService {
    fn drop(&mut self) {
        // Best effort: if the slot is contended the tasks still exit on
        // their own once the channels close.
        if let Ok(mut slot) = self.worker.try_lock() {
            if let Some(handle) = slot.take() {
                handle.worker_task.abort();
                handle.supervisor_task.abort();
            }
        }
    }
}

/// Watches the unlock signal; on a flip to `false`, terminates the worker
/// immediately and clears the handle so the next call spawns a fresh one.
async fn supervise(
    mut unlock_rx: watch::Receiver<bool>,
    slot: Arc<Mutex<Option<WorkerHandle>>>,
    worker: AbortHandle,
) {
    loop {
        if unlock_rx.changed().await.is_err() {
            // Signal source gone; the worker lives until its channels close.
            return;
        }
        if !*unlock_rx.borrow() {
            worker.abort();
            slot.lock().await.take();
            debug!("account locked, decrypt worker terminated");
            return;
        }
    }
}

fn finish(response: DecryptResponse) -> Result<Option<Vec<DecryptedItem>>, BulkDecryptError> {
    if let Some(error) = response.error {
        return Err(BulkDecryptError::Worker(error));
    }
    let Some(items) = response.items else {
        return Ok(None);
    };
    let values: Vec<Value> = serde_json::from_str(&items)?;
    let mut views = Vec::with_capacity(values.len());
    for value in values {
        views.push(rehydrate(value)?);
    }
    Ok(Some(views))
}

/// Selects the reconstruction function by the item's discriminant and
/// applies it.
fn rehydrate(value: Value) -> Result<DecryptedItem, BulkDecryptError> {
    let tag = value.get("initializerKey").cloned().unwrap_or(Value::Null);
    let key: InitializerKey = serde_json::from_value(tag.clone())
        .map_err(|_| BulkDecryptError::UnknownInitializer(tag.to_string()))?;
    Ok(initializer_for(key)(value)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use crate::crypto::EncryptionType;
    use crate::vault::items::Folder;

    use super::*;

    fn fixture(unlocked: bool) -> (BulkDecryptService, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(unlocked);
        (BulkDecryptService::new(Arc::new(EncryptService::default()), rx), tx)
    }

    #[tokio::test]
    async fn test_empty_input_never_touches_the_worker() {
        let (service, _tx) = fixture(true);
        let key = SymmetricCryptoKey::generate(EncryptionType::AesCbc256HmacSha256B64).unwrap();
        let result = service.decrypt_items(&[], &key).await.unwrap();
        assert_eq!(result, Some(Vec::new()));
        assert!(service.worker.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_locked_at_entry_resolves_to_none_without_a_worker() {
        let (service, _tx) = fixture(false);
        let key = SymmetricCryptoKey::generate(EncryptionType::AesCbc256HmacSha256B64).unwrap();
        let enc = EncryptService::default();
        let items = vec![DecryptableItem::Folder(Folder {
            id: Uuid::new_v4(),
            name: enc.encrypt("unreachable", &key).unwrap(),
        })];
        let result = service.decrypt_items(&items, &key).await.unwrap();
        assert_eq!(result, None);
        assert!(service.worker.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_worker_is_reused_across_calls() {
        let (service, _tx) = fixture(true);
        let key = SymmetricCryptoKey::generate(EncryptionType::AesCbc256HmacSha256B64).unwrap();
        let enc = EncryptService::default();
        let items = vec![DecryptableItem::Folder(Folder {
            id: Uuid::new_v4(),
            name: enc.encrypt("a", &key).unwrap(),
        })];

        service.decrypt_items(&items, &key).await.unwrap();
        let first = {
            let slot = service.worker.lock().await;
            slot.as_ref().expect("worker should be live").requests.clone()
        };
        service.decrypt_items(&items, &key).await.unwrap();
        let slot = service.worker.lock().await;
        let second = &slot.as_ref().expect("worker should still be live").requests;
        assert!(first.same_channel(second));
    }

    #[test]
    fn test_rehydrate_rejects_unknown_discriminants() {
        let err = rehydrate(json!({ "initializerKey": "login", "id": Uuid::new_v4() }))
            .unwrap_err();
        assert!(matches!(err, BulkDecryptError::UnknownInitializer(tag) if tag.contains("login")));

        let err = rehydrate(json!({ "id": Uuid::new_v4() })).unwrap_err();
        assert!(matches!(err, BulkDecryptError::UnknownInitializer(tag) if tag == "null"));
    }
}
