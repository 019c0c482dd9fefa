//! The decrypt worker task and its wire protocol
//!
//! Requests and replies cross the channel as serialized JSON, exactly as
//! they would cross a process boundary: the worker owns nothing of the
//! caller's and learns everything, key included, from the request itself.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace, warn};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::{CryptoError, EncryptionType, SymmetricCryptoKey};
use crate::encrypt::EncryptService;
use crate::vault::items::{Decryptable, DecryptableItem, DecryptedItem};

/// The serialized key as it rides inside a request.
///
/// The explicit type tag is load-bearing: a legacy 16+16 key decodes to 32
/// bytes, which length inference alone would misread as a no-MAC key. The
/// key field is wiped on drop, like the key object it was built from.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub(crate) struct KeyPayload {
    pub key_b64: String,
    #[zeroize(skip)]
    pub enc_type: EncryptionType,
}

impl KeyPayload {
    pub(crate) fn from_key(key: &SymmetricCryptoKey) -> Self {
        Self { key_b64: key.to_b64(), enc_type: key.enc_type() }
    }

    pub(crate) fn to_key(&self) -> Result<SymmetricCryptoKey, CryptoError> {
        SymmetricCryptoKey::from_b64_with_type(&self.key_b64, self.enc_type)
    }
}

/// One batch request: correlation id, serialized items, serialized key.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DecryptRequest {
    pub id: Uuid,
    /// JSON-serialized `Vec<DecryptableItem>`.
    pub items: String,
    pub key: KeyPayload,
}

/// One batch reply, correlated by id. Exactly one of `items`/`error` is
/// set.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DecryptResponse {
    pub id: Uuid,
    /// JSON-serialized `Vec<DecryptedItem>`, in request order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DecryptResponse {
    fn error(id: Uuid, error: String) -> Self {
        Self { id, items: None, error: Some(error) }
    }
}

/// The long-lived worker: receives serialized requests, decrypts batches in
/// order, broadcasts serialized replies.
///
/// Request buffers ride the channel as [`Zeroizing`] strings because they
/// embed the serialized key.
pub(crate) struct DecryptWorker {
    service: Arc<EncryptService>,
    requests: mpsc::Receiver<Zeroizing<String>>,
    replies: broadcast::Sender<String>,
}

impl DecryptWorker {
    pub(crate) fn new(
        service: Arc<EncryptService>,
        requests: mpsc::Receiver<Zeroizing<String>>,
        replies: broadcast::Sender<String>,
    ) -> Self {
        Self { service, requests, replies }
    }

    pub(crate) async fn run(mut self) {
        debug!("decrypt worker online");
        while let Some(raw) = self.requests.recv().await {
            if let Some(reply) = self.handle(&raw).await {
                // Every receiver may already be gone if the callers were
                // cancelled; an undeliverable reply is not an error.
                let _ = self.replies.send(reply);
            }
        }
        trace!("request channel closed, decrypt worker exiting");
    }

    async fn handle(&self, raw: &str) -> Option<String> {
        let request: DecryptRequest = match serde_json::from_str(raw) {
            Ok(request) => request,
            Err(err) => {
                // Without an id there is nothing to correlate a reply to.
                warn!(%err, "undecodable decrypt request dropped");
                return None;
            }
        };
        let response = self.process(&request).await;
        let raw = serde_json::to_string(&response).unwrap_or_else(|_| {
            format!("{{\"id\":\"{}\",\"error\":\"reply serialization failed\"}}", request.id)
        });
        Some(raw)
    }

    async fn process(&self, request: &DecryptRequest) -> DecryptResponse {
        let key = match request.key.to_key() {
            Ok(key) => key,
            Err(err) => return DecryptResponse::error(request.id, err.to_string()),
        };
        let items: Vec<DecryptableItem> = match serde_json::from_str(&request.items) {
            Ok(items) => items,
            Err(err) => {
                return DecryptResponse::error(request.id, format!("undecodable items: {err}"));
            }
        };

        debug!(id = %request.id, items = items.len(), "decrypting batch");
        let mut views: Vec<DecryptedItem> = Vec::with_capacity(items.len());
        for item in &items {
            views.push(item.decrypt(&self.service, &key));
            // Keeps an abort from the lock signal landing between items
            // rather than after the whole batch.
            tokio::task::yield_now().await;
        }

        match serde_json::to_string(&views) {
            Ok(items) => DecryptResponse { id: request.id, items: Some(items), error: None },
            Err(err) => {
                DecryptResponse::error(request.id, format!("reply serialization failed: {err}"))
            }
        }
    }
}
