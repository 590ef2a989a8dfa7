//! In-process payment network standing in for a ledger client.
//!
//! Signatures are `sha256(key ∥ message)`, addresses are the first 40 hex
//! digits of `sha256(key)`. Payments are queued by the test and handed out
//! on the next poll, or pushed straight into the node's sink.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};
use swm_node::payment::{PaymentInfo, PaymentNetwork, PaymentSink};
use swm_node::{Error, Result};

/// Scriptable payment network.
pub struct MockNetwork {
    name: String,
    key: String,
    sign_calls: AtomicUsize,
    pending: Mutex<Vec<PaymentInfo>>,
    sink: Mutex<Option<PaymentSink>>,
}

impl MockNetwork {
    /// Create a network named `name` owning `key`.
    #[must_use]
    pub fn new(name: &str, key: &str) -> Self {
        Self {
            name: name.to_string(),
            key: key.to_string(),
            sign_calls: AtomicUsize::new(0),
            pending: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
        }
    }

    /// Address payments must be sent to.
    #[must_use]
    pub fn address(&self) -> String {
        address_of(&self.key)
    }

    /// Number of times the node asked for a signature.
    #[must_use]
    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }

    /// Queue a payment for the next poll.
    pub fn queue_payment(&self, info: PaymentInfo) {
        self.pending.lock().push(info);
    }

    /// Returns true once the node has subscribed for pushes.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.sink.lock().is_some()
    }

    /// Push a payment to the node immediately.
    ///
    /// # Errors
    ///
    /// Fails if the node has not subscribed or stopped listening.
    pub fn push_payment(&self, info: PaymentInfo) -> Result<()> {
        let sink = self.sink.lock().clone();
        let sink = sink.ok_or_else(|| Error::MalformedObservation("not subscribed".to_string()))?;
        sink.try_send(info)
            .map_err(|e| Error::MalformedObservation(e.to_string()))
    }
}

fn address_of(key: &str) -> String {
    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    digest[..40].to_string()
}

fn signature_of(key: &str, message: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(message);
    hasher.finalize().to_vec()
}

impl PaymentNetwork for MockNetwork {
    fn name(&self) -> &str {
        &self.name
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        Ok(signature_of(&self.key, message))
    }

    fn derive_address(&self, key: &str) -> Result<String> {
        if key.is_empty() {
            return Err(Error::Config("empty key".to_string()));
        }
        Ok(address_of(key))
    }

    fn verify_signature(&self, signature: &[u8], message: &[u8], address: &str) -> bool {
        address == self.address() && signature == signature_of(&self.key, message).as_slice()
    }

    fn check_for_payments(&self) -> BoxFuture<'_, Result<Vec<PaymentInfo>>> {
        let drained = std::mem::take(&mut *self.pending.lock());
        Box::pin(async move { Ok(drained) })
    }

    fn subscribe(&self, sink: PaymentSink) {
        *self.sink.lock() = Some(sink);
    }
}
