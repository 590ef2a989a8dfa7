//! Signed, content-addressed envelopes.
//!
//! An envelope wraps the canonical bytes of a ticket together with the
//! signature of the selected payment network. Its identifier is
//! `sha256(object ∥ signature)`, so equal tickets signed identically share
//! one id and any modification of either part changes it.

use crate::error::{Error, Result};
use crate::payment::PaymentNetwork;
use crate::ticket::model::Ticket;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default retry delay advertised to clients, in seconds.
pub const DEFAULT_TTL: u64 = 10;

/// Compute the envelope identifier for `object` and an optional signature.
#[must_use]
pub fn envelope_id(object: &[u8], signature: Option<&[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(object);
    if let Some(signature) = signature {
        hasher.update(signature);
    }
    hex::encode(hasher.finalize())
}

/// Returns true if `candidate` has the shape of an envelope id.
///
/// Payment tags are untrusted; only ids of this shape are ever mapped to
/// paths in the ticket store.
#[must_use]
pub fn is_envelope_id(candidate: &str) -> bool {
    candidate.len() == 64
        && candidate
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Wire and storage form of a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Canonical ticket bytes.
    pub object: Vec<u8>,
    /// Network signature over `object`, if one was produced.
    pub signature: Option<Vec<u8>>,
    /// Content-derived identifier.
    pub id: String,
    /// Seconds the client should wait before retrying the paid fetch.
    pub ttl: u64,
}

#[derive(Serialize, Deserialize)]
struct EnvelopeRecord {
    object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
    id: String,
    ttl: u64,
}

impl Envelope {
    /// Wrap ticket bytes and derive the identifier.
    #[must_use]
    pub fn new(object: Vec<u8>, signature: Option<Vec<u8>>, ttl: u64) -> Self {
        let id = envelope_id(&object, signature.as_deref());
        Self {
            object,
            signature,
            id,
            ttl,
        }
    }

    /// Decode the wrapped ticket.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the object is not a ticket.
    pub fn ticket(&self) -> Result<Ticket> {
        Ticket::from_bytes(&self.object)
    }

    /// Base64 of the object, as sent on the wire.
    #[must_use]
    pub fn object_base64(&self) -> String {
        BASE64.encode(&self.object)
    }

    /// Base64 of the signature, if any.
    #[must_use]
    pub fn signature_base64(&self) -> Option<String> {
        self.signature.as_ref().map(|s| BASE64.encode(s))
    }

    /// Check the signature against `address` using `network`.
    ///
    /// Unsigned envelopes never verify.
    #[must_use]
    pub fn verify(&self, network: &dyn PaymentNetwork, address: &str) -> bool {
        self.signature
            .as_deref()
            .is_some_and(|signature| network.verify_signature(signature, &self.object, address))
    }

    /// Serialize to the JSON record kept in the ticket store.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if encoding fails.
    pub fn to_record(&self) -> Result<Vec<u8>> {
        let record = EnvelopeRecord {
            object: self.object_base64(),
            signature: self.signature_base64(),
            id: self.id.clone(),
            ttl: self.ttl,
        };
        Ok(serde_json::to_vec(&record)?)
    }

    /// Parse a stored record, checking that its id matches its contents.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for malformed or tampered records.
    pub fn from_record(bytes: &[u8]) -> Result<Self> {
        let record: EnvelopeRecord = serde_json::from_slice(bytes)?;
        let object = decode_base64(&record.object)?;
        let signature = record.signature.as_deref().map(decode_base64).transpose()?;
        let envelope = Self::new(object, signature, record.ttl);
        if envelope.id != record.id {
            return Err(Error::Serialization(format!(
                "envelope id mismatch: stored {}, computed {}",
                record.id, envelope.id
            )));
        }
        Ok(envelope)
    }
}

pub(crate) fn decode_base64(text: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(text.trim())
        .map_err(|e| Error::Serialization(format!("invalid base64: {e}")))
}
