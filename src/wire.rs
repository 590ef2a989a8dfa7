//! HTTP boundary: the 402 header set and the client preference header.
//!
//! The transport layer owns routing and status handling; this module only
//! renders and parses header values so both sides agree on them.

use crate::error::{Error, Result};
use crate::ticket::{decode_base64, Envelope, DEFAULT_TTL};

/// Protocol version announced in [`HEADER_VERSION`].
pub const PROTOCOL_VERSION: &str = "0.1";

/// Status code of an unpaid response.
pub const STATUS_PAYMENT_REQUIRED: u16 = 402;

/// Marks a response as carrying an envelope.
pub const HEADER_VERSION: &str = "X-SWM";
/// Base64 ticket bytes.
pub const HEADER_OBJECT: &str = "X-SWM-Object";
/// Base64 signature, omitted for unsigned tickets.
pub const HEADER_SIGNATURE: &str = "X-SWM-Signature";
/// Envelope id, also the tag a payment must carry.
pub const HEADER_ID: &str = "X-SWM-ID";
/// Seconds to wait before retrying the fetch after paying.
pub const HEADER_TTL: &str = "X-SWM-TTL";
/// Request header: comma-separated networks the client can pay on.
pub const HEADER_ACCEPT_NETWORK: &str = "X-SWM-Accept-Network";

/// Parse the client's ordered network preference.
///
/// Entries are trimmed and empty ones dropped; a missing header is no
/// preference.
#[must_use]
pub fn parse_accept_network(value: Option<&str>) -> Vec<String> {
    value
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|network| !network.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl Envelope {
    /// Headers of the 402 response, in emission order.
    #[must_use]
    pub fn to_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            (HEADER_VERSION, PROTOCOL_VERSION.to_string()),
            (HEADER_OBJECT, self.object_base64()),
        ];
        if let Some(signature) = self.signature_base64() {
            headers.push((HEADER_SIGNATURE, signature));
        }
        headers.push((HEADER_ID, self.id.clone()));
        headers.push((HEADER_TTL, self.ttl.to_string()));
        headers
    }

    /// Rebuild an envelope from response headers.
    ///
    /// `lookup` returns a header value by name; callers handle case folding.
    /// The id is recomputed from the object and signature, never taken from
    /// the response. A missing or unusable ttl falls back to
    /// [`DEFAULT_TTL`].
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the response carries no envelope or
    /// its values are not valid base64.
    pub fn from_headers<'a, F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        if lookup(HEADER_VERSION).is_none() {
            return Err(Error::Serialization(format!(
                "response has no {HEADER_VERSION} header"
            )));
        }
        let object = lookup(HEADER_OBJECT)
            .ok_or_else(|| Error::Serialization(format!("missing {HEADER_OBJECT} header")))?;
        let object = decode_base64(object)?;

        let signature = lookup(HEADER_SIGNATURE)
            .filter(|value| !value.trim().is_empty())
            .map(decode_base64)
            .transpose()?;

        let ttl = lookup(HEADER_TTL)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|ttl| *ttl > 0)
            .unwrap_or(DEFAULT_TTL);

        Ok(Self::new(object, signature, ttl))
    }
}
