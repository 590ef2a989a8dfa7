//! Ticket records and their canonical serialization.

use crate::config::DateResolution;
use crate::error::Result;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

/// Identity of the content a ticket sells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRef {
    /// Hex-encoded digest of the content bytes.
    pub digest: String,
    /// Algorithm that produced `digest`.
    pub digest_algorithm: String,
    /// Where the content becomes available once paid.
    pub uri: String,
}

impl ContentRef {
    /// Check fetched bytes against the advertised digest.
    ///
    /// Only `md5` is understood; any other algorithm never verifies.
    #[must_use]
    pub fn verify_digest(&self, data: &[u8]) -> bool {
        self.digest_algorithm == crate::content::DIGEST_ALGORITHM
            && hex::encode(Md5::digest(data)) == self.digest
    }
}

/// A price point on one payment network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentOption {
    /// Payment network identifier.
    pub network: String,
    /// Payment destination on that network.
    pub address: String,
    /// Price in the network's smallest unit.
    pub amount: u64,
}

/// Unsigned record binding a content digest, its URI and an optional price.
///
/// Field order is the canonical serialization order; two tickets with equal
/// fields serialize to identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Issuance time, millisecond precision.
    #[serde(with = "iso_millis")]
    pub date: DateTime<Utc>,
    /// Content being sold.
    pub content: ContentRef,
    /// Payment terms; absent for informational tickets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentOption>,
    /// Seconds the ticket remains payable.
    pub validity: u64,
}

impl Ticket {
    /// Canonical bytes of this ticket.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a ticket from its canonical bytes.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for malformed input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Last instant at which the ticket is still payable.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        let validity_ms = i64::try_from(self.validity.saturating_mul(1000)).unwrap_or(i64::MAX);
        self.date
            .checked_add_signed(TimeDelta::try_milliseconds(validity_ms).unwrap_or(TimeDelta::MAX))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// True once `now` is past `date + validity`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// True while `now <= date + validity`.
    #[must_use]
    pub fn is_payable_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired_at(now)
    }
}

/// Truncate `date` to the configured resolution, or to milliseconds.
#[must_use]
pub fn truncate_date(date: DateTime<Utc>, resolution: Option<DateResolution>) -> DateTime<Utc> {
    let step = match resolution {
        Some(DateResolution::Hour) => TimeDelta::hours(1),
        Some(DateResolution::Minute) => TimeDelta::minutes(1),
        Some(DateResolution::Second) => TimeDelta::seconds(1),
        None => TimeDelta::milliseconds(1),
    };
    date.duration_trunc(step).unwrap_or(date)
}

mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&date.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|date| date.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
