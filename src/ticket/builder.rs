//! Ticket assembly and payment-option selection.

use crate::config::DateResolution;
use crate::content::DIGEST_ALGORITHM;
use crate::ticket::model::{truncate_date, ContentRef, PaymentOption, Ticket};
use chrono::{DateTime, Utc};

/// Resolved payment configuration.
///
/// The shape matters for selection: a single option and a list behave the
/// same without a client preference, but only a list carries an order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PaymentOptions {
    /// Nothing configured.
    #[default]
    None,
    /// Exactly one option.
    Single(PaymentOption),
    /// Ordered options; the first is the default.
    List(Vec<PaymentOption>),
}

impl PaymentOptions {
    fn as_slice(&self) -> &[PaymentOption] {
        match self {
            Self::None => &[],
            Self::Single(option) => std::slice::from_ref(option),
            Self::List(options) => options,
        }
    }

    /// Pick the option a ticket should carry.
    ///
    /// With no client preference the server's first option wins. Otherwise
    /// the client's list is scanned in order and the first network the server
    /// offers is chosen; no overlap means no option.
    #[must_use]
    pub fn select(&self, preference: &[String]) -> Option<&PaymentOption> {
        let options = self.as_slice();
        if preference.is_empty() {
            return options.first();
        }
        preference
            .iter()
            .find_map(|wanted| options.iter().find(|option| &option.network == wanted))
    }

    /// Iterate over the options in configured order.
    pub fn iter(&self) -> impl Iterator<Item = &PaymentOption> {
        self.as_slice().iter()
    }
}

/// Builds unsigned tickets from content digests.
#[derive(Debug, Clone)]
pub struct TicketBuilder {
    base_uri: String,
    validity_secs: u64,
    date_resolution: Option<DateResolution>,
    options: PaymentOptions,
}

impl TicketBuilder {
    /// Create a builder.
    #[must_use]
    pub fn new(
        base_uri: String,
        validity_secs: u64,
        date_resolution: Option<DateResolution>,
        options: PaymentOptions,
    ) -> Self {
        Self {
            base_uri,
            validity_secs,
            date_resolution,
            options,
        }
    }

    /// Configured payment options.
    #[must_use]
    pub fn options(&self) -> &PaymentOptions {
        &self.options
    }

    /// Build a ticket dated now.
    #[must_use]
    pub fn build(&self, digest: &str, key: &str, preference: &[String]) -> Ticket {
        self.build_at(digest, key, preference, Utc::now())
    }

    /// Build a ticket dated `now`, truncated to the configured resolution.
    #[must_use]
    pub fn build_at(
        &self,
        digest: &str,
        key: &str,
        preference: &[String],
        now: DateTime<Utc>,
    ) -> Ticket {
        Ticket {
            date: truncate_date(now, self.date_resolution),
            content: ContentRef {
                digest: digest.to_string(),
                digest_algorithm: DIGEST_ALGORITHM.to_string(),
                uri: format!("{}/{digest}/{key}", self.base_uri),
            },
            payment: self.options.select(preference).cloned(),
            validity: self.validity_secs,
        }
    }
}
