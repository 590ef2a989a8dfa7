//! Capability contract for payment-network modules.

use crate::config::PaymentConfig;
use crate::error::{Error, Result};
use crate::ticket::{PaymentOption, PaymentOptions};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// A payment seen on a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    /// Identifiers extracted from the payment's metadata. The first one is
    /// matched against envelope ids.
    pub tags: Vec<String>,
    /// Amount paid to the configured address, in the network's smallest
    /// unit. Modules report 0 when no output paid the address.
    pub value: u64,
}

impl PaymentInfo {
    /// Create an observation.
    #[must_use]
    pub fn new(tags: Vec<String>, value: u64) -> Self {
        Self { tags, value }
    }

    /// The tag matched against envelope ids.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tags.first().map(String::as_str)
    }
}

/// Sender handed to networks that push observations as they happen.
pub type PaymentSink = mpsc::Sender<PaymentInfo>;

/// What the node needs from a payment network.
///
/// Implementations own their ledger client, keys and request timeouts.
pub trait PaymentNetwork: Send + Sync {
    /// Network identifier, matched against configured payment options.
    fn name(&self) -> &str;

    /// Sign ticket bytes with the network key.
    ///
    /// # Errors
    ///
    /// Returns a `Signing` error if the key cannot sign.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;

    /// Payment address belonging to `key`.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error for keys the network does not understand.
    fn derive_address(&self, key: &str) -> Result<String>;

    /// Check that `signature` over `message` was made by the owner of
    /// `address`.
    fn verify_signature(&self, signature: &[u8], message: &[u8], address: &str) -> bool;

    /// Fetch recent payments. An empty list means nothing new.
    fn check_for_payments(&self) -> BoxFuture<'_, Result<Vec<PaymentInfo>>>;

    /// Start pushing observations into `sink`.
    ///
    /// Networks without a live subscription keep the default, which drops
    /// the sink.
    fn subscribe(&self, sink: PaymentSink) {
        drop(sink);
    }
}

/// Registered payment networks, in registration order.
#[derive(Clone, Default)]
pub struct PaymentNetworks {
    networks: Vec<Arc<dyn PaymentNetwork>>,
}

impl PaymentNetworks {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a network, replacing any earlier one with the same name.
    pub fn register(&mut self, network: Arc<dyn PaymentNetwork>) {
        info!("Registering payment network {}", network.name());
        self.networks.retain(|existing| existing.name() != network.name());
        self.networks.push(network);
    }

    /// Look up a network by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn PaymentNetwork>> {
        self.networks
            .iter()
            .find(|network| network.name() == name)
            .cloned()
    }

    /// Iterate over the registered networks.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn PaymentNetwork>> {
        self.networks.iter()
    }

    /// Number of registered networks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.networks.len()
    }

    /// Returns true if no network is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    /// Turn configured options into ticket payment options.
    ///
    /// Options without an explicit address get one derived from their key
    /// by the matching network.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if an address cannot be determined.
    pub fn resolve_options(&self, config: &PaymentConfig) -> Result<PaymentOptions> {
        let mut resolved = Vec::new();
        for option in config.options() {
            let address = match (&option.address, &option.key) {
                (Some(address), _) => address.clone(),
                (None, Some(key)) => {
                    let network = self.get(&option.network).ok_or_else(|| {
                        Error::Config(format!(
                            "no payment network registered to derive an address for {}",
                            option.network
                        ))
                    })?;
                    let address = network.derive_address(key)?;
                    debug!("Derived {} address {}", option.network, address);
                    address
                }
                (None, None) => {
                    return Err(Error::Config(format!(
                        "payment option for {} needs an address or a key",
                        option.network
                    )))
                }
            };
            resolved.push(PaymentOption {
                network: option.network.clone(),
                address,
                amount: option.amount,
            });
        }

        Ok(match config {
            PaymentConfig::None => PaymentOptions::None,
            PaymentConfig::Single(_) => resolved
                .pop()
                .map_or(PaymentOptions::None, PaymentOptions::Single),
            PaymentConfig::List(_) => PaymentOptions::List(resolved),
        })
    }
}
