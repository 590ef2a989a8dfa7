//! Request-path ticket issuance.

use crate::config::NodeConfig;
use crate::content::ContentHasher;
use crate::error::{Error, Result};
use crate::event::{NodeEvent, NodeEventsSender};
use crate::payment::PaymentNetworks;
use crate::storage::TicketStore;
use crate::ticket::builder::{PaymentOptions, TicketBuilder};
use crate::ticket::cache::{EnvelopeCache, TicketCache};
use crate::ticket::envelope::Envelope;
use crate::ticket::model::Ticket;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// An envelope ready for the 402 response, with the ticket it wraps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issued {
    /// Wire form.
    pub envelope: Envelope,
    /// Decoded ticket.
    pub ticket: Ticket,
}

/// Turns resource requests into signed, staged and persisted envelopes.
pub struct TicketIssuer {
    hasher: ContentHasher,
    builder: TicketBuilder,
    store: Arc<TicketStore>,
    networks: Arc<PaymentNetworks>,
    tickets: TicketCache,
    envelopes: EnvelopeCache,
    events: NodeEventsSender,
    ttl: u64,
    sign_timeout: Duration,
}

impl TicketIssuer {
    /// Create an issuer from node configuration and resolved payment options.
    #[must_use]
    pub fn new(
        config: &NodeConfig,
        options: PaymentOptions,
        store: Arc<TicketStore>,
        networks: Arc<PaymentNetworks>,
        tickets: TicketCache,
        events: NodeEventsSender,
    ) -> Self {
        Self {
            hasher: ContentHasher::new(store.content_root().to_path_buf()),
            builder: TicketBuilder::new(
                config.base_uri.clone(),
                config.validity_secs,
                config.date_resolution,
                options,
            ),
            store,
            networks,
            tickets,
            envelopes: EnvelopeCache::new(),
            events,
            ttl: config.ttl_secs,
            sign_timeout: config.sign_timeout(),
        }
    }

    /// Configured payment options.
    #[must_use]
    pub fn options(&self) -> &PaymentOptions {
        self.builder.options()
    }

    /// Issue an envelope for `key`, dated now.
    ///
    /// # Errors
    ///
    /// See [`TicketIssuer::issue_at`].
    pub async fn issue(&self, key: &str, preference: &[String]) -> Result<Issued> {
        self.issue_at(key, preference, Utc::now()).await
    }

    /// Issue an envelope for `key`, dated `now`.
    ///
    /// Identical tickets are served from the envelope cache without signing
    /// or touching the store again.
    ///
    /// # Errors
    ///
    /// `ContentUnavailable` if the resource cannot be hashed, `Signing` if the
    /// selected network fails or times out, and `StagingFailed` or
    /// `PersistFailed` on storage errors.
    pub async fn issue_at(
        &self,
        key: &str,
        preference: &[String],
        now: DateTime<Utc>,
    ) -> Result<Issued> {
        let digest = self.hasher.digest(key).await?;
        let ticket = self.builder.build_at(&digest, key, preference, now);
        let object = ticket.to_bytes()?;
        if ticket.is_expired_at(now) {
            warn!(
                "Ticket for {} is dated {} and already past its {}s validity",
                key, ticket.date, ticket.validity
            );
        }

        if let Some(envelope) = self.envelopes.get(&object) {
            // A published or expired id must be reissued so its staging and
            // record exist again.
            if self.tickets.is_live(&envelope.id) {
                debug!("Envelope cache hit for {} ({})", key, envelope.id);
                return Ok(Issued { envelope, ticket });
            }
        }

        let signature = match &ticket.payment {
            Some(option) => self.sign_bounded(&option.network, &object).await?,
            None => None,
        };

        let envelope = Envelope::new(object, signature, self.ttl);
        self.store.stage(key, &envelope.id).await?;
        self.store.persist(&envelope).await?;

        self.tickets
            .insert(envelope.id.clone(), Some(ticket.clone()));
        self.envelopes.insert(envelope.clone());

        info!("Issued ticket {} for {}", envelope.id, key);
        let _ = self.events.send(NodeEvent::TicketIssued {
            id: envelope.id.clone(),
            key: key.to_string(),
        });

        Ok(Issued { envelope, ticket })
    }

    async fn sign_bounded(&self, network: &str, object: &[u8]) -> Result<Option<Vec<u8>>> {
        let Some(module) = self.networks.get(network) else {
            debug!("No module for {}, issuing unsigned ticket", network);
            return Ok(None);
        };

        let message = object.to_vec();
        let task = tokio::task::spawn_blocking(move || module.sign(&message));

        match tokio::time::timeout(self.sign_timeout, task).await {
            Ok(Ok(Ok(signature))) => Ok(Some(signature)),
            Ok(Ok(Err(e))) => {
                warn!("{} signer failed: {}", network, e);
                Err(e)
            }
            Ok(Err(e)) => Err(Error::Signing(format!("{network} signer panicked: {e}"))),
            Err(_) => {
                warn!("{} signer timed out after {:?}", network, self.sign_timeout);
                Err(Error::Signing(format!(
                    "{network} signer timed out after {:?}",
                    self.sign_timeout
                )))
            }
        }
    }
}
