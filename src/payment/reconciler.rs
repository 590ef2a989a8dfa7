//! Matching payment observations against outstanding tickets.

use crate::event::{NodeEvent, NodeEventsSender};
use crate::payment::network::PaymentInfo;
use crate::ticket::{is_envelope_id, PublishOutcome, TicketLifecycle};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What became of one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Payment covered the ticket and publish ran.
    Accepted(PublishOutcome),
    /// The observation carried no tags.
    Untagged,
    /// The first tag names no outstanding ticket.
    UnknownTicket,
    /// The ticket carries no payment option and cannot be paid.
    Unpriced,
    /// The ticket's validity elapsed before the payment was seen.
    Expired,
    /// The payment was smaller than the ticket's amount.
    Underpaid {
        /// Amount the ticket asks for.
        required: u64,
        /// Amount observed.
        paid: u64,
    },
    /// Publishing failed; the ticket stays outstanding.
    Failed(String),
}

impl Verdict {
    /// Returns true if the observation paid for a ticket.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Validates observations and publishes paid content.
pub struct PaymentReconciler {
    lifecycle: Arc<TicketLifecycle>,
    events: NodeEventsSender,
}

impl PaymentReconciler {
    /// Create a reconciler publishing through `lifecycle`.
    #[must_use]
    pub fn new(lifecycle: Arc<TicketLifecycle>, events: NodeEventsSender) -> Self {
        Self { lifecycle, events }
    }

    /// Reconcile one observation as of now.
    pub async fn reconcile(&self, info: &PaymentInfo) -> Verdict {
        self.reconcile_at(info, Utc::now()).await
    }

    /// Reconcile one observation seen at `now`.
    ///
    /// Accepted when the first tag names an outstanding ticket that is still
    /// within its validity and the value covers its amount. Everything else
    /// is dropped; nothing here is an error for the caller.
    pub async fn reconcile_at(&self, info: &PaymentInfo, now: DateTime<Utc>) -> Verdict {
        let Some(tag) = info.tag() else {
            debug!("Dropping untagged payment of {}", info.value);
            return Verdict::Untagged;
        };
        let id = tag.trim().to_ascii_lowercase();

        if !is_envelope_id(&id) {
            debug!("Payment tag {} is not an envelope id", tag);
            return Verdict::UnknownTicket;
        }

        let ticket = match self.lifecycle.ticket(&id).await {
            Ok(Some(ticket)) => ticket,
            Ok(None) => {
                debug!("Payment for unknown ticket {}", id);
                return Verdict::UnknownTicket;
            }
            Err(e) => {
                warn!("Could not read ticket {}: {}", id, e);
                return Verdict::Failed(e.to_string());
            }
        };

        let Some(option) = ticket.payment.as_ref() else {
            self.reject(&id, "ticket has no payment option");
            return Verdict::Unpriced;
        };

        // The sweep archives expired records later; until then they are
        // still on disk but no longer payable.
        if !ticket.is_payable_at(now) {
            self.reject(&id, "ticket validity elapsed");
            return Verdict::Expired;
        }

        if info.value < option.amount {
            self.reject(
                &id,
                &format!("paid {} of {} required", info.value, option.amount),
            );
            return Verdict::Underpaid {
                required: option.amount,
                paid: info.value,
            };
        }

        match self.lifecycle.publish(&id).await {
            Ok(PublishOutcome::UnknownTicket) => Verdict::UnknownTicket,
            Ok(outcome) => {
                info!(
                    "Payment of {} on {} accepted for {}",
                    info.value, option.network, id
                );
                Verdict::Accepted(outcome)
            }
            Err(e) => {
                warn!("Publishing {} failed: {}", id, e);
                let _ = self.events.send(NodeEvent::Error {
                    message: format!("publish {id} failed: {e}"),
                });
                Verdict::Failed(e.to_string())
            }
        }
    }

    fn reject(&self, id: &str, reason: &str) {
        info!("Rejected payment for {}: {}", id, reason);
        let _ = self.events.send(NodeEvent::PaymentRejected {
            tag: id.to_string(),
            reason: reason.to_string(),
        });
    }
}
