//! Publish and expire transitions for issued tickets.
//!
//! A ticket is `Issued` while its record sits in `tickets/{id}`. Payment
//! moves it to `Published` (content renamed into the digest-keyed store,
//! record renamed to `.done`); an elapsed validity moves it to `Expired`
//! (record and staging renamed to `.expired`). Both are terminal.

use crate::error::Result;
use crate::event::{NodeEvent, NodeEventsSender};
use crate::storage::{Marker, TicketStore, Transition};
use crate::ticket::cache::TicketCache;
use crate::ticket::model::Ticket;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a publish request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// This call completed the transition.
    Published,
    /// The ticket had already been published.
    AlreadyPublished,
    /// No outstanding ticket has this id.
    UnknownTicket,
}

/// Counts from one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Outstanding records examined.
    pub scanned: usize,
    /// Records archived as expired.
    pub expired: usize,
    /// Records that could not be read or archived; retried next sweep.
    pub failed: usize,
}

/// Drives tickets from issued to published or expired.
pub struct TicketLifecycle {
    store: Arc<TicketStore>,
    tickets: TicketCache,
    events: NodeEventsSender,
}

impl TicketLifecycle {
    /// Create the state machine over a store and the shared ticket cache.
    #[must_use]
    pub fn new(store: Arc<TicketStore>, tickets: TicketCache, events: NodeEventsSender) -> Self {
        Self {
            store,
            tickets,
            events,
        }
    }

    /// The outstanding ticket for `id`, if any.
    ///
    /// Lookups are cached, including misses.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record exists but is unreadable.
    pub async fn ticket(&self, id: &str) -> Result<Option<Ticket>> {
        if let Some(cached) = self.tickets.get(id) {
            return Ok(cached);
        }
        let ticket = self.load(id).await?;
        self.tickets.insert(id.to_string(), ticket.clone());
        Ok(ticket)
    }

    async fn load(&self, id: &str) -> Result<Option<Ticket>> {
        match self.store.load(id).await? {
            Some(envelope) => Ok(Some(envelope.ticket()?)),
            None => Ok(None),
        }
    }

    /// Publish the content paid for by ticket `id`.
    ///
    /// Safe to call concurrently and repeatedly: the first caller moves the
    /// content, later callers observe the existing destination.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the content or record cannot be moved.
    pub async fn publish(&self, id: &str) -> Result<PublishOutcome> {
        let Some(ticket) = self.ticket(id).await? else {
            if self.store.is_archived(id, Marker::Done).await {
                return Ok(PublishOutcome::AlreadyPublished);
            }
            debug!("No outstanding ticket {}", id);
            return Ok(PublishOutcome::UnknownTicket);
        };

        let digest = &ticket.content.digest;
        self.store.publish_content(id, digest).await?;
        let archived = self.store.archive_ticket(id, Marker::Done).await?;
        // Only after archiving, so a concurrent caller that misses the cache
        // finds the `.done` record.
        self.tickets.invalidate(id);

        match archived {
            Transition::Moved => {
                info!("Published ticket {} (digest {})", id, digest);
                let _ = self.events.send(NodeEvent::ContentPublished {
                    id: id.to_string(),
                    digest: digest.clone(),
                });
                Ok(PublishOutcome::Published)
            }
            Transition::AlreadyDone => Ok(PublishOutcome::AlreadyPublished),
        }
    }

    /// Whether ticket `id` is past its validity now.
    ///
    /// Unknown ids are not expired.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record is unreadable.
    pub async fn is_expired(&self, id: &str) -> Result<bool> {
        self.is_expired_at(id, Utc::now()).await
    }

    /// Whether ticket `id` is past its validity at `now`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record is unreadable.
    pub async fn is_expired_at(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .ticket(id)
            .await?
            .is_some_and(|ticket| ticket.is_expired_at(now)))
    }

    /// Archive every outstanding ticket whose validity has elapsed.
    pub async fn sweep_expired(&self) -> SweepReport {
        self.sweep_expired_at(Utc::now()).await
    }

    /// Archive every outstanding ticket expired at `now`.
    ///
    /// Failures are logged and counted; the record stays in place and the
    /// next sweep retries it.
    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let ids = match self.store.active_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Expiry sweep could not list tickets: {}", e);
                report.failed += 1;
                return report;
            }
        };

        for id in ids {
            report.scanned += 1;

            // The store is authoritative here; the cache may hold a stale miss.
            let ticket = match self.tickets.get(&id) {
                Some(Some(ticket)) => Some(ticket),
                _ => match self.load(&id).await {
                    Ok(ticket) => ticket,
                    Err(e) => {
                        warn!("Expiry sweep could not read ticket {}: {}", id, e);
                        report.failed += 1;
                        continue;
                    }
                },
            };

            let Some(ticket) = ticket else { continue };
            if !ticket.is_expired_at(now) {
                continue;
            }

            match self.expire(&id).await {
                Ok(()) => report.expired += 1,
                Err(e) => {
                    warn!("Failed to expire ticket {}: {}", id, e);
                    report.failed += 1;
                }
            }
        }

        if report.expired > 0 || report.failed > 0 {
            info!(
                "Expiry sweep: {} scanned, {} expired, {} failed",
                report.scanned, report.expired, report.failed
            );
        }
        report
    }

    async fn expire(&self, id: &str) -> Result<()> {
        // Staging first: if the record rename fails the next sweep retries
        // both, and the staging rename then finds its target in place.
        if let Err(e) = self.store.archive_staging(id, Marker::Expired).await {
            warn!("Failed to archive staging for {}: {}", id, e);
        }
        self.store.archive_ticket(id, Marker::Expired).await?;
        self.tickets.invalidate(id);

        info!("Ticket {} expired unpaid", id);
        let _ = self
            .events
            .send(NodeEvent::TicketExpired { id: id.to_string() });
        Ok(())
    }
}
