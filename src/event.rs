//! Node event system.

use tokio::sync::broadcast;

/// Events emitted by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// Node has started successfully.
    Started,

    /// Node is shutting down.
    ShuttingDown,

    /// A new envelope was signed, staged and persisted.
    TicketIssued {
        /// Envelope identifier.
        id: String,
        /// Resource key the ticket was issued for.
        key: String,
    },

    /// Paid content moved to the published store.
    ContentPublished {
        /// Envelope identifier that was paid.
        id: String,
        /// Digest the content is published under.
        digest: String,
    },

    /// An unpaid ticket outlived its validity and was archived.
    TicketExpired {
        /// Envelope identifier.
        id: String,
    },

    /// A payment observation matched a ticket but could not be accepted.
    PaymentRejected {
        /// First tag of the observation.
        tag: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Error occurred.
    Error {
        /// Error message.
        message: String,
    },
}

/// Channel for receiving node events.
pub type NodeEventsChannel = broadcast::Receiver<NodeEvent>;

/// Sender for node events.
pub type NodeEventsSender = broadcast::Sender<NodeEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (NodeEventsSender, NodeEventsChannel) {
    broadcast::channel(256)
}
