//! Tickets and their envelopes.
//!
//! ```text
//! key ──► ContentHasher ──► TicketBuilder ──► canonical bytes
//!                                                  │
//!                          EnvelopeCache hit? ◄────┤
//!                                                  ▼
//!                         PaymentNetwork::sign ──► Envelope { id = sha256(object ∥ sig) }
//!                                                  │
//!                         TicketStore::stage + persist ──► TicketCache
//! ```
//!
//! Issued tickets then move to published or expired through
//! [`TicketLifecycle`].

mod builder;
mod cache;
mod envelope;
mod issuer;
mod lifecycle;
mod model;

pub use builder::{PaymentOptions, TicketBuilder};
pub use cache::{CacheStats, EnvelopeCache, TicketCache};
pub(crate) use envelope::decode_base64;
pub use envelope::{envelope_id, is_envelope_id, Envelope, DEFAULT_TTL};
pub use issuer::{Issued, TicketIssuer};
pub use lifecycle::{PublishOutcome, SweepReport, TicketLifecycle};
pub use model::{truncate_date, ContentRef, PaymentOption, Ticket};
