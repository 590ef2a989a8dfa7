//! Payment detection and reconciliation for swm-node.
//!
//! Payment networks are external modules behind the [`PaymentNetwork`]
//! capability contract. Observations reach the reconciler on two paths:
//!
//! ```text
//!   network push ──► mpsc channel ──┐
//!                                    ├──► PaymentReconciler ──► TicketLifecycle::publish
//!   poll cycle (fan-out, timeout) ───┘
//!        │
//!        └──► TicketLifecycle::sweep_expired (once per cycle)
//! ```

mod coordinator;
mod network;
mod reconciler;

pub use coordinator::{CycleReport, PollCoordinator, PUSH_CHANNEL_CAPACITY};
pub use network::{PaymentInfo, PaymentNetwork, PaymentNetworks, PaymentSink};
pub use reconciler::{PaymentReconciler, Verdict};
