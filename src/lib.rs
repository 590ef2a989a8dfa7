//! # swm-node
//!
//! Pay-per-resource content node. A request for a resource that has not been
//! paid for is answered with HTTP 402 and an envelope: a ticket naming the
//! content digest and price, signed by a payment network. The node watches
//! the configured payment networks and, once a payment tagged with the
//! envelope id covers the price, atomically publishes the content.
//!
//! ## Architecture
//!
//! - [`content`]: md5 identity of resources, cached for 60 seconds
//! - [`ticket`]: ticket building, envelope signing and the issue path
//! - [`storage`]: rename-based durable store for tickets and staged content
//! - [`payment`]: network capability contract, reconciler and poll loop
//! - [`wire`]: the 402 header set
//!
//! The HTTP transport, static file serving and ledger clients live outside
//! this crate; they plug in through [`RunningNode::issuer`] and
//! [`payment::PaymentNetwork`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use swm_node::{NodeBuilder, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::default();
//!     let mut node = NodeBuilder::new(config).build().await?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod content;
pub mod error;
pub mod event;
pub mod node;
pub mod payment;
pub mod storage;
pub mod ticket;
pub mod wire;

pub use config::{DateResolution, NodeConfig, PaymentConfig, PaymentOptionConfig};
pub use error::{Error, Result};
pub use event::{NodeEvent, NodeEventsChannel};
pub use node::{NodeBuilder, RunningNode};
pub use payment::{PaymentInfo, PaymentNetwork, PaymentReconciler, PollCoordinator, Verdict};
pub use ticket::{Envelope, Issued, PublishOutcome, Ticket, TicketIssuer, TicketLifecycle};
