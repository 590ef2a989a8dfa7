//! Durable ticket and content store.
//!
//! ```text
//! {working}/tickets/{id}             outstanding envelope record
//! {working}/tickets/{id}.done        paid and published
//! {working}/tickets/{id}.expired     validity elapsed unpaid
//! {working}/content/{id}/{key}       staged hard link to the resource
//! {working}/content/{id}.expired     staging archived on expiry
//! {published}/{digest}/{key}         publicly served after payment
//! ```
//!
//! Every state transition is a single `rename`, so a transition either fully
//! happens or not at all, and repeating it degrades to a no-op.

mod store;

pub use store::{Marker, StoreStats, TicketStore, Transition};
