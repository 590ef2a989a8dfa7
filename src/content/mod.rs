//! Content identity for payable resources.
//!
//! Resources live under a read-only content root and are addressed by an
//! untrusted key (the request path). Their identity is the md5 digest of the
//! bytes, recomputed lazily and cached for a short freshness window.

mod hasher;

pub use hasher::{resolve_key, ContentHasher, DIGEST_ALGORITHM, HASH_FRESHNESS};
