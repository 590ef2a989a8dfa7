//! LRU caches for outstanding tickets and issued envelopes.
//!
//! The ticket cache maps envelope ids to decoded tickets. A `None` entry is
//! remembered as well: it marks an id that is unknown, published or expired,
//! so repeated observations for it never touch the disk.
//!
//! The envelope cache maps canonical ticket bytes to the envelope issued for
//! them, letting identical requests skip signing, staging and persisting.

use crate::ticket::envelope::Envelope;
use crate::ticket::model::Ticket;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default cache capacity.
const DEFAULT_CACHE_CAPACITY: usize = 100_000;

/// Cache statistics for monitoring.
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries added.
    pub additions: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

fn capacity(requested: usize) -> NonZeroUsize {
    NonZeroUsize::new(requested).unwrap_or(NonZeroUsize::MIN)
}

/// Cache of tickets keyed by envelope id.
#[derive(Clone)]
pub struct TicketCache {
    inner: Arc<Mutex<LruCache<String, Option<Ticket>>>>,
    stats: Arc<Mutex<CacheStats>>,
}

impl TicketCache {
    /// Create a new cache with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Create a new cache with the specified capacity.
    #[must_use]
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity(cap)))),
            stats: Arc::new(Mutex::new(CacheStats::default())),
        }
    }

    /// Look up an id.
    ///
    /// `None` means the id has never been seen; `Some(None)` means it is known
    /// to have no outstanding ticket.
    pub fn get(&self, id: &str) -> Option<Option<Ticket>> {
        let found = self.inner.lock().get(id).cloned();

        let mut stats = self.stats.lock();
        if found.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }

        found
    }

    /// Returns true if `id` has a live ticket in the cache.
    pub fn is_live(&self, id: &str) -> bool {
        matches!(self.inner.lock().peek(id), Some(Some(_)))
    }

    /// Remember the outcome of a lookup or an issue.
    pub fn insert(&self, id: String, ticket: Option<Ticket>) {
        self.inner.lock().put(id, ticket);
        self.stats.lock().additions += 1;
    }

    /// Mark `id` as no longer payable.
    pub fn invalidate(&self, id: &str) {
        self.inner.lock().put(id.to_string(), None);
    }

    /// Get current cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    /// Get the current number of entries in the cache.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for TicketCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache of envelopes keyed by canonical ticket bytes.
#[derive(Clone)]
pub struct EnvelopeCache {
    inner: Arc<Mutex<LruCache<Vec<u8>, Envelope>>>,
    stats: Arc<Mutex<CacheStats>>,
}

impl EnvelopeCache {
    /// Create a new cache with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Create a new cache with the specified capacity.
    #[must_use]
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity(cap)))),
            stats: Arc::new(Mutex::new(CacheStats::default())),
        }
    }

    /// Envelope previously issued for these ticket bytes.
    pub fn get(&self, object: &[u8]) -> Option<Envelope> {
        let found = self.inner.lock().get(object).cloned();

        let mut stats = self.stats.lock();
        if found.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }

        found
    }

    /// Remember an issued envelope.
    pub fn insert(&self, envelope: Envelope) {
        self.inner.lock().put(envelope.object.clone(), envelope);
        self.stats.lock().additions += 1;
    }

    /// Get current cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    /// Get the current number of entries in the cache.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for EnvelopeCache {
    fn default() -> Self {
        Self::new()
    }
}
