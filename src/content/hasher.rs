//! Streaming content hasher with a short-lived per-key cache.

use crate::error::{Error, Result};
use lru::LruCache;
use md5::{Digest, Md5};
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Digest algorithm advertised in tickets.
pub const DIGEST_ALGORITHM: &str = "md5";

/// How long a cached digest (or cached failure) is served verbatim.
pub const HASH_FRESHNESS: Duration = Duration::from_secs(60);

/// Default number of keys remembered.
const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Read buffer size for streaming files through the digest.
const READ_CHUNK: usize = 64 * 1024;

#[derive(Clone)]
struct HashEntry {
    outcome: std::result::Result<String, String>,
    computed_at: Instant,
}

/// Computes and caches content digests for resource keys.
pub struct ContentHasher {
    root: PathBuf,
    freshness: Duration,
    cache: Mutex<LruCache<String, HashEntry>>,
}

impl ContentHasher {
    /// Create a hasher for resources under `root`.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self::with_capacity(root, DEFAULT_CACHE_CAPACITY)
    }

    /// Create a hasher remembering at most `capacity` keys.
    #[must_use]
    pub fn with_capacity(root: PathBuf, capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            root,
            freshness: HASH_FRESHNESS,
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    /// The content root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Hex-encoded digest of the resource addressed by `key`.
    ///
    /// Results, including failures, are served from cache for
    /// [`HASH_FRESHNESS`] after they were computed.
    ///
    /// # Errors
    ///
    /// Returns `ContentUnavailable` if the key is not a plain relative path
    /// or the file cannot be read.
    pub async fn digest(&self, key: &str) -> Result<String> {
        if let Some(entry) = self.fresh_entry(key) {
            trace!("Digest cache hit for {}", key);
            return entry.outcome.map_err(|reason| unavailable(key, reason));
        }

        let outcome = match resolve_key(&self.root, key) {
            Ok(path) => hash_file(&path).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        debug!("Hashed {} -> {:?}", key, outcome);

        self.cache.lock().put(
            key.to_string(),
            HashEntry {
                outcome: outcome.clone(),
                computed_at: Instant::now(),
            },
        );

        outcome.map_err(|reason| unavailable(key, reason))
    }

    /// Drop every cached digest.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    fn fresh_entry(&self, key: &str) -> Option<HashEntry> {
        let mut cache = self.cache.lock();
        let entry = cache.get(key)?;
        if entry.computed_at.elapsed() <= self.freshness {
            Some(entry.clone())
        } else {
            None
        }
    }
}

fn unavailable(key: &str, reason: String) -> Error {
    Error::ContentUnavailable {
        key: key.to_string(),
        reason,
    }
}

/// Map an untrusted resource key onto a path below `root`.
///
/// Only plain relative paths are accepted: no root, prefix, `.` or `..`
/// components.
///
/// # Errors
///
/// Returns `ContentUnavailable` for empty or escaping keys.
pub fn resolve_key(root: &Path, key: &str) -> Result<PathBuf> {
    let relative = Path::new(key);
    let mut components = relative.components().peekable();
    if components.peek().is_none() {
        return Err(unavailable(key, "empty key".to_string()));
    }
    if components.any(|c| !matches!(c, Component::Normal(_))) {
        return Err(unavailable(key, "key escapes content root".to_string()));
    }
    Ok(root.join(relative))
}

async fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
