//! Filesystem-backed ticket store with rename-based transitions.

use crate::content::resolve_key;
use crate::error::{Error, Result};
use crate::ticket::{is_envelope_id, Envelope};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

/// Archive marker appended to a record or staging directory name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Paid and published.
    Done,
    /// Validity elapsed unpaid.
    Expired,
}

impl Marker {
    fn suffix(self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Expired => "expired",
        }
    }
}

/// Outcome of a rename-based transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// This call performed the move.
    Moved,
    /// The destination already existed; another caller got there first.
    AlreadyDone,
}

/// Statistics about store operations.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Resources linked or copied into staging.
    pub staged: u64,
    /// Envelope records written.
    pub persisted: u64,
    /// Staging directories moved to the published store.
    pub published: u64,
    /// Records archived as done or expired.
    pub archived: u64,
}

/// Durable store for envelopes and staged content.
pub struct TicketStore {
    content_root: PathBuf,
    working_root: PathBuf,
    published_root: PathBuf,
    temp_counter: AtomicU64,
    stats: parking_lot::RwLock<StoreStats>,
}

impl TicketStore {
    /// Open the store, creating the working and published areas.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub async fn open(
        content_root: PathBuf,
        working_root: PathBuf,
        published_root: PathBuf,
    ) -> Result<Self> {
        let store = Self {
            content_root,
            working_root,
            published_root,
            temp_counter: AtomicU64::new(0),
            stats: parking_lot::RwLock::new(StoreStats::default()),
        };

        for dir in [store.tickets_dir(), store.staging_root(), store.published_root.clone()] {
            fs::create_dir_all(&dir).await.map_err(|e| {
                Error::Storage(format!("Failed to create {}: {e}", dir.display()))
            })?;
        }

        debug!(
            "Opened ticket store (working={}, published={})",
            store.working_root.display(),
            store.published_root.display()
        );

        Ok(store)
    }

    /// Link the resource for `key` into the staging directory of `id`.
    ///
    /// Falls back to copying when the filesystem refuses the hard link. An
    /// existing link is success.
    ///
    /// # Errors
    ///
    /// Returns `ContentUnavailable` for bad keys and `StagingFailed` for I/O
    /// failures.
    pub async fn stage(&self, key: &str, id: &str) -> Result<()> {
        let source = resolve_key(&self.content_root, key)?;
        let target = resolve_key(&self.staging_path(id), key)?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::StagingFailed(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        match fs::hard_link(&source, &target).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                trace!("Content for {} already staged", id);
                return Ok(());
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::ContentUnavailable {
                    key: key.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                debug!("Hard link for {} failed ({e}), copying instead", id);
                fs::copy(&source, &target).await.map_err(|e| {
                    Error::StagingFailed(format!("Failed to copy {key} into staging: {e}"))
                })?;
            }
        }

        self.stats.write().staged += 1;
        Ok(())
    }

    /// Write the envelope record for its id.
    ///
    /// Uses atomic write (temp file + rename) so readers never observe a
    /// partial record.
    ///
    /// # Errors
    ///
    /// Returns `PersistFailed` if the record cannot be written.
    pub async fn persist(&self, envelope: &Envelope) -> Result<()> {
        let record = envelope
            .to_record()
            .map_err(|e| Error::PersistFailed(e.to_string()))?;

        let path = self.ticket_path(&envelope.id);
        let seq = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let temp_path = self.tickets_dir().join(format!("{}.{seq}.tmp", envelope.id));

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::PersistFailed(format!("Failed to create temp file: {e}")))?;
        file.write_all(&record)
            .await
            .map_err(|e| Error::PersistFailed(format!("Failed to write record: {e}")))?;
        file.flush()
            .await
            .map_err(|e| Error::PersistFailed(format!("Failed to flush record: {e}")))?;
        drop(file);

        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| Error::PersistFailed(format!("Failed to rename temp file: {e}")))?;

        self.stats.write().persisted += 1;
        trace!("Persisted envelope {}", envelope.id);
        Ok(())
    }

    /// Read the outstanding envelope record for `id`.
    ///
    /// Returns `None` for malformed ids and for ids without an outstanding
    /// record (never issued, or already archived).
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record exists but cannot be read or
    /// parsed.
    pub async fn load(&self, id: &str) -> Result<Option<Envelope>> {
        if !is_envelope_id(id) {
            return Ok(None);
        }

        let bytes = match fs::read(self.ticket_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Storage(format!("Failed to read ticket {id}: {e}"))),
        };

        Envelope::from_record(&bytes)
            .map(Some)
            .map_err(|e| Error::Storage(format!("Corrupt ticket {id}: {e}")))
    }

    /// Ids of every outstanding (non-archived) record.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the tickets directory cannot be listed.
    pub async fn active_ids(&self) -> Result<Vec<String>> {
        let dir = self.tickets_dir();
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| Error::Storage(format!("Failed to list {}: {e}", dir.display())))?;

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::Storage(format!("Failed to list {}: {e}", dir.display())))?
        {
            if let Some(name) = entry.file_name().to_str() {
                if is_envelope_id(name) {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Returns true if the record for `id` carries `marker`.
    pub async fn is_archived(&self, id: &str, marker: Marker) -> bool {
        is_envelope_id(id)
            && fs::try_exists(self.archived_ticket_path(id, marker))
                .await
                .unwrap_or(false)
    }

    /// Move the staging directory of `id` to the published store under
    /// `digest`.
    ///
    /// A destination that already exists means the content is already
    /// published; the now redundant staging directory is removed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if neither the move happened nor the
    /// destination exists.
    pub async fn publish_content(&self, id: &str, digest: &str) -> Result<Transition> {
        let source = self.staging_path(id);
        let target = self.published_root.join(digest);

        let outcome = rename_once(&source, &target).await.map_err(|e| {
            Error::Storage(format!("Failed to publish {id} as {digest}: {e}"))
        })?;

        match outcome {
            Transition::Moved => {
                self.stats.write().published += 1;
                debug!("Published {} as {}", id, digest);
            }
            Transition::AlreadyDone => remove_redundant(&source, id).await,
        }
        Ok(outcome)
    }

    /// Rename the record of `id` to its archived name.
    ///
    /// # Errors
    ///
    /// Returns a storage error if neither the record nor its archived form
    /// exists.
    pub async fn archive_ticket(&self, id: &str, marker: Marker) -> Result<Transition> {
        let outcome = rename_once(&self.ticket_path(id), &self.archived_ticket_path(id, marker))
            .await
            .map_err(|e| Error::Storage(format!("Failed to archive ticket {id}: {e}")))?;
        if outcome == Transition::Moved {
            self.stats.write().archived += 1;
        }
        Ok(outcome)
    }

    /// Rename the staging directory of `id` to its archived name.
    ///
    /// An id issued again after it was archived leaves a fresh staging
    /// directory behind; once the archive exists that copy is removed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if neither the directory nor its archived
    /// form exists.
    pub async fn archive_staging(&self, id: &str, marker: Marker) -> Result<Transition> {
        let source = self.staging_path(id);
        let target = self.staging_root().join(format!("{id}.{}", marker.suffix()));
        let outcome = rename_once(&source, &target)
            .await
            .map_err(|e| Error::Storage(format!("Failed to archive staging for {id}: {e}")))?;

        if outcome == Transition::AlreadyDone {
            remove_redundant(&source, id).await;
        }
        Ok(outcome)
    }

    /// Get store statistics.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.stats.read().clone()
    }

    /// Root of the read-only resources.
    #[must_use]
    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    /// Root of the published store.
    #[must_use]
    pub fn published_root(&self) -> &Path {
        &self.published_root
    }

    /// Path of the outstanding record for `id`.
    #[must_use]
    pub fn ticket_path(&self, id: &str) -> PathBuf {
        self.tickets_dir().join(id)
    }

    /// Path of the staging directory for `id`.
    #[must_use]
    pub fn staging_path(&self, id: &str) -> PathBuf {
        self.staging_root().join(id)
    }

    /// Path content with `digest` is published under.
    #[must_use]
    pub fn published_path(&self, digest: &str) -> PathBuf {
        self.published_root.join(digest)
    }

    fn archived_ticket_path(&self, id: &str, marker: Marker) -> PathBuf {
        self.tickets_dir().join(format!("{id}.{}", marker.suffix()))
    }

    fn tickets_dir(&self) -> PathBuf {
        self.working_root.join("tickets")
    }

    fn staging_root(&self) -> PathBuf {
        self.working_root.join("content")
    }
}

/// Remove a staging directory whose content already lives elsewhere.
async fn remove_redundant(staging: &Path, id: &str) {
    if let Err(e) = fs::remove_dir_all(staging).await {
        if e.kind() != ErrorKind::NotFound {
            warn!("Failed to remove redundant staging for {}: {}", id, e);
        }
    }
}

/// Rename `from` to `to`, treating an existing destination as done.
async fn rename_once(from: &Path, to: &Path) -> std::io::Result<Transition> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(Transition::Moved),
        Err(e) => {
            if fs::try_exists(to).await.unwrap_or(false) {
                trace!("{} already present: {}", to.display(), e);
                Ok(Transition::AlreadyDone)
            } else {
                Err(e)
            }
        }
    }
}
