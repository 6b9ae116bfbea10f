//! Crash-consistent checkpointing of a pack archive's "valid prefix length".
//!
//! A [`Checkpoint`] is the recovery anchor for one archive: before any append is made,
//! [`Checkpoint::save`] records the archive's current length in a sidecar file next to
//! it. If the process dies mid-append, the next [`Checkpoint::apply`] truncates the
//! archive back to that recorded length and removes the sidecar, so a half-written
//! append is never observable. A clean commit calls [`Checkpoint::reset`] instead,
//! dropping the sidecar without touching the archive.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use borges_byte_store::ByteStore;
use git_tempfile::{AutoRemove, ContainingDirectory};

/// Errors raised while saving, applying or resetting a checkpoint.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The underlying byte store failed.
    #[error("I/O error operating on checkpoint sidecar at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The sidecar exists but does not contain a parseable non-negative integer.
    #[error("checkpoint sidecar at {path} does not contain a valid offset")]
    MalformedData { path: PathBuf },
}

impl Error {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Error::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn malformed(path: &Path) -> Self {
        Error::MalformedData { path: path.to_path_buf() }
    }
}

fn sidecar_path_for(archive_path: &Path) -> PathBuf {
    let mut name = archive_path.as_os_str().to_os_string();
    name.push(".checkpoint");
    PathBuf::from(name)
}

/// The checkpoint for a single pack archive.
///
/// Holds no long-lived file handles; every operation re-reads or re-writes the sidecar
/// so that a `Checkpoint` can be created cheaply and kept around for the lifetime of its
/// owning `Location` without pinning any OS resources.
pub struct Checkpoint {
    store: Arc<dyn ByteStore>,
    archive_path: PathBuf,
    sidecar_path: PathBuf,
}

impl Checkpoint {
    /// Load (or lazily define) the checkpoint for `archive_path`.
    ///
    /// Does not itself create the sidecar — it only determines, per the contract, what
    /// the current valid offset *would be read as*: the sidecar's contents if present,
    /// the archive's current length if the archive exists but no sidecar does, or zero
    /// if neither exists yet (the archive is about to be created).
    pub fn new(store: Arc<dyn ByteStore>, archive_path: impl Into<PathBuf>) -> Result<Self, Error> {
        let archive_path = archive_path.into();
        let sidecar_path = sidecar_path_for(&archive_path);
        let checkpoint = Self {
            store,
            archive_path,
            sidecar_path,
        };
        // Surface malformed sidecar data eagerly rather than on first `save`/`apply`.
        if checkpoint.sidecar_exists()? {
            checkpoint.read_offset()?;
        }
        Ok(checkpoint)
    }

    /// The offset this checkpoint currently resolves to, per the rules in [`new`][Self::new].
    pub fn offset(&self) -> Result<u64, Error> {
        if self.sidecar_exists()? {
            self.read_offset()
        } else {
            let stat = self.store.stat(&self.archive_path).map_err(|e| Error::io(&self.archive_path, e))?;
            Ok(if stat.exists { stat.size } else { 0 })
        }
    }

    fn sidecar_exists(&self) -> Result<bool, Error> {
        Ok(self
            .store
            .stat(&self.sidecar_path)
            .map_err(|e| Error::io(&self.sidecar_path, e))?
            .exists)
    }

    fn read_offset(&self) -> Result<u64, Error> {
        let bytes = self
            .store
            .read_to_end(&self.sidecar_path)
            .map_err(|e| Error::io(&self.sidecar_path, e))?;
        let text = std::str::from_utf8(&bytes).map_err(|_| Error::malformed(&self.sidecar_path))?;
        text.trim().parse::<u64>().map_err(|_| Error::malformed(&self.sidecar_path))
    }

    /// Record the archive's current length into the sidecar, atomically.
    ///
    /// Writes through a named temp file registered with `git-tempfile`'s global
    /// cleanup registry, then renames it into place: if the process is killed or
    /// receives a fatal signal between the write and the rename, the registry removes
    /// the orphaned temp file on unwind instead of leaving a stray file next to the
    /// sidecar (and, critically, never leaves a half-written sidecar where a reader
    /// could observe a truncated integer).
    pub fn save(&self) -> Result<(), Error> {
        let len = self
            .store
            .stat(&self.archive_path)
            .map_err(|e| Error::io(&self.archive_path, e))?
            .size;

        let sidecar_dir = self.store.root().join(&self.sidecar_path).parent().map(Path::to_path_buf).unwrap_or_else(|| self.store.root().to_path_buf());
        std::fs::create_dir_all(&sidecar_dir).map_err(|e| Error::io(&sidecar_dir, e))?;

        let mut tmp = git_tempfile::new(&sidecar_dir, ContainingDirectory::Exists, AutoRemove::Tempfile)
            .map_err(|e| Error::io(&sidecar_dir, e))?;
        {
            use std::io::Write;
            write!(tmp, "{len}").map_err(|e| Error::io(&self.sidecar_path, e))?;
        }
        let sidecar_full_path = self.store.root().join(&self.sidecar_path);
        tmp.persist(&sidecar_full_path)
            .map_err(|e| Error::io(&self.sidecar_path, e))?;
        Ok(())
    }

    /// Restore crash consistency: if a sidecar exists and names an offset shorter than
    /// the archive's current length, truncate the archive back to it. Either way, the
    /// sidecar is removed afterwards. A no-op if no sidecar exists. Idempotent:
    /// calling `apply` twice in a row behaves exactly like calling it once.
    pub fn apply(&self) -> Result<(), Error> {
        if !self.sidecar_exists()? {
            return Ok(());
        }
        let offset = self.read_offset()?;
        let archive_len = self
            .store
            .stat(&self.archive_path)
            .map_err(|e| Error::io(&self.archive_path, e))?
            .size;
        if offset < archive_len {
            self.store
                .truncate(&self.archive_path, offset)
                .map_err(|e| Error::io(&self.archive_path, e))?;
        }
        self.store
            .remove(&self.sidecar_path)
            .map_err(|e| Error::io(&self.sidecar_path, e))?;
        Ok(())
    }

    /// Drop the sidecar without truncating, used after a successful commit once the
    /// archive's new length is itself the valid prefix.
    pub fn reset(&self) -> Result<(), Error> {
        self.store
            .remove(&self.sidecar_path)
            .map_err(|e| Error::io(&self.sidecar_path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use borges_byte_store::FsByteStore;

    fn store(dir: &std::path::Path) -> Arc<dyn ByteStore> {
        Arc::new(FsByteStore::new(dir).unwrap())
    }

    #[test]
    fn new_archive_has_zero_offset() {
        let dir = tempfile::tempdir().unwrap();
        let cp = Checkpoint::new(store(dir.path()), "a.siva").unwrap();
        assert_eq!(cp.offset().unwrap(), 0);
    }

    #[test]
    fn existing_archive_without_sidecar_treats_current_length_as_valid() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        s.write_new(Path::new("a.siva"), b"0123456789").unwrap();
        let cp = Checkpoint::new(s, "a.siva").unwrap();
        assert_eq!(cp.offset().unwrap(), 10);
    }

    #[test]
    fn save_then_apply_with_no_append_is_idempotent_noop() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        s.write_new(Path::new("a.siva"), b"0123456789").unwrap();
        let cp = Checkpoint::new(s.clone(), "a.siva").unwrap();

        cp.save().unwrap();
        assert_eq!(s.read_to_end(Path::new("a.siva.checkpoint")).unwrap(), b"10");

        cp.apply().unwrap();
        assert_eq!(s.read_to_end(Path::new("a.siva")).unwrap().len(), 10);
        assert!(!s.stat(Path::new("a.siva.checkpoint")).unwrap().exists);

        // idempotent: applying again when there is no sidecar is a no-op.
        cp.apply().unwrap();
        assert!(!s.stat(Path::new("a.siva.checkpoint")).unwrap().exists);
    }

    #[test]
    fn apply_truncates_back_to_saved_offset_after_a_simulated_crash() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        s.write_new(Path::new("a.siva"), b"0123456789").unwrap();
        let cp = Checkpoint::new(s.clone(), "a.siva").unwrap();

        cp.save().unwrap();
        // Simulate an append that was interrupted mid-flight, leaving the archive
        // longer than the checkpoint but never calling `reset`.
        s.append(Path::new("a.siva"), b"garbage-from-a-partial-write").unwrap();

        cp.apply().unwrap();

        assert_eq!(s.read_to_end(Path::new("a.siva")).unwrap(), b"0123456789");
        assert!(!s.stat(Path::new("a.siva.checkpoint")).unwrap().exists);
    }

    #[test]
    fn apply_is_idempotent_when_called_twice_after_a_crash() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        s.write_new(Path::new("a.siva"), b"hello").unwrap();
        let cp = Checkpoint::new(s.clone(), "a.siva").unwrap();
        cp.save().unwrap();
        s.append(Path::new("a.siva"), b"trailing").unwrap();

        cp.apply().unwrap();
        let after_first = s.read_to_end(Path::new("a.siva")).unwrap();
        cp.apply().unwrap();
        let after_second = s.read_to_end(Path::new("a.siva")).unwrap();

        assert_eq!(after_first, after_second);
        assert_eq!(after_first, b"hello");
    }

    #[test]
    fn reset_is_idempotent_and_never_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        s.write_new(Path::new("a.siva"), b"hello-world").unwrap();
        let cp = Checkpoint::new(s.clone(), "a.siva").unwrap();
        cp.save().unwrap();
        s.append(Path::new("a.siva"), b"-more").unwrap();

        cp.reset().unwrap();
        assert_eq!(s.read_to_end(Path::new("a.siva")).unwrap(), b"hello-world-more");
        assert!(!s.stat(Path::new("a.siva.checkpoint")).unwrap().exists);

        cp.reset().unwrap();
        assert!(!s.stat(Path::new("a.siva.checkpoint")).unwrap().exists);
    }

    #[test]
    fn malformed_sidecar_is_reported_rather_than_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        s.write_new(Path::new("a.siva"), b"hello").unwrap();
        s.write_new(Path::new("a.siva.checkpoint"), b"not-a-number").unwrap();

        let err = Checkpoint::new(s, "a.siva").unwrap_err();
        assert!(matches!(err, Error::MalformedData { .. }));
    }
}
