//! A single pack archive, namespaced into logical repositories by remote-config entry.
//!
//! `Location` is what actually enforces at-most-one-writer-per-archive: every
//! read-write transaction goes through [`Location::begin_transaction`], which refuses a
//! second concurrent one. The [`crate::registry::Registry`] above it is only concerned
//! with caching and pinning `Location` singletons by id — the single-writer guarantee
//! lives here, one mutex per archive.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use borges_archive_fs::PackedArchiveFs;
use borges_byte_store::ByteStore;
use borges_checkpoint::Checkpoint;

use crate::error::Error;
use crate::ids::{LocationID, Mode, RepositoryID};
use crate::object_store::{PackedStorer, Storer};
use crate::remote_config::{RemoteConfig, SharedConfig};
use crate::repository::Repository;

struct LocationState {
    in_transaction: bool,
}

/// One pack archive, opened against a [`ByteStore`] at `archive_path`.
pub struct Location {
    id: LocationID,
    store: Arc<dyn ByteStore>,
    archive_path: PathBuf,
    checkpoint: Checkpoint,
    state: Mutex<LocationState>,
}

impl Location {
    /// Open (or lazily define) the location backed by `archive_path`. Applies any
    /// pending checkpoint truncation left over from an unclean shutdown before
    /// returning, so a freshly opened `Location` never exposes a partially-written tail.
    pub fn open(store: Arc<dyn ByteStore>, id: LocationID, archive_path: impl Into<PathBuf>) -> Result<Self, Error> {
        let archive_path = archive_path.into();
        let checkpoint = Checkpoint::new(store.clone(), archive_path.clone())?;
        checkpoint.apply()?;
        Ok(Self {
            id,
            store,
            archive_path,
            checkpoint,
            state: Mutex::new(LocationState { in_transaction: false }),
        })
    }

    pub fn id(&self) -> &LocationID {
        &self.id
    }

    fn open_read_only_fs(&self) -> Result<PackedArchiveFs, Error> {
        Ok(PackedArchiveFs::open(self.store.clone(), self.archive_path.clone())?)
    }

    /// Whether any remote entry in this location's shared config resolves (via its
    /// first URL) to `repo`.
    pub fn has(&self, repo: &RepositoryID) -> Result<bool, Error> {
        let fs = self.open_read_only_fs()?;
        Ok(SharedConfig::load(&fs)?.contains(repo.as_str()))
    }

    /// Every logical repository currently registered in this location, in remote-config
    /// order. An entry with no resolvable `to_repo_id` (not expected for anything this
    /// crate itself writes) is skipped rather than erroring.
    pub fn repositories(&self) -> Result<Vec<RepositoryID>, Error> {
        let fs = self.open_read_only_fs()?;
        SharedConfig::load(&fs)?
            .remotes
            .into_iter()
            .filter_map(|r| r.to_repo_id().map(str::to_string))
            .map(|id| RepositoryID::new(id).map_err(Error::from))
            .collect()
    }

    /// Register a brand-new repository and open it read-write. Fails if `repo` already
    /// has a remote-config entry.
    pub fn init(self: &Arc<Self>, repo: &RepositoryID) -> Result<Repository, Error> {
        if self.has(repo)? {
            return Err(Error::RepositoryExists(repo.clone()));
        }
        let mut storer = self.begin_transaction()?;
        let mut cfg = storer.load_config()?;
        cfg.insert(RemoteConfig::new(repo.as_str()));
        storer.save_config(&cfg)?;
        Ok(Repository::new(Arc::clone(self), repo.clone(), Storer::ReadWrite(storer)))
    }

    /// Open an already-registered repository. Fails if `repo` has no remote-config
    /// entry, or (for [`Mode::ReadWrite`]) if a transaction is already in progress.
    pub fn get(self: &Arc<Self>, repo: &RepositoryID, mode: Mode) -> Result<Repository, Error> {
        if !self.has(repo)? {
            return Err(Error::RepositoryNotExists(repo.clone()));
        }
        let storer = match mode {
            Mode::ReadOnly => Storer::ReadOnly(PackedStorer::new(Box::new(self.open_read_only_fs()?))),
            Mode::ReadWrite => Storer::ReadWrite(self.begin_transaction()?),
        };
        Ok(Repository::new(Arc::clone(self), repo.clone(), storer))
    }

    /// [`Location::get`] if `repo` exists, [`Location::init`] (always read-write)
    /// otherwise.
    pub fn get_or_init(self: &Arc<Self>, repo: &RepositoryID, mode: Mode) -> Result<Repository, Error> {
        if self.has(repo)? {
            self.get(repo, mode)
        } else {
            self.init(repo)
        }
    }

    fn begin_transaction(&self) -> Result<PackedStorer, Error> {
        {
            let mut state = self.state.lock();
            if state.in_transaction {
                return Err(Error::InTransaction(self.id.clone()));
            }
            state.in_transaction = true;
        }
        if let Err(e) = self.checkpoint.save() {
            self.state.lock().in_transaction = false;
            return Err(e.into());
        }
        let fs = match self.open_read_only_fs() {
            Ok(fs) => fs,
            Err(e) => {
                self.state.lock().in_transaction = false;
                return Err(e);
            }
        };
        Ok(PackedStorer::new(Box::new(fs)))
    }

    /// Flush `storer`'s overlay into the archive and retire the checkpoint, completing a
    /// read-write transaction.
    pub(crate) fn commit_transaction(&self, mut storer: PackedStorer) -> Result<(), Error> {
        storer.sync()?;
        self.checkpoint.reset()?;
        self.state.lock().in_transaction = false;
        Ok(())
    }

    /// Discard `storer`'s overlay and restore the archive to its pre-transaction length,
    /// abandoning a read-write transaction.
    pub(crate) fn rollback_transaction(&self, storer: PackedStorer) -> Result<(), Error> {
        drop(storer);
        self.checkpoint.apply()?;
        self.state.lock().in_transaction = false;
        Ok(())
    }

    /// A fresh read-only storer, independent of any in-progress transaction, for callers
    /// (e.g. [`crate::repository::Repository`]'s `Drop` finalizer) that need one without
    /// going through [`Location::get`].
    pub(crate) fn fresh_read_only_storer(&self) -> Result<PackedStorer, Error> {
        Ok(PackedStorer::new(Box::new(self.open_read_only_fs()?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use borges_byte_store::FsByteStore;

    fn open_location(dir: &std::path::Path) -> Arc<Location> {
        let store: Arc<dyn ByteStore> = Arc::new(FsByteStore::new(dir).unwrap());
        Arc::new(Location::open(store, LocationID::new("a.siva"), "a.siva").unwrap())
    }

    #[test]
    fn init_registers_the_repository_and_commit_makes_it_visible() {
        let dir = tempfile::tempdir().unwrap();
        let location = open_location(dir.path());
        let repo_id = RepositoryID::new("gitserver.com/a").unwrap();

        let repo = location.init(&repo_id).unwrap();
        repo.commit().unwrap();

        assert!(location.has(&repo_id).unwrap());
        assert_eq!(location.repositories().unwrap(), vec![repo_id]);
    }

    #[test]
    fn a_second_concurrent_write_transaction_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let location = open_location(dir.path());
        let a = RepositoryID::new("gitserver.com/a").unwrap();
        let b = RepositoryID::new("gitserver.com/b").unwrap();

        let _first = location.init(&a).unwrap();
        let err = location.init(&b).unwrap_err();
        assert!(matches!(err, Error::InTransaction(_)));
    }

    #[test]
    fn rollback_leaves_the_repository_unregistered() {
        let dir = tempfile::tempdir().unwrap();
        let location = open_location(dir.path());
        let repo_id = RepositoryID::new("gitserver.com/a").unwrap();

        let repo = location.init(&repo_id).unwrap();
        repo.close().unwrap();

        assert!(!location.has(&repo_id).unwrap());
    }

    #[test]
    fn get_on_an_unregistered_repository_fails() {
        let dir = tempfile::tempdir().unwrap();
        let location = open_location(dir.path());
        let repo_id = RepositoryID::new("gitserver.com/a").unwrap();
        assert!(matches!(location.get(&repo_id, Mode::ReadOnly).unwrap_err(), Error::RepositoryNotExists(_)));
    }
}
