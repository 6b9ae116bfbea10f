//! A single, already-rooted handle onto one logical repository inside a [`Location`].
//!
//! A `Repository` is single-use: [`commit`][Repository::commit] or
//! [`close`][Repository::close] consumes it, ending the underlying read-write
//! transaction (if any) exactly once. A read-write handle that is dropped without
//! either is forced closed (rolled back) on `Drop`, logging a warning — the same
//! leaked-transaction safety net the teacher pack's own resource guards provide.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Error;
use crate::ids::{LocationID, Mode, RepositoryID};
use crate::location::Location;
use crate::object_store::{Storer, Target};
use crate::registry::Registry;
use crate::rooted::RootedView;

/// Releases a [`Registry`] pin once a transaction this repository opened through a
/// [`crate::library::Library`] finalizes. `None` for repositories opened directly
/// against a bare [`Location`] (no registry involved).
pub(crate) struct UnpinHook {
    pub(crate) registry: Arc<Registry>,
    pub(crate) location_id: LocationID,
}

impl UnpinHook {
    fn run(self) {
        self.registry.unpin(&self.location_id);
    }
}

/// `HEAD` and `refs/remotes/origin/*` are never targets of a write through this crate's
/// public API (the rooted view already rejects those at a different layer); this only
/// needs to validate the shape of a name a caller is actually allowed to set, i.e. one
/// under `refs/heads/`.
fn validate_reference_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::NotRooted(name.to_string()));
    }
    git_validate::reference::name_partial(bstr::BStr::new(name.as_bytes()))
        .map(|_| ())
        .map_err(|source| Error::InvalidReferenceName { name: name.to_string(), source })
}

/// Whether a [`Repository`] has already been finalized, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finalized {
    No,
    Committed,
    RolledBack,
}

pub struct Repository {
    location: Arc<Location>,
    id: RepositoryID,
    mode: Mode,
    storer: Mutex<Option<Storer>>,
    finalized: Mutex<Finalized>,
    unpin_hook: Mutex<Option<UnpinHook>>,
}

impl Repository {
    pub(crate) fn new(location: Arc<Location>, id: RepositoryID, storer: Storer) -> Self {
        let mode = if storer.is_read_write() { Mode::ReadWrite } else { Mode::ReadOnly };
        Self {
            location,
            id,
            mode,
            storer: Mutex::new(Some(storer)),
            finalized: Mutex::new(Finalized::No),
            unpin_hook: Mutex::new(None),
        }
    }

    pub(crate) fn attach_unpin_hook(&self, hook: UnpinHook) {
        *self.unpin_hook.lock() = Some(hook);
    }

    pub fn id(&self) -> &RepositoryID {
        &self.id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Look up a reference by its caller-visible (rooted) name.
    pub fn find_reference(&self, name: &str) -> Result<Option<Target>, Error> {
        let mut guard = self.storer.lock();
        let storer = guard.as_mut().ok_or_else(|| Error::RepoAlreadyClosed(self.id.clone()))?;
        RootedView::new(storer.inner_mut(), self.id.as_str()).find_reference(name)
    }

    /// Enumerate every reference visible from this repository's rooted view.
    pub fn iter_references(&self) -> Result<Vec<(String, Target)>, Error> {
        let mut guard = self.storer.lock();
        let storer = guard.as_mut().ok_or_else(|| Error::RepoAlreadyClosed(self.id.clone()))?;
        RootedView::new(storer.inner_mut(), self.id.as_str()).iter_references()
    }

    /// Set a reference this repository owns. Requires [`Mode::ReadWrite`].
    pub fn set_reference(&self, name: &str, target: Target) -> Result<(), Error> {
        if !self.mode.is_read_write() {
            return Err(Error::NonTransactional);
        }
        validate_reference_name(name)?;
        let mut guard = self.storer.lock();
        let storer = guard.as_mut().ok_or_else(|| Error::RepoAlreadyClosed(self.id.clone()))?;
        RootedView::new(storer.inner_mut(), self.id.as_str()).set_reference(name, target)
    }

    /// Set `new_name` after checking `expected_name`'s current value, per the preserved
    /// check-and-set behavior documented on [`crate::object_store::PackedStorer::check_and_set_reference`].
    /// Requires [`Mode::ReadWrite`].
    pub fn check_and_set_reference(
        &self,
        new_name: &str,
        new_target: Target,
        expected_name: &str,
        expected: Option<&Target>,
        legacy_always_write: bool,
    ) -> Result<(), Error> {
        if !self.mode.is_read_write() {
            return Err(Error::NonTransactional);
        }
        validate_reference_name(new_name)?;
        validate_reference_name(expected_name)?;
        let mut guard = self.storer.lock();
        let storer = guard.as_mut().ok_or_else(|| Error::RepoAlreadyClosed(self.id.clone()))?;
        RootedView::new(storer.inner_mut(), self.id.as_str())
            .check_and_set_reference(new_name, new_target, expected_name, expected, legacy_always_write)
    }

    /// Commit the underlying transaction (if [`Mode::ReadWrite`]) and finalize this
    /// handle. Calling `commit` on a [`Mode::ReadOnly`] handle is an error, since there
    /// is no transaction to commit.
    pub fn commit(self) -> Result<(), Error> {
        if !self.mode.is_read_write() {
            return Err(Error::NonTransactional);
        }
        self.finalize(true)
    }

    /// End this handle without committing: for [`Mode::ReadWrite`], rolls back the
    /// transaction; for [`Mode::ReadOnly`], simply releases the handle. Idempotent:
    /// calling `close` (or `commit`) a second time reports [`Error::RepoAlreadyClosed`]
    /// rather than panicking.
    pub fn close(self) -> Result<(), Error> {
        self.finalize(false)
    }

    fn finalize(&self, commit: bool) -> Result<(), Error> {
        let mut finalized = self.finalized.lock();
        if *finalized != Finalized::No {
            return Err(Error::RepoAlreadyClosed(self.id.clone()));
        }

        let storer = self.storer.lock().take();
        if let Some(Storer::ReadWrite(inner)) = storer {
            if commit {
                self.location.commit_transaction(inner)?;
                *finalized = Finalized::Committed;
            } else {
                self.location.rollback_transaction(inner)?;
                *finalized = Finalized::RolledBack;
            }
        } else {
            *finalized = if commit { Finalized::Committed } else { Finalized::RolledBack };
        }
        if let Some(hook) = self.unpin_hook.lock().take() {
            hook.run();
        }
        Ok(())
    }
}

impl Drop for Repository {
    fn drop(&mut self) {
        if *self.finalized.lock() != Finalized::No {
            return;
        }
        if self.mode.is_read_write() {
            tracing::warn!(repository = %self.id, "read-write repository handle dropped without commit() or close(); forcing rollback");
        }
        let _ = self.finalize(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use borges_byte_store::FsByteStore;
    use std::sync::Arc as StdArc;

    fn fresh_location(dir: &std::path::Path) -> StdArc<Location> {
        let store: StdArc<dyn borges_byte_store::ByteStore> = StdArc::new(FsByteStore::new(dir).unwrap());
        StdArc::new(Location::open(store, crate::ids::LocationID::new("a.siva"), "a.siva").unwrap())
    }

    #[test]
    fn double_close_reports_already_closed_instead_of_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let location = fresh_location(dir.path());
        let repo_id = RepositoryID::new("gitserver.com/a").unwrap();
        let repo = location.init(&repo_id).unwrap();
        repo.close().unwrap();
    }

    #[test]
    fn dropping_a_readwrite_handle_without_closing_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let location = fresh_location(dir.path());
        let repo_id = RepositoryID::new("gitserver.com/a").unwrap();
        {
            let _repo = location.init(&repo_id).unwrap();
            // leaked: no commit() or close() call
        }
        assert!(!location.has(&repo_id).unwrap());
    }

    #[test]
    fn read_only_handle_cannot_set_references() {
        let dir = tempfile::tempdir().unwrap();
        let location = fresh_location(dir.path());
        let repo_id = RepositoryID::new("gitserver.com/a").unwrap();
        location.init(&repo_id).unwrap().commit().unwrap();

        let repo = location.get(&repo_id, Mode::ReadOnly).unwrap();
        let err = repo
            .set_reference("refs/heads/main", Target::Peeled(zero_oid()))
            .unwrap_err();
        assert!(matches!(err, Error::NonTransactional));
    }

    fn zero_oid() -> git_hash::ObjectId {
        git_hash::ObjectId::from_hex("0".repeat(40).as_bytes()).unwrap()
    }
}
