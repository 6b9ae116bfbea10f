//! The root handle: a set of registered [`Location`]s, addressed by [`LocationID`], with
//! repositories resolved across all of them.
//!
//! The base spec leaves open how a bare [`RepositoryID`] maps to the [`LocationID`] that
//! holds it. This crate resolves it the way documented in `SPEC_FULL.md` §4.7:
//! `has`/`repositories` scan every registered location (in registration order, so the
//! result is deterministic), while anything that can *start a transaction*
//! (`init`/`get`/`get_or_init`) takes an explicit `location_id` instead of guessing —
//! starting a transaction against the wrong archive is not a mistake this API lets you
//! make silently.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use borges_byte_store::ByteStore;

use crate::error::Error;
use crate::ids::{LocationID, Mode, RepositoryID};
use crate::location::Location;
use crate::registry::Registry;
use crate::repository::{Repository, UnpinHook};

struct Registration {
    id: LocationID,
    archive_path: PathBuf,
}

/// The root of this crate's object model: register archives as locations, then open
/// repositories by `(location, repository)` or resolve a bare [`RepositoryID`] across
/// every registered location.
pub struct Library {
    registry: Arc<Registry>,
    registrations: Mutex<Vec<Registration>>,
}

impl Library {
    pub fn new(store: Arc<dyn ByteStore>, cache_capacity: usize) -> Self {
        Self {
            registry: Arc::new(Registry::new(store, cache_capacity)),
            registrations: Mutex::new(Vec::new()),
        }
    }

    /// Register `archive_path` under `id`, opening it (applying any pending checkpoint
    /// recovery) immediately. Re-registering an already-known `id` is a no-op beyond
    /// re-touching the registry cache.
    pub fn register_location(&self, id: LocationID, archive_path: impl Into<PathBuf>) -> Result<(), Error> {
        let archive_path = archive_path.into();
        self.registry.get_or_open(id.clone(), archive_path.clone())?;
        let mut registrations = self.registrations.lock();
        if !registrations.iter().any(|r| r.id == id) {
            registrations.push(Registration { id, archive_path });
        }
        Ok(())
    }

    /// The singleton [`Location`] for a registered `id`.
    pub fn location(&self, id: &LocationID) -> Result<Arc<Location>, Error> {
        let archive_path = self
            .registrations
            .lock()
            .iter()
            .find(|r| r.id == *id)
            .map(|r| r.archive_path.clone())
            .ok_or_else(|| Error::LocationNotExists(id.clone()))?;
        self.registry.get_or_open(id.clone(), archive_path)
    }

    fn registered_ids(&self) -> Vec<LocationID> {
        self.registrations.lock().iter().map(|r| r.id.clone()).collect()
    }

    /// Whether any registered location holds `repo`, scanning in registration order.
    pub fn has(&self, repo: &RepositoryID) -> Result<bool, Error> {
        for id in self.registered_ids() {
            if self.location(&id)?.has(repo)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Every repository across every registered location, chained in registration
    /// order.
    pub fn repositories(&self) -> Result<Vec<RepositoryID>, Error> {
        let mut out = Vec::new();
        for id in self.registered_ids() {
            out.extend(self.location(&id)?.repositories()?);
        }
        Ok(out)
    }

    /// Register a brand-new repository inside `location_id` and open it read-write.
    pub fn init(&self, location_id: &LocationID, repo: &RepositoryID) -> Result<Repository, Error> {
        let location = self.location(location_id)?;
        self.registry.pin(location_id);
        match location.init(repo) {
            Ok(repository) => {
                repository.attach_unpin_hook(UnpinHook {
                    registry: Arc::clone(&self.registry),
                    location_id: location_id.clone(),
                });
                Ok(repository)
            }
            Err(e) => {
                self.registry.unpin(location_id);
                Err(e)
            }
        }
    }

    /// Open an already-registered repository inside `location_id`.
    pub fn get(&self, location_id: &LocationID, repo: &RepositoryID, mode: Mode) -> Result<Repository, Error> {
        let location = self.location(location_id)?;
        if mode.is_read_write() {
            self.registry.pin(location_id);
        }
        match location.get(repo, mode) {
            Ok(repository) => {
                if mode.is_read_write() {
                    repository.attach_unpin_hook(UnpinHook {
                        registry: Arc::clone(&self.registry),
                        location_id: location_id.clone(),
                    });
                }
                Ok(repository)
            }
            Err(e) => {
                if mode.is_read_write() {
                    self.registry.unpin(location_id);
                }
                Err(e)
            }
        }
    }

    /// [`Library::get`] if `repo` already exists in `location_id`, [`Library::init`]
    /// (always read-write) otherwise.
    pub fn get_or_init(&self, location_id: &LocationID, repo: &RepositoryID, mode: Mode) -> Result<Repository, Error> {
        if self.location(location_id)?.has(repo)? {
            self.get(location_id, repo, mode)
        } else {
            self.init(location_id, repo)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use borges_byte_store::FsByteStore;

    fn library(dir: &std::path::Path) -> Library {
        let store: Arc<dyn ByteStore> = Arc::new(FsByteStore::new(dir).unwrap());
        Library::new(store, 8)
    }

    #[test]
    fn has_and_repositories_scan_every_registered_location() {
        let dir = tempfile::tempdir().unwrap();
        let lib = library(dir.path());
        lib.register_location(LocationID::new("a.siva"), "a.siva").unwrap();
        lib.register_location(LocationID::new("b.siva"), "b.siva").unwrap();

        let repo_a = RepositoryID::new("gitserver.com/a").unwrap();
        let repo_b = RepositoryID::new("gitserver.com/b").unwrap();
        lib.init(&LocationID::new("a.siva"), &repo_a).unwrap().commit().unwrap();
        lib.init(&LocationID::new("b.siva"), &repo_b).unwrap().commit().unwrap();

        assert!(lib.has(&repo_a).unwrap());
        assert!(lib.has(&repo_b).unwrap());
        let mut repos: Vec<String> = lib.repositories().unwrap().iter().map(|r| r.as_str().to_string()).collect();
        repos.sort();
        assert_eq!(repos, vec!["gitserver.com/a".to_string(), "gitserver.com/b".to_string()]);
    }

    #[test]
    fn committing_releases_the_registry_pin() {
        let dir = tempfile::tempdir().unwrap();
        let lib = library(dir.path());
        let location_id = LocationID::new("a.siva");
        lib.register_location(location_id.clone(), "a.siva").unwrap();
        let repo = RepositoryID::new("gitserver.com/a").unwrap();

        let handle = lib.init(&location_id, &repo).unwrap();
        handle.commit().unwrap();

        // A second read-write transaction against the same location now succeeds,
        // which would fail with Error::InTransaction if the pin had leaked.
        let repo2 = RepositoryID::new("gitserver.com/b").unwrap();
        let handle2 = lib.init(&location_id, &repo2).unwrap();
        handle2.commit().unwrap();
    }

    #[test]
    fn get_or_init_initializes_a_missing_repository() {
        let dir = tempfile::tempdir().unwrap();
        let lib = library(dir.path());
        let location_id = LocationID::new("a.siva");
        lib.register_location(location_id.clone(), "a.siva").unwrap();
        let repo = RepositoryID::new("gitserver.com/a").unwrap();

        let handle = lib.get_or_init(&location_id, &repo, Mode::ReadWrite).unwrap();
        assert_eq!(handle.mode(), Mode::ReadWrite);
        handle.commit().unwrap();
        assert!(lib.has(&repo).unwrap());
    }
}
