//! A uniform, transactional abstraction over Git repositories packed inside shared pack
//! archive files.
//!
//! A [`Library`] registers one or more [`Location`]s (each a single pack archive). Each
//! `Location` namespaces the repositories packed inside it via remote-config entries;
//! [`Repository`] handles opened against it are always rooted to one such entry, so the
//! shared ref/object database underneath looks, from the caller's side, like an
//! ordinary, independent Git repository.
//!
//! ```text
//! Library
//!   └─ Registry (LRU-cached Location singletons, at-most-one-writer-per-archive)
//!        └─ Location (one pack archive: Checkpoint + ArchiveFilesystem + ref store)
//!             └─ Repository (RootedView over the shared ref store, ReadOnly/ReadWrite)
//! ```

pub mod error;
pub mod ids;
pub mod library;
pub mod location;
pub mod object_store;
pub mod registry;
pub mod remote_config;
pub mod repository;
pub mod rooted;
mod validate;

pub use error::Error;
pub use ids::{LocationID, Mode, RepositoryID};
pub use library::Library;
pub use location::Location;
pub use object_store::Target;
pub use registry::Registry;
pub use remote_config::RemoteConfig;
pub use repository::Repository;
pub use rooted::RootedView;

#[cfg(test)]
mod integration_tests {
    use std::sync::Arc;

    use borges_byte_store::{ByteStore, FsByteStore};

    use crate::{Library, LocationID, Mode, RepositoryID, Target};

    fn oid(byte: u8) -> git_hash::ObjectId {
        let hex: String = [byte; 20].iter().map(|b| format!("{b:02x}")).collect();
        git_hash::ObjectId::from_hex(hex.as_bytes()).unwrap()
    }

    /// End-to-end: two repositories sharing one archive, one committed, one rolled
    /// back, verifying both the rooted naming and the transactional isolation.
    #[test]
    fn two_repositories_share_one_archive_with_independent_histories() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ByteStore> = Arc::new(FsByteStore::new(dir.path()).unwrap());
        let library = Library::new(store, 8);
        let location_id = LocationID::new("gitserver.com.siva");
        library.register_location(location_id.clone(), "gitserver.com.siva").unwrap();

        let repo_a = RepositoryID::new("gitserver.com/a").unwrap();
        let a = library.init(&location_id, &repo_a).unwrap();
        a.set_reference("refs/heads/fix", Target::Peeled(oid(1))).unwrap();
        a.set_reference("refs/heads/master", Target::Peeled(oid(2))).unwrap();
        a.commit().unwrap();

        let repo_b = RepositoryID::new("gitserver.com/b").unwrap();
        let b = library.init(&location_id, &repo_b).unwrap();
        b.set_reference("refs/heads/fix", Target::Peeled(oid(3))).unwrap();
        b.commit().unwrap();

        let a_ro = library.get(&location_id, &repo_a, Mode::ReadOnly).unwrap();
        assert_eq!(a_ro.find_reference("refs/heads/fix").unwrap(), Some(Target::Peeled(oid(1))));
        assert_eq!(
            a_ro.find_reference("refs/remotes/origin/fix").unwrap(),
            Some(Target::Peeled(oid(3))),
            "b's branch should be visible from a's rooted view under origin/*"
        );
        a_ro.close().unwrap();
    }

    #[test]
    fn a_rolled_back_init_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ByteStore> = Arc::new(FsByteStore::new(dir.path()).unwrap());
        let library = Library::new(store, 8);
        let location_id = LocationID::new("a.siva");
        library.register_location(location_id.clone(), "a.siva").unwrap();

        let repo = RepositoryID::new("gitserver.com/a").unwrap();
        let handle = library.init(&location_id, &repo).unwrap();
        handle.set_reference("refs/heads/master", Target::Peeled(oid(1))).unwrap();
        handle.close().unwrap();

        assert!(!library.has(&repo).unwrap());
    }

    #[test]
    fn a_second_readwrite_transaction_is_rejected_while_the_first_is_open() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ByteStore> = Arc::new(FsByteStore::new(dir.path()).unwrap());
        let library = Library::new(store, 8);
        let location_id = LocationID::new("a.siva");
        library.register_location(location_id.clone(), "a.siva").unwrap();

        let repo_a = RepositoryID::new("gitserver.com/a").unwrap();
        let _first = library.init(&location_id, &repo_a).unwrap();

        let repo_b = RepositoryID::new("gitserver.com/b").unwrap();
        let err = library.init(&location_id, &repo_b).unwrap_err();
        assert!(matches!(err, crate::Error::InTransaction(_)));
    }
}
