//! The crate-wide error type. Every public, fallible operation in this crate returns
//! `Result<_, Error>`.

use thiserror::Error;

use crate::ids::{LocationID, RepositoryID};

#[derive(Debug, Error)]
pub enum Error {
    #[error("repository {0} already exists")]
    RepositoryExists(RepositoryID),

    #[error("repository {0} does not exist")]
    RepositoryNotExists(RepositoryID),

    #[error("location {0} does not exist")]
    LocationNotExists(LocationID),

    #[error("a read-write transaction is already open for location {0}")]
    InTransaction(LocationID),

    #[error("commit() called on a repository handle opened read-only")]
    NonTransactional,

    #[error("repository {0} was already closed")]
    RepoAlreadyClosed(RepositoryID),

    #[error("reference {0} is not addressable through this repository's rooted view")]
    NotRooted(String),

    #[error("check-and-set failed: {expected_name} did not hold the expected value")]
    ReferenceCheckFailed { expected_name: String },

    #[error("invalid repository id")]
    InvalidRepositoryID(#[from] crate::validate::Error),

    #[error("invalid reference name {name}")]
    InvalidReferenceName { name: String, #[source] source: git_validate::reference::name::Error },

    #[error(transparent)]
    Checkpoint(#[from] borges_checkpoint::Error),

    #[error("malformed JSON payload at {path}")]
    MalformedJson { path: String, #[source] source: serde_json::Error },

    #[error("malformed object id")]
    MalformedObjectId(#[from] git_hash::decode::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
