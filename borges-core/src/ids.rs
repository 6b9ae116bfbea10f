//! [`RepositoryID`], [`LocationID`] and [`Mode`] — the identifiers and access mode that
//! thread through every operation in this crate.

use std::fmt;

use crate::validate;

/// A non-empty string identifying one logical repository, by convention derived from a
/// remote URL. Unique within a [`Location`][crate::location::Location], not necessarily
/// unique across Locations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RepositoryID(String);

impl RepositoryID {
    /// Validate and wrap `id`.
    pub fn new(id: impl Into<String>) -> Result<Self, validate::Error> {
        let id = id.into();
        validate::repository_id(&id)?;
        Ok(Self(id))
    }

    /// The id as borrowed `str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepositoryID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RepositoryID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An opaque, unique identifier for one pack archive within a [`Library`][crate::library::Library].
///
/// For this crate's single supported addressing scheme, a `LocationID` is the
/// archive's path relative to the [`ByteStore`][borges_byte_store::ByteStore] root — see
/// `SPEC_FULL.md` §4.7 for why the Library resolves repositories this way.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocationID(String);

impl LocationID {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LocationID {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for LocationID {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Whether a [`Repository`][crate::repository::Repository] was opened for reading only
/// or for reading and writing. Determines whether a transaction is opened and which
/// overlay is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    ReadOnly,
    ReadWrite,
}

impl Mode {
    pub fn is_read_write(self) -> bool {
        matches!(self, Mode::ReadWrite)
    }
}
