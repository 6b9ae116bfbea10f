//! The archive's shared configuration: the list of remote-config entries that give the
//! one underlying Git object database its logical repository boundaries.

use serde::{Deserialize, Serialize};

use borges_archive_fs::ArchiveFilesystem;

use crate::error::Error;

/// One remote entry in the archive's shared config, namespacing a single logical
/// repository within the archive. A repository is identified not by `name` directly but
/// by `to_repo_id`, which maps the entry's first URL to a
/// [`RepositoryID`][crate::ids::RepositoryID]: `name` is the remote's own label, `urls`
/// is what a [`RepositoryID`][crate::ids::RepositoryID] actually resolves through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub name: String,
    #[serde(default)]
    pub urls: Vec<String>,
}

impl RemoteConfig {
    /// A fresh entry for a newly registered repository: both `name` and the sole entry
    /// of `urls` are `repo_id`, so `to_repo_id` resolves it back to itself immediately.
    pub fn new(repo_id: impl Into<String>) -> Self {
        let repo_id = repo_id.into();
        Self {
            urls: vec![repo_id.clone()],
            name: repo_id,
        }
    }

    /// The `RepositoryID` this entry resolves to, taken from its first URL. `None` for
    /// an entry with no URLs at all (not expected for anything created through
    /// [`RemoteConfig::new`], but a config loaded from disk could in principle be bare).
    pub fn to_repo_id(&self) -> Option<&str> {
        self.urls.first().map(String::as_str)
    }
}

/// The full set of remote-config entries for one archive, persisted as a single JSON
/// blob at [`CONFIG_PATH`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SharedConfig {
    #[serde(default)]
    pub remotes: Vec<RemoteConfig>,
}

pub(crate) const CONFIG_PATH: &str = "config";

impl SharedConfig {
    pub fn load(fs: &dyn ArchiveFilesystem) -> Result<Self, Error> {
        match fs.read(CONFIG_PATH) {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|source| Error::MalformedJson {
                path: CONFIG_PATH.to_string(),
                source,
            }),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, fs: &mut dyn ArchiveFilesystem) -> Result<(), Error> {
        let bytes = serde_json::to_vec_pretty(self).map_err(|source| Error::MalformedJson {
            path: CONFIG_PATH.to_string(),
            source,
        })?;
        fs.write(CONFIG_PATH, bytes);
        Ok(())
    }

    /// The first remote entry (in registration order) whose `to_repo_id` is `repo_id`.
    /// Two entries could in principle resolve to the same `repo_id` (distinct remote
    /// names, same first URL); the first one registered wins.
    pub fn find(&self, repo_id: &str) -> Option<&RemoteConfig> {
        self.remotes.iter().find(|r| r.to_repo_id() == Some(repo_id))
    }

    pub fn contains(&self, repo_id: &str) -> bool {
        self.find(repo_id).is_some()
    }

    pub fn insert(&mut self, remote: RemoteConfig) {
        if let Some(existing) = self.remotes.iter_mut().find(|r| r.name == remote.name) {
            *existing = remote;
        } else {
            self.remotes.push(remote);
        }
    }
}
