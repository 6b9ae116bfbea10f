//! The reference store layered on top of an [`ArchiveFilesystem`]: a flat map from
//! physical reference name to [`Target`], persisted as a single JSON index.
//!
//! This crate deliberately does not reuse `git-ref`'s transaction vocabulary
//! (`RefEdit`/`Change`/`PreviousValue`) even though the teacher pack uses it directly —
//! this store's `check_and_set_reference` intentionally diverges from what that crate
//! would enforce (see [`PackedStorer::check_and_set_reference`]), so a local, narrower
//! set of types is the honest shape for what's actually implemented here.

use std::collections::BTreeMap;
use std::convert::TryFrom;

use git_hash::ObjectId;
use serde::{Deserialize, Serialize};

use borges_archive_fs::ArchiveFilesystem;

use crate::error::Error;
use crate::remote_config::SharedConfig;

pub(crate) const REFS_PATH: &str = "refs.json";

/// Where a reference points: directly at an object, or at another reference by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Peeled(ObjectId),
    Symbolic(String),
}

impl Target {
    pub fn as_id(&self) -> Option<&ObjectId> {
        match self {
            Target::Peeled(id) => Some(id),
            Target::Symbolic(_) => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
enum TargetRepr {
    Peeled(String),
    Symbolic(String),
}

impl From<&Target> for TargetRepr {
    fn from(t: &Target) -> Self {
        match t {
            Target::Peeled(id) => TargetRepr::Peeled(id.to_string()),
            Target::Symbolic(name) => TargetRepr::Symbolic(name.clone()),
        }
    }
}

impl TryFrom<TargetRepr> for Target {
    type Error = git_hash::decode::Error;

    fn try_from(repr: TargetRepr) -> Result<Self, Self::Error> {
        Ok(match repr {
            TargetRepr::Peeled(hex) => Target::Peeled(ObjectId::from_hex(hex.as_bytes())?),
            TargetRepr::Symbolic(name) => Target::Symbolic(name),
        })
    }
}

/// A single logical reference store shared by every repository packed into one archive.
/// [`crate::rooted::RootedView`] is what carves this flat namespace into the per-repository
/// view a [`crate::repository::Repository`] actually exposes.
pub struct PackedStorer {
    fs: Box<dyn ArchiveFilesystem>,
    refs_cache: Option<BTreeMap<String, Target>>,
}

impl PackedStorer {
    pub fn new(fs: Box<dyn ArchiveFilesystem>) -> Self {
        Self { fs, refs_cache: None }
    }

    fn load_refs(&self) -> Result<BTreeMap<String, Target>, Error> {
        match self.fs.read(REFS_PATH) {
            Some(bytes) => {
                let repr: BTreeMap<String, TargetRepr> =
                    serde_json::from_slice(&bytes).map_err(|source| Error::MalformedJson {
                        path: REFS_PATH.to_string(),
                        source,
                    })?;
                let mut out = BTreeMap::new();
                for (name, repr) in repr {
                    out.insert(name, Target::try_from(repr)?);
                }
                Ok(out)
            }
            None => Ok(BTreeMap::new()),
        }
    }

    fn persist_refs(&mut self, refs: &BTreeMap<String, Target>) -> Result<(), Error> {
        let repr: BTreeMap<String, TargetRepr> = refs.iter().map(|(k, v)| (k.clone(), TargetRepr::from(v))).collect();
        let bytes = serde_json::to_vec(&repr).map_err(|source| Error::MalformedJson {
            path: REFS_PATH.to_string(),
            source,
        })?;
        self.fs.write(REFS_PATH, bytes);
        Ok(())
    }

    fn cached_refs(&mut self) -> Result<&BTreeMap<String, Target>, Error> {
        if self.refs_cache.is_none() {
            self.refs_cache = Some(self.load_refs()?);
        }
        Ok(self.refs_cache.as_ref().expect("just populated"))
    }

    pub fn find_reference(&mut self, name: &str) -> Result<Option<Target>, Error> {
        Ok(self.cached_refs()?.get(name).cloned())
    }

    pub fn iter_references(&mut self) -> Result<Vec<(String, Target)>, Error> {
        Ok(self.cached_refs()?.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    pub fn set_reference(&mut self, name: &str, target: Target) -> Result<(), Error> {
        let mut refs = self.load_refs()?;
        refs.insert(name.to_string(), target);
        self.persist_refs(&refs)?;
        self.refs_cache = Some(refs);
        Ok(())
    }

    pub fn remove_reference(&mut self, name: &str) -> Result<(), Error> {
        let mut refs = self.load_refs()?;
        refs.remove(name);
        self.persist_refs(&refs)?;
        self.refs_cache = Some(refs);
        Ok(())
    }

    /// Set `new_name` to `new_target`, first checking that `expected_name` currently
    /// holds `expected` (note: `expected_name` need not be `new_name` — this mirrors the
    /// two-reference-argument shape of the original `CheckAndSetReference`, which the
    /// preserved test scenario below depends on).
    ///
    /// `legacy_always_write = true` reproduces a behavior observed in the original
    /// implementation's own test suite: when the check fails (the expected reference is
    /// absent or does not match), the write to `new_name` still happens rather than
    /// being rejected. This is a deliberately preserved quirk, not an oversight — see
    /// `DESIGN.md`. Passing `false` gets the corrected behavior: the write is rejected
    /// with [`Error::ReferenceCheckFailed`].
    pub fn check_and_set_reference(
        &mut self,
        new_name: &str,
        new_target: Target,
        expected_name: &str,
        expected: Option<&Target>,
        legacy_always_write: bool,
    ) -> Result<(), Error> {
        let refs = self.load_refs()?;
        let matches = match expected {
            None => true,
            Some(want) => refs.get(expected_name) == Some(want),
        };
        if !matches && !legacy_always_write {
            return Err(Error::ReferenceCheckFailed { expected_name: expected_name.to_string() });
        }
        self.set_reference(new_name, new_target)
    }

    pub fn load_config(&self) -> Result<SharedConfig, Error> {
        SharedConfig::load(self.fs.as_ref())
    }

    pub fn save_config(&mut self, cfg: &SharedConfig) -> Result<(), Error> {
        cfg.save(self.fs.as_mut())
    }

    pub fn sync(&mut self) -> std::io::Result<()> {
        self.fs.sync()
    }
}

/// Distinguishes, by tag rather than by probing the trait object, whether a storer
/// needs its overlay flushed on commit/close. Every storer this crate hands out is
/// backed by the same [`PackedStorer`]; the variants mark whether the handle is allowed
/// to mutate it, mirroring the original's `sto, ok := r.s.(*Storage)` type assertion
/// without resorting to runtime type tests here.
pub enum Storer {
    ReadOnly(PackedStorer),
    ReadWrite(PackedStorer),
}

impl Storer {
    pub fn inner_mut(&mut self) -> &mut PackedStorer {
        match self {
            Storer::ReadOnly(s) | Storer::ReadWrite(s) => s,
        }
    }

    pub fn inner(&self) -> &PackedStorer {
        match self {
            Storer::ReadOnly(s) | Storer::ReadWrite(s) => s,
        }
    }

    pub fn is_read_write(&self) -> bool {
        matches!(self, Storer::ReadWrite(_))
    }

    /// Flush the overlay if this is a read-write storer; a no-op for read-only ones.
    pub fn commit(&mut self) -> std::io::Result<()> {
        match self {
            Storer::ReadWrite(s) => s.sync(),
            Storer::ReadOnly(_) => Ok(()),
        }
    }
}
