//! Rewrites the one flat, archive-wide reference namespace a [`PackedStorer`] holds into
//! the per-repository view a caller actually sees, so that each remote-config entry
//! looks like an independent repository.
//!
//! Physical layout (one archive, N logical repos):
//!   refs/remotes/<R>/heads/<name>   -- R's own branches
//!   refs/remotes/<R>/HEAD           -- R's own HEAD, peeled or one level of symbolic
//!
//! Logical view, from inside repository R:
//!   refs/heads/<name>               <- refs/remotes/<R>/heads/<name>
//!   HEAD                            <- refs/remotes/<R>/HEAD, always surfaced as a hash
//!   refs/remotes/origin/<name>      <- another remote S's refs/remotes/<S>/heads/<name>
//!   refs/remotes/origin/HEAD        <- that other remote's HEAD, also as a hash
//!
//! Collapsing a symbolic HEAD to the hash it resolves to, rather than preserving the
//! symbolic link, is a deliberate, preserved simplification carried over from the
//! original design (see `DESIGN.md`) and not something this module tries to fix.

use crate::error::Error;
use crate::object_store::{PackedStorer, Target};

/// The conventional name every other remote is surfaced under, regardless of its own
/// identity. Only one other remote is expected per archive in the scenarios this crate
/// is built against; see `DESIGN.md` for what happens if more than one is present.
pub const PEER_ALIAS: &str = "origin";

fn physical_prefix(repo: &str) -> String {
    format!("refs/remotes/{repo}/")
}

/// The physical name a write to `logical` (as seen from inside repository `own`) lands
/// at, or `None` if `logical` is not a name this repository is allowed to write (writes
/// are only supported for the repository's own `refs/heads/*`).
pub fn logical_to_physical(own: &str, logical: &str) -> Option<String> {
    let name = logical.strip_prefix("refs/heads/")?;
    Some(format!("{}heads/{}", physical_prefix(own), name))
}

/// Split `rest` (the part of a physical name after `refs/remotes/`) into the remote id
/// it's parked under and whatever follows, by matching against the actual set of
/// registered remote ids rather than guessing at a single path segment. RepositoryIDs
/// are URL-shaped and routinely contain their own slashes (`gitserver.com/a`), so a
/// blind `split_once('/')` would truncate `gitserver.com/a` down to just
/// `gitserver.com`. Remotes are tried longest-id-first so that one id being a prefix of
/// another can't steal a match that belongs to the longer one.
fn split_remote_id<'a>(rest: &'a str, known_remotes: &[String]) -> Option<(&'a str, &'a str)> {
    let mut candidates: Vec<&str> = known_remotes.iter().map(String::as_str).collect();
    candidates.sort_by_key(|c| std::cmp::Reverse(c.len()));
    for remote in candidates {
        if let Some(path) = rest.strip_prefix(remote).and_then(|p| p.strip_prefix('/')) {
            return Some((remote, path));
        }
    }
    None
}

/// The logical name `physical` (a name in the archive-wide namespace) is surfaced under
/// from inside repository `own`, or `None` if it falls outside `refs/remotes/*` entirely,
/// or belongs to a remote id this archive has no record of, and so isn't part of the
/// rooted view at all. `known_remotes` is every registered remote id, `own` included.
pub fn physical_to_logical(own: &str, physical: &str, known_remotes: &[String]) -> Option<String> {
    let rest = physical.strip_prefix("refs/remotes/")?;
    // `own` is always a valid candidate, even if this archive's shared config hasn't
    // (yet, or ever) registered it under its own id, since the caller is by definition
    // asking from inside that repository's own view. It's folded in alongside the
    // config's remotes so the longest-match ordering still picks the right one when one
    // id happens to be a prefix of another.
    let mut candidates = known_remotes.to_vec();
    if !candidates.iter().any(|r| r == own) {
        candidates.push(own.to_string());
    }
    let (remote, path) = split_remote_id(rest, &candidates)?;
    if remote == own {
        if path == "HEAD" {
            Some("HEAD".to_string())
        } else {
            Some(format!("refs/{path}"))
        }
    } else if path == "HEAD" {
        Some(format!("refs/remotes/{PEER_ALIAS}/HEAD"))
    } else {
        let trimmed = path.strip_prefix("heads/").unwrap_or(path);
        Some(format!("refs/remotes/{PEER_ALIAS}/{trimmed}"))
    }
}

/// Follow at most one level of symbolic indirection to a hash. HEAD is always surfaced
/// this way: if it is symbolic, the ref it points at is expected to be peeled already.
fn resolve_to_hash(storer: &mut PackedStorer, physical_name: &str) -> Result<Option<git_hash::ObjectId>, Error> {
    match storer.find_reference(physical_name)? {
        None => Ok(None),
        Some(Target::Peeled(id)) => Ok(Some(id)),
        Some(Target::Symbolic(target_name)) => match storer.find_reference(&target_name)? {
            Some(Target::Peeled(id)) => Ok(Some(id)),
            _ => Ok(None),
        },
    }
}

/// A per-repository view over a shared [`PackedStorer`].
pub struct RootedView<'a> {
    storer: &'a mut PackedStorer,
    own: String,
}

impl<'a> RootedView<'a> {
    pub fn new(storer: &'a mut PackedStorer, own: impl Into<String>) -> Self {
        Self { storer, own: own.into() }
    }

    /// Every remote id registered in this archive's shared config, `own` included, in
    /// registration order.
    fn known_remote_ids(&mut self) -> Result<Vec<String>, Error> {
        Ok(self
            .storer
            .load_config()?
            .remotes
            .iter()
            .filter_map(|r| r.to_repo_id().map(str::to_string))
            .collect())
    }

    /// The full remote id of some remote other than `own`, if this archive has one
    /// registered yet.
    fn peer_remote_id(&mut self) -> Result<Option<String>, Error> {
        Ok(self.known_remote_ids()?.into_iter().find(|id| id != &self.own))
    }

    /// The physical prefix under which some remote other than `own` is parked, if any
    /// is registered yet.
    fn peer_physical_prefix(&mut self) -> Result<Option<String>, Error> {
        Ok(self.peer_remote_id()?.map(|remote| format!("refs/remotes/{remote}/")))
    }

    pub fn find_reference(&mut self, logical: &str) -> Result<Option<Target>, Error> {
        if logical == "HEAD" {
            let physical = format!("{}HEAD", physical_prefix(&self.own));
            return Ok(resolve_to_hash(self.storer, &physical)?.map(Target::Peeled));
        }

        if logical == format!("refs/remotes/{PEER_ALIAS}/HEAD") {
            return match self.peer_physical_prefix()? {
                Some(prefix) => Ok(resolve_to_hash(self.storer, &format!("{prefix}HEAD"))?.map(Target::Peeled)),
                None => Ok(None),
            };
        }

        if let Some(name) = logical.strip_prefix(&format!("refs/remotes/{PEER_ALIAS}/")) {
            return match self.peer_physical_prefix()? {
                Some(prefix) => self.storer.find_reference(&format!("{prefix}heads/{name}")),
                None => Ok(None),
            };
        }

        let physical = logical_to_physical(&self.own, logical).ok_or_else(|| Error::NotRooted(logical.to_string()))?;
        self.storer.find_reference(&physical)
    }

    /// List every reference visible from this repository's rooted view: its own
    /// `refs/heads/*` and `HEAD`, plus any other remote's refs surfaced under
    /// `refs/remotes/origin/*`. Per the invariant that this enumeration is exactly the
    /// set of repositories-plus-branches the archive holds for this repository's
    /// neighborhood, entries are returned sorted by logical name.
    pub fn iter_references(&mut self) -> Result<Vec<(String, Target)>, Error> {
        let known_remotes = self.known_remote_ids()?;
        let physical_refs = self.storer.iter_references()?;
        let mut out = std::collections::BTreeMap::new();

        for (physical, target) in &physical_refs {
            let logical = match physical_to_logical(&self.own, physical, &known_remotes) {
                Some(l) => l,
                None => continue,
            };
            if logical == "HEAD" || logical.ends_with("/HEAD") {
                if let Some(hash) = resolve_to_hash(self.storer, physical)? {
                    out.insert(logical, Target::Peeled(hash));
                }
            } else {
                out.entry(logical).or_insert_with(|| target.clone());
            }
        }

        Ok(out.into_iter().collect())
    }

    /// Set a reference this repository owns. Only `refs/heads/<name>` is writable
    /// through the rooted view; `HEAD` and peer-remote references are read-only here.
    pub fn set_reference(&mut self, logical: &str, target: Target) -> Result<(), Error> {
        let physical = logical_to_physical(&self.own, logical).ok_or_else(|| Error::NotRooted(logical.to_string()))?;
        self.storer.set_reference(&physical, target)
    }

    /// Rooted-view counterpart of [`PackedStorer::check_and_set_reference`]: both the
    /// reference being set and the expected prior value are translated through the same
    /// rewriting rules before being handed to the underlying storer, preserving the
    /// quirk where a failing check (per `legacy_always_write`) still performs the write.
    pub fn check_and_set_reference(
        &mut self,
        new_logical: &str,
        new_target: Target,
        expected_logical: &str,
        expected: Option<&Target>,
        legacy_always_write: bool,
    ) -> Result<(), Error> {
        let new_physical =
            logical_to_physical(&self.own, new_logical).ok_or_else(|| Error::NotRooted(new_logical.to_string()))?;
        let expected_physical = logical_to_physical(&self.own, expected_logical)
            .ok_or_else(|| Error::NotRooted(expected_logical.to_string()))?;
        self.storer
            .check_and_set_reference(&new_physical, new_target, &expected_physical, expected, legacy_always_write)
    }
}
