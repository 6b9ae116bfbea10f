//! Presents a pack archive as a small filesystem: reads resolve against the archive's
//! already-committed contents, writes accumulate in an in-memory overlay, and
//! [`ArchiveFilesystem::sync`] flushes the overlay by appending a new section to the
//! archive file.
//!
//! The core deliberately does not know or care about the *real* pack-archive wire
//! format (out of scope, see the crate-level spec) — it only needs a collaborator
//! shaped like this trait. [`PackedArchiveFs`] is that collaborator: a minimal,
//! append-only section format good enough to make the rest of the stack runnable and
//! testable without pulling in an external archive library.

use std::{
    collections::{HashMap, HashSet},
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use borges_byte_store::ByteStore;
use serde::{Deserialize, Serialize};

/// Above this many committed bytes, [`PackedArchiveFs::open`] memory-maps the archive
/// instead of reading it fully into a `Vec<u8>`. Mirrors the mapped/in-memory split
/// `git-ref` uses for its packed-refs buffer, just with a size threshold instead of a
/// hardcoded choice.
const MMAP_CUTOFF_BYTES: u64 = 1 << 16;

/// The read-only backing of the archive's committed contents, chosen by size the way
/// `git-ref`'s packed-refs buffer chooses between a memory map and a fully loaded
/// `Vec<u8>`.
enum Backing {
    InMemory(Vec<u8>),
    Mapped(memmap2::Mmap),
    Empty,
}

impl Backing {
    fn as_slice(&self) -> &[u8] {
        match self {
            Backing::InMemory(v) => v,
            Backing::Mapped(m) => &m[..],
            Backing::Empty => &[],
        }
    }
}

/// A diff appended to the archive on [`ArchiveFilesystem::sync`]: the overlay that
/// accumulated since the archive was opened (or last synced).
#[derive(Debug, Default, Serialize, Deserialize)]
struct Section {
    removed: Vec<String>,
    writes: HashMap<String, Vec<u8>>,
}

/// The pluggable seam between [`Location`][crate docs reference in borges-core] and
/// whatever actually knows how to read and write a pack archive's bytes.
pub trait ArchiveFilesystem: Send + Sync {
    /// Read the full contents of `path`, or `None` if it does not exist.
    fn read(&self, path: &str) -> Option<Vec<u8>>;
    /// Buffer a write to `path` in the overlay; not durable until [`sync`][Self::sync].
    fn write(&mut self, path: &str, data: Vec<u8>);
    /// Buffer a removal of `path` in the overlay.
    fn remove(&mut self, path: &str);
    /// List the committed-or-overlaid entries whose path starts with `prefix`.
    fn read_dir(&self, prefix: &str) -> Vec<String>;
    /// Flush the overlay: append a new section to the archive and fold it into the
    /// read-only committed view. A no-op if the overlay is empty.
    fn sync(&mut self) -> io::Result<()>;
}

/// The one concrete [`ArchiveFilesystem`] this crate ships: an append-only sequence of
/// JSON-encoded [`Section`]s, each length-prefixed, read back in order to reconstruct
/// the latest value for every path.
pub struct PackedArchiveFs {
    store: Arc<dyn ByteStore>,
    archive_path: PathBuf,
    backing: Backing,
    committed: HashMap<String, Vec<u8>>,
    overlay_writes: HashMap<String, Vec<u8>>,
    overlay_removes: HashSet<String>,
}

impl PackedArchiveFs {
    /// Open (or lazily define, if the archive does not exist yet) the filesystem view
    /// of `archive_path` within `store`.
    pub fn open(store: Arc<dyn ByteStore>, archive_path: impl Into<PathBuf>) -> io::Result<Self> {
        let archive_path = archive_path.into();
        let stat = store.stat(&archive_path)?;

        let backing = if !stat.exists || stat.size == 0 {
            Backing::Empty
        } else if stat.size > MMAP_CUTOFF_BYTES {
            let full_path = store.root().join(&archive_path);
            let file = std::fs::File::open(&full_path)?;
            // Safety: the archive is only ever mutated through `sync`, which appends
            // rather than rewrites existing bytes, so the mapped region this instance
            // has already indexed stays valid for its lifetime.
            let mmap = unsafe { memmap2::Mmap::map(&file)? };
            Backing::Mapped(mmap)
        } else {
            Backing::InMemory(store.read_to_end(&archive_path)?)
        };

        let committed = decode_sections(backing.as_slice())?;

        Ok(Self {
            store,
            archive_path,
            backing,
            committed,
            overlay_writes: HashMap::new(),
            overlay_removes: HashSet::new(),
        })
    }
}

fn decode_sections(mut bytes: &[u8]) -> io::Result<HashMap<String, Vec<u8>>> {
    let mut state = HashMap::new();
    while !bytes.is_empty() {
        if bytes.len() < 4 {
            break;
        }
        let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        bytes = &bytes[4..];
        if bytes.len() < len {
            break;
        }
        let section: Section = serde_json::from_slice(&bytes[..len])
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        bytes = &bytes[len..];

        for path in section.removed {
            state.remove(&path);
        }
        for (path, data) in section.writes {
            state.insert(path, data);
        }
    }
    Ok(state)
}

impl ArchiveFilesystem for PackedArchiveFs {
    fn read(&self, path: &str) -> Option<Vec<u8>> {
        if self.overlay_removes.contains(path) {
            return None;
        }
        self.overlay_writes
            .get(path)
            .or_else(|| self.committed.get(path))
            .cloned()
    }

    fn write(&mut self, path: &str, data: Vec<u8>) {
        self.overlay_removes.remove(path);
        self.overlay_writes.insert(path.to_string(), data);
    }

    fn remove(&mut self, path: &str) {
        self.overlay_writes.remove(path);
        self.overlay_removes.insert(path.to_string());
    }

    fn read_dir(&self, prefix: &str) -> Vec<String> {
        let mut names: HashSet<&str> = HashSet::new();
        for key in self.committed.keys().chain(self.overlay_writes.keys()) {
            if self.overlay_removes.contains(key) {
                continue;
            }
            if let Some(rest) = key.strip_prefix(prefix) {
                names.insert(rest);
            }
        }
        let mut out: Vec<String> = names.into_iter().map(str::to_string).collect();
        out.sort();
        out
    }

    fn sync(&mut self) -> io::Result<()> {
        if self.overlay_writes.is_empty() && self.overlay_removes.is_empty() {
            return Ok(());
        }

        let section = Section {
            removed: self.overlay_removes.drain().collect(),
            writes: std::mem::take(&mut self.overlay_writes),
        };

        for path in &section.removed {
            self.committed.remove(path);
        }
        for (path, data) in &section.writes {
            self.committed.insert(path.clone(), data.clone());
        }

        let payload = serde_json::to_vec(&section).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut framed = Vec::with_capacity(4 + payload.len());
        framed.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        framed.extend_from_slice(&payload);
        self.store.append(&self.archive_path, &framed)?;
        Ok(())
    }
}
