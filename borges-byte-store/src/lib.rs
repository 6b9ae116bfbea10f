//! The lowest layer of the stack: durable, file-like byte storage.
//!
//! Everything above this crate treats a pack archive as a named blob that can be opened,
//! read at an offset, appended to, truncated and stat'd. This crate owns exactly that
//! contract and one concrete implementation backed by the real filesystem; higher layers
//! (`borges-checkpoint`, `borges-archive-fs`) are generic over [`ByteStore`] so tests can
//! swap in an in-memory fake without touching disk.

use std::{
    io,
    path::{Path, PathBuf},
};

/// The result of stat'ing a path in a [`ByteStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    /// Whether anything exists at the path.
    pub exists: bool,
    /// The size in bytes, `0` if `exists` is `false`.
    pub size: u64,
}

/// The byte-level storage collaborator every higher layer is built on top of.
///
/// Paths passed to this trait are always relative to the store's own root; a
/// [`ByteStore`] implementation owns the mapping from a relative path to wherever the
/// bytes actually live.
pub trait ByteStore: Send + Sync {
    /// Stat the file at `path`, reporting non-existence rather than erroring.
    fn stat(&self, path: &Path) -> io::Result<Stat>;

    /// Read the whole file at `path` into memory.
    fn read_to_end(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Read up to `buf.len()` bytes starting at `offset`, returning the number read.
    fn read_at(&self, path: &Path, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Append `data` to the file at `path`, creating it if necessary.
    fn append(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Truncate the file at `path` to exactly `size` bytes. `size` must not exceed the
    /// current length.
    fn truncate(&self, path: &Path, size: u64) -> io::Result<()>;

    /// Remove the file at `path`. Not an error if it is already absent.
    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Create or fully overwrite the file at `path` with `data`. Not atomic by itself —
    /// pair with [`atomic_rename`][ByteStore::atomic_rename] for crash-safe replacement
    /// of an existing file, as the checkpoint sidecar does.
    fn write_new(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Atomically replace `dst` with the contents of `tmp`, removing `tmp` in the
    /// process. Used by the checkpoint sidecar and the archive overlay sync to avoid
    /// partial writes ever becoming observable.
    fn atomic_rename(&self, tmp: &Path, dst: &Path) -> io::Result<()>;

    /// List the entries directly inside `path`. Used by directory-shaped archive
    /// backends; the default in-memory archive never calls this.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// The filesystem root this store resolves relative paths against. Needed by
    /// collaborators (like the checkpoint's temp-file dance) that must create a sibling
    /// file next to an existing one using real filesystem primitives.
    fn root(&self) -> &Path;
}

/// A [`ByteStore`] backed by the real filesystem, rooted at a directory.
///
/// Uses `fs-err` rather than `std::fs` directly so that I/O errors surfacing through
/// [`BorgesError::IOError`][borges-core's error type] carry the offending path, which is
/// invaluable when an archive lives several directories deep.
pub struct FsByteStore {
    root: PathBuf,
}

impl FsByteStore {
    /// Root the store at `root`, creating the directory if it does not yet exist.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs_err::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

impl ByteStore for FsByteStore {
    fn stat(&self, path: &Path) -> io::Result<Stat> {
        match fs_err::metadata(self.resolve(path)) {
            Ok(meta) => Ok(Stat {
                exists: true,
                size: meta.len(),
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Stat::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn read_to_end(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs_err::read(self.resolve(path)).map_err(Into::into)
    }

    fn read_at(&self, path: &Path, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        use std::io::{Read, Seek, SeekFrom};

        let mut file = fs_err::File::open(self.resolve(path))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut read = 0;
        while read < buf.len() {
            match file.read(&mut buf[read..])? {
                0 => break,
                n => read += n,
            }
        }
        Ok(read)
    }

    fn append(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        use std::io::Write;

        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs_err::create_dir_all(parent)?;
        }
        let mut file = fs_err::OpenOptions::new()
            .create(true)
            .append(true)
            .open(full)?;
        file.write_all(data)?;
        file.sync_data()?;
        Ok(())
    }

    fn write_new(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        use std::io::Write;

        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs_err::create_dir_all(parent)?;
        }
        let mut file = fs_err::File::create(full)?;
        file.write_all(data)?;
        file.sync_data()?;
        Ok(())
    }

    fn truncate(&self, path: &Path, size: u64) -> io::Result<()> {
        let file = fs_err::OpenOptions::new().write(true).open(self.resolve(path))?;
        file.set_len(size)?;
        file.sync_data()?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        match fs_err::remove_file(self.resolve(path)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn atomic_rename(&self, tmp: &Path, dst: &Path) -> io::Result<()> {
        fs_err::rename(self.resolve(tmp), self.resolve(dst)).map_err(Into::into)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let full = self.resolve(path);
        match fs_err::read_dir(&full) {
            Ok(entries) => entries
                .map(|entry| entry.map(|e| e.path()))
                .collect::<Result<_, _>>()
                .map_err(Into::into),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn root(&self) -> &Path {
        &self.root
    }
}
