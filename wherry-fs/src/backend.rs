use wherry_constants::Error;
use wherry_proto::{FileAttr, OpenFlags, StatVfs};

pub mod memory;

#[cfg(unix)]
pub mod host;

type Result<T> = std::result::Result<T, Error>;

/// One directory entry produced by a [`DirReader`].
///
/// The server renders the human-readable long name itself, so a backend only
/// supplies the short name and attributes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DirEntry {
    pub name: String,
    pub attr: FileAttr,
}

/// An open file.
///
/// Offsets are absolute; concurrent `read_at`/`write_at` calls on the same
/// handle may be issued by parallel workers, so implementations take `&self`
/// and guard their own state.
pub trait FileHandle: Send + Sync {
    fn stat(&self) -> Result<FileAttr>;

    /// Reads at most `buf.len()` bytes from `offset`.  Returns `Ok(0)` only
    /// at end of file.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Writes `data` at `offset`, returning the number of bytes written.
    fn write_at(&self, data: &[u8], offset: u64) -> Result<usize>;

    /// Applies the fields whose flag bits are set, in the order size,
    /// permissions, times, uid/gid.
    fn setstat(&self, attr: &FileAttr) -> Result<()>;

    /// Releases the file.  Called exactly once per handle.
    fn close(&self) -> Result<()>;
}

/// An open directory stream.
pub trait DirReader: Send {
    /// Appends up to `limit` further entries to `out` and reports whether
    /// the listing is exhausted.
    fn read_entries(&mut self, out: &mut Vec<DirEntry>, limit: usize) -> Result<bool>;
}

/// The filesystem contract the server core operates over.
///
/// All paths arrive cleaned: absolute, with `.`/`..` resolved and
/// separators collapsed.  A backend is responsible for its own access
/// control; a read-only backend rejects mutating operations with `EACCES`,
/// which the server reports as PERMISSION_DENIED.
pub trait Backend: Send + Sync {
    /// Opens or creates a file per POSIX `open` semantics; directories are
    /// rejected.
    fn open_file(
        &self,
        path: &str,
        flags: OpenFlags,
        attr: &FileAttr,
    ) -> Result<Box<dyn FileHandle>>;

    /// Creates a directory.  Fails if the path already exists.
    fn mkdir(&self, path: &str, attr: &FileAttr) -> Result<()>;

    /// Opens a directory for listing.  Fails if the path is not a directory.
    fn open_dir(&self, path: &str) -> Result<Box<dyn DirReader>>;

    /// Renames a file or directory.  Fails if the source is missing or the
    /// destination exists.
    fn rename(&self, old_path: &str, new_path: &str) -> Result<()>;

    /// Atomically renames, replacing any existing destination.
    fn posix_rename(&self, _old_path: &str, _new_path: &str) -> Result<()> {
        Err(Error::EOPNOTSUPP)
    }

    /// Retrieves attributes, following symlinks.
    fn stat(&self, path: &str) -> Result<FileAttr>;

    /// Retrieves attributes without following symlinks.
    fn lstat(&self, path: &str) -> Result<FileAttr>;

    /// Applies the fields whose flag bits are set, in the order size,
    /// permissions, times, uid/gid.
    fn setstat(&self, path: &str, attr: &FileAttr) -> Result<()>;

    /// Creates a symlink at `link_path` pointing to `target_path`.
    fn symlink(&self, link_path: &str, target_path: &str) -> Result<()>;

    /// Returns the target of a symlink.
    fn read_link(&self, path: &str) -> Result<String>;

    /// Removes an empty directory.  Fails on non-directories and non-empty
    /// directories.
    fn rmdir(&self, path: &str) -> Result<()>;

    /// Removes a file.  Fails on directories.
    fn remove(&self, path: &str) -> Result<()>;

    /// Produces an absolute path from a relative one.  The server resolves
    /// absolute inputs itself and only delegates relative ones.
    fn real_path(&self, path: &str) -> Result<String>;

    /// Filesystem statistics for the `statvfs@openssh.com` extension.
    fn statvfs(&self, _path: &str) -> Result<StatVfs> {
        Err(Error::EOPNOTSUPP)
    }
}
