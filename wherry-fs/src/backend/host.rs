use crate::backend::{Backend, DirEntry, DirReader, FileHandle};
use crate::path::clean_path;
use std::ffi::CString;
use std::fs::{self, File, OpenOptions, Permissions};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use wherry_constants::Error;
use wherry_proto::{FileAttr, OpenFlags, StatVfs};

type Result<T> = std::result::Result<T, Error>;

fn attr_from_metadata(md: &fs::Metadata) -> FileAttr {
    FileAttr {
        size: Some(md.len()),
        uid: Some(md.uid()),
        gid: Some(md.gid()),
        permissions: Some(md.mode()),
        atime: Some(md.atime().clamp(0, u32::MAX as i64) as u32),
        mtime: Some(md.mtime().clamp(0, u32::MAX as i64) as u32),
        ..Default::default()
    }
}

fn cstring_for(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| Error::EINVAL)
}

/// A backend over the host OS filesystem, rooted at a directory.
///
/// Every cleaned client path resolves beneath the root, so `..` cannot
/// escape it.  Mutating operations are rejected with `EACCES` unless
/// `allow_write` is set.
pub struct HostBackend {
    root: PathBuf,
    allow_write: bool,
}

impl HostBackend {
    pub fn new(root: impl Into<PathBuf>) -> HostBackend {
        HostBackend {
            root: root.into(),
            allow_write: false,
        }
    }

    pub fn allow_write(mut self, allow: bool) -> HostBackend {
        self.allow_write = allow;
        self
    }

    fn require_writable(&self) -> Result<()> {
        if self.allow_write {
            Ok(())
        } else {
            Err(Error::EACCES)
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let clean = clean_path(path);
        self.root.join(&clean[1..])
    }
}

impl Backend for HostBackend {
    fn open_file(
        &self,
        path: &str,
        flags: OpenFlags,
        attr: &FileAttr,
    ) -> Result<Box<dyn FileHandle>> {
        let flags = flags.normalized();
        if flags.is_mutating() {
            self.require_writable()?;
        }
        if !flags.intersects(OpenFlags::READ | OpenFlags::WRITE | OpenFlags::APPEND) {
            return Err(Error::EINVAL);
        }
        let mut opts = OpenOptions::new();
        opts.read(flags.contains(OpenFlags::READ))
            .write(flags.contains(OpenFlags::WRITE))
            .append(flags.contains(OpenFlags::APPEND))
            .truncate(flags.contains(OpenFlags::TRUNCATE))
            .mode(attr.permissions.map(|p| p & 0o7777).unwrap_or(0o644));
        if flags.contains(OpenFlags::CREATE) {
            if flags.contains(OpenFlags::EXCLUSIVE) {
                opts.create_new(true);
            } else {
                opts.create(true);
            }
        }
        let file = opts.open(self.resolve(path)).map_err(Error::from)?;
        if file.metadata().map_err(Error::from)?.is_dir() {
            return Err(Error::EISDIR);
        }
        Ok(Box::new(HostFile { file }))
    }

    fn mkdir(&self, path: &str, attr: &FileAttr) -> Result<()> {
        self.require_writable()?;
        let target = self.resolve(path);
        fs::create_dir(&target).map_err(Error::from)?;
        if let Some(perms) = attr.permissions {
            fs::set_permissions(&target, Permissions::from_mode(perms & 0o7777))
                .map_err(Error::from)?;
        }
        Ok(())
    }

    fn open_dir(&self, path: &str) -> Result<Box<dyn DirReader>> {
        let target = self.resolve(path);
        if !fs::metadata(&target).map_err(Error::from)?.is_dir() {
            return Err(Error::ENOTDIR);
        }
        let iter = fs::read_dir(&target).map_err(Error::from)?;
        Ok(Box::new(HostDirReader { iter, done: false }))
    }

    fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        self.require_writable()?;
        let new = self.resolve(new_path);
        if fs::symlink_metadata(&new).is_ok() {
            return Err(Error::EEXIST);
        }
        fs::rename(self.resolve(old_path), new).map_err(Error::from)
    }

    fn posix_rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        self.require_writable()?;
        fs::rename(self.resolve(old_path), self.resolve(new_path)).map_err(Error::from)
    }

    fn stat(&self, path: &str) -> Result<FileAttr> {
        let md = fs::metadata(self.resolve(path)).map_err(Error::from)?;
        Ok(attr_from_metadata(&md))
    }

    fn lstat(&self, path: &str) -> Result<FileAttr> {
        let md = fs::symlink_metadata(self.resolve(path)).map_err(Error::from)?;
        Ok(attr_from_metadata(&md))
    }

    fn setstat(&self, path: &str, attr: &FileAttr) -> Result<()> {
        self.require_writable()?;
        let target = self.resolve(path);
        if let Some(size) = attr.size {
            let f = OpenOptions::new()
                .write(true)
                .open(&target)
                .map_err(Error::from)?;
            f.set_len(size).map_err(Error::from)?;
        }
        if let Some(perms) = attr.permissions {
            fs::set_permissions(&target, Permissions::from_mode(perms & 0o7777))
                .map_err(Error::from)?;
        }
        if let (Some(atime), Some(mtime)) = (attr.atime, attr.mtime) {
            let f = File::open(&target).map_err(Error::from)?;
            set_file_times(&f, atime, mtime)?;
        }
        if let (Some(uid), Some(gid)) = (attr.uid, attr.gid) {
            let c = cstring_for(&target)?;
            let rc = unsafe { libc::chown(c.as_ptr(), uid, gid) };
            if rc != 0 {
                return Err(Error::from(std::io::Error::last_os_error()));
            }
        }
        Ok(())
    }

    fn symlink(&self, link_path: &str, target_path: &str) -> Result<()> {
        self.require_writable()?;
        std::os::unix::fs::symlink(target_path, self.resolve(link_path)).map_err(Error::from)
    }

    fn read_link(&self, path: &str) -> Result<String> {
        let target = fs::read_link(self.resolve(path)).map_err(Error::from)?;
        target
            .into_os_string()
            .into_string()
            .map_err(|_| Error::EILSEQ)
    }

    fn rmdir(&self, path: &str) -> Result<()> {
        self.require_writable()?;
        let target = self.resolve(path);
        if !fs::symlink_metadata(&target).map_err(Error::from)?.is_dir() {
            return Err(Error::ENOTDIR);
        }
        fs::remove_dir(&target).map_err(Error::from)
    }

    fn remove(&self, path: &str) -> Result<()> {
        self.require_writable()?;
        let target = self.resolve(path);
        if fs::symlink_metadata(&target).map_err(Error::from)?.is_dir() {
            return Err(Error::EISDIR);
        }
        fs::remove_file(&target).map_err(Error::from)
    }

    fn real_path(&self, path: &str) -> Result<String> {
        // The client-visible namespace is rooted at our directory, so a full
        // resolution is just the cleaned absolute form.
        Ok(clean_path(path))
    }

    fn statvfs(&self, path: &str) -> Result<StatVfs> {
        let c = cstring_for(&self.resolve(path))?;
        let mut vfs: libc::statvfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statvfs(c.as_ptr(), &mut vfs) };
        if rc != 0 {
            return Err(Error::from(std::io::Error::last_os_error()));
        }
        Ok(StatVfs {
            block_size: vfs.f_bsize as u64,
            fragment_size: vfs.f_frsize as u64,
            blocks: vfs.f_blocks as u64,
            blocks_free: vfs.f_bfree as u64,
            blocks_avail: vfs.f_bavail as u64,
            files: vfs.f_files as u64,
            files_free: vfs.f_ffree as u64,
            files_avail: vfs.f_favail as u64,
            fs_id: vfs.f_fsid as u64,
            flags: vfs.f_flag as u64,
            name_max: vfs.f_namemax as u64,
        })
    }
}

fn set_file_times(file: &File, atime: u32, mtime: u32) -> Result<()> {
    let times = fs::FileTimes::new()
        .set_accessed(UNIX_EPOCH + Duration::from_secs(atime as u64))
        .set_modified(UNIX_EPOCH + Duration::from_secs(mtime as u64));
    file.set_times(times).map_err(Error::from)
}

struct HostFile {
    file: File,
}

impl FileHandle for HostFile {
    fn stat(&self) -> Result<FileAttr> {
        let md = self.file.metadata().map_err(Error::from)?;
        Ok(attr_from_metadata(&md))
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.file.read_at(buf, offset).map_err(Error::from)
    }

    fn write_at(&self, data: &[u8], offset: u64) -> Result<usize> {
        self.file.write_at(data, offset).map_err(Error::from)
    }

    fn setstat(&self, attr: &FileAttr) -> Result<()> {
        if let Some(size) = attr.size {
            self.file.set_len(size).map_err(Error::from)?;
        }
        if let Some(perms) = attr.permissions {
            self.file
                .set_permissions(Permissions::from_mode(perms & 0o7777))
                .map_err(Error::from)?;
        }
        if let (Some(atime), Some(mtime)) = (attr.atime, attr.mtime) {
            set_file_times(&self.file, atime, mtime)?;
        }
        if let (Some(uid), Some(gid)) = (attr.uid, attr.gid) {
            let rc = unsafe { libc::fchown(self.file.as_raw_fd(), uid, gid) };
            if rc != 0 {
                return Err(Error::from(std::io::Error::last_os_error()));
            }
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct HostDirReader {
    iter: fs::ReadDir,
    done: bool,
}

impl DirReader for HostDirReader {
    fn read_entries(&mut self, out: &mut Vec<DirEntry>, limit: usize) -> Result<bool> {
        if self.done {
            return Ok(true);
        }
        for _ in 0..limit {
            match self.iter.next() {
                None => {
                    self.done = true;
                    return Ok(true);
                }
                Some(Err(e)) => return Err(Error::from(e)),
                Some(Ok(entry)) => {
                    let name = entry
                        .file_name()
                        .into_string()
                        .map_err(|_| Error::EILSEQ)?;
                    let md = entry.metadata().map_err(Error::from)?;
                    out.push(DirEntry {
                        name,
                        attr: attr_from_metadata(&md),
                    });
                }
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::HostBackend;
    use crate::backend::Backend;
    use tempfile::TempDir;
    use wherry_constants::Error;
    use wherry_proto::{FileAttr, FileMode, OpenFlags};

    fn writable() -> (TempDir, HostBackend) {
        let dir = TempDir::new().unwrap();
        let backend = HostBackend::new(dir.path()).allow_write(true);
        (dir, backend)
    }

    fn rw_create() -> OpenFlags {
        OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE
    }

    #[test]
    fn create_write_read() {
        let (_dir, fs) = writable();
        let f = fs
            .open_file(
                "/file",
                rw_create(),
                &FileAttr {
                    permissions: Some(0o600),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(f.write_at(b"hello, world", 0).unwrap(), 12);
        let mut buf = [0u8; 5];
        assert_eq!(f.read_at(&mut buf, 7).unwrap(), 5);
        assert_eq!(&buf, b"world");
        assert_eq!(f.read_at(&mut buf, 100).unwrap(), 0, "read past EOF");
        let st = f.stat().unwrap();
        assert_eq!(st.size, Some(12));
        assert_eq!(st.permissions.unwrap() & 0o777, 0o600);
        f.close().unwrap();
    }

    #[test]
    fn read_only_backend_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let fs = HostBackend::new(dir.path());
        assert_eq!(
            fs.open_file("/f", rw_create(), &FileAttr::default()).err(),
            Some(Error::EACCES)
        );
        assert_eq!(
            fs.mkdir("/d", &FileAttr::default()).err(),
            Some(Error::EACCES)
        );
        // Reads are still permitted.
        fs.stat("/").unwrap();
    }

    #[test]
    fn paths_cannot_escape_root() {
        let (dir, fs) = writable();
        fs.mkdir("/sub", &FileAttr::default()).unwrap();
        let f = fs
            .open_file("/../../f", rw_create(), &FileAttr::default())
            .unwrap();
        f.write_at(b"x", 0).unwrap();
        assert!(dir.path().join("f").exists(), "escaped path lands at root");
    }

    #[test]
    fn truncate_implies_create() {
        let (_dir, fs) = writable();
        let f = fs
            .open_file(
                "/fresh",
                OpenFlags::WRITE | OpenFlags::TRUNCATE,
                &FileAttr::default(),
            )
            .unwrap();
        f.write_at(b"x", 0).unwrap();
        assert_eq!(fs.stat("/fresh").unwrap().size, Some(1));
    }

    #[test]
    fn open_rejects_directories() {
        let (_dir, fs) = writable();
        fs.mkdir("/d", &FileAttr::default()).unwrap();
        assert_eq!(
            fs.open_file("/d", OpenFlags::READ, &FileAttr::default()).err(),
            Some(Error::EISDIR)
        );
    }

    #[test]
    fn rename_requires_fresh_destination() {
        let (_dir, fs) = writable();
        fs.open_file("/a", rw_create(), &FileAttr::default()).unwrap();
        fs.open_file("/b", rw_create(), &FileAttr::default()).unwrap();
        assert_eq!(fs.rename("/a", "/b").err(), Some(Error::EEXIST));
        fs.posix_rename("/a", "/b").unwrap();
        assert_eq!(fs.stat("/a").err(), Some(Error::ENOENT));
    }

    #[test]
    fn readdir_lists_created_files() {
        let (_dir, fs) = writable();
        for name in ["x", "y", "z"] {
            fs.open_file(&format!("/{}", name), rw_create(), &FileAttr::default())
                .unwrap();
        }
        let mut rd = fs.open_dir("/").unwrap();
        let mut out = Vec::new();
        while !rd.read_entries(&mut out, 2).unwrap() {}
        let mut names: Vec<String> = out.into_iter().map(|e| e.name).collect();
        names.sort();
        assert_eq!(names, ["x", "y", "z"]);
    }

    #[test]
    fn symlink_and_readlink() {
        let (_dir, fs) = writable();
        let f = fs.open_file("/t", rw_create(), &FileAttr::default()).unwrap();
        f.write_at(b"abc", 0).unwrap();
        fs.symlink("/l", "t").unwrap();
        assert_eq!(fs.read_link("/l").unwrap(), "t");
        let lst = fs.lstat("/l").unwrap();
        assert!(FileMode::from_bits_truncate(lst.permissions.unwrap()).is_symlink());
        assert_eq!(fs.stat("/l").unwrap().size, Some(3));
    }

    #[test]
    fn rmdir_remove_edges() {
        let (_dir, fs) = writable();
        fs.mkdir("/d", &FileAttr::default()).unwrap();
        fs.open_file("/f", rw_create(), &FileAttr::default()).unwrap();
        assert_eq!(fs.rmdir("/f").err(), Some(Error::ENOTDIR));
        assert_eq!(fs.remove("/d").err(), Some(Error::EISDIR));
        fs.remove("/f").unwrap();
        fs.rmdir("/d").unwrap();
    }

    #[test]
    fn setstat_truncates_and_chmods() {
        let (_dir, fs) = writable();
        let f = fs.open_file("/f", rw_create(), &FileAttr::default()).unwrap();
        f.write_at(b"0123456789", 0).unwrap();
        fs.setstat(
            "/f",
            &FileAttr {
                size: Some(4),
                permissions: Some(0o640),
                atime: Some(1_600_000_000),
                mtime: Some(1_600_000_000),
                ..Default::default()
            },
        )
        .unwrap();
        let st = fs.stat("/f").unwrap();
        assert_eq!(st.size, Some(4));
        assert_eq!(st.permissions.unwrap() & 0o777, 0o640);
        assert_eq!(st.mtime, Some(1_600_000_000));
    }

    #[test]
    fn statvfs_reports_geometry() {
        let (_dir, fs) = writable();
        let vfs = fs.statvfs("/").unwrap();
        assert!(vfs.block_size > 0);
        assert!(vfs.name_max > 0);
    }

    #[test]
    fn real_path_is_virtual() {
        let (_dir, fs) = writable();
        assert_eq!(fs.real_path("a/./b/..").unwrap(), "/a");
    }
}
