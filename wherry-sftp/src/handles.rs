use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use wherry_constants::error;
use wherry_constants::logger::Logger;
use wherry_constants::Error;
use wherry_fs::{DirReader, FileHandle};

/// The per-connection registry of opaque handles.
///
/// A handle names either an open file or an open directory stream, never
/// both; files are shared with the read/write worker pool, directory streams
/// are mutated only under their own lock.  Handles are minted from a
/// monotonic counter and rendered base-36, which keeps them short and unique
/// for the life of the connection.
pub struct HandleTable {
    files: RwLock<HashMap<String, Arc<dyn FileHandle>>>,
    dirs: RwLock<HashMap<String, Arc<Mutex<Box<dyn DirReader>>>>>,
    next: AtomicU64,
}

impl HandleTable {
    pub fn new() -> HandleTable {
        HandleTable {
            files: RwLock::new(HashMap::new()),
            dirs: RwLock::new(HashMap::new()),
            next: AtomicU64::new(0),
        }
    }

    fn next_handle(&self) -> String {
        to_base36(self.next.fetch_add(1, Ordering::AcqRel))
    }

    pub fn register_file(&self, file: Box<dyn FileHandle>) -> String {
        let handle = self.next_handle();
        self.files
            .write()
            .unwrap()
            .insert(handle.clone(), Arc::from(file));
        handle
    }

    pub fn register_dir(&self, dir: Box<dyn DirReader>) -> String {
        let handle = self.next_handle();
        self.dirs
            .write()
            .unwrap()
            .insert(handle.clone(), Arc::new(Mutex::new(dir)));
        handle
    }

    pub fn get_file(&self, handle: &str) -> Result<Arc<dyn FileHandle>, Error> {
        self.files
            .read()
            .unwrap()
            .get(handle)
            .cloned()
            .ok_or(Error::EBADF)
    }

    pub fn get_dir(&self, handle: &str) -> Result<Arc<Mutex<Box<dyn DirReader>>>, Error> {
        self.dirs
            .read()
            .unwrap()
            .get(handle)
            .cloned()
            .ok_or(Error::EBADF)
    }

    /// Closes a handle of either kind: the file table is checked first, then
    /// the directory table.  A file's `close` runs exactly once, here or in
    /// [`HandleTable::close_all`]; a directory stream is released by drop.
    pub fn close(&self, handle: &str) -> Result<(), Error> {
        if let Some(file) = self.files.write().unwrap().remove(handle) {
            return file.close();
        }
        if self.dirs.write().unwrap().remove(handle).is_some() {
            return Ok(());
        }
        Err(Error::EBADF)
    }

    /// Best-effort teardown: drains both tables and releases every resource,
    /// logging close failures instead of propagating them.
    pub fn close_all<L: Logger + ?Sized>(&self, logger: &L) {
        for (handle, file) in self.files.write().unwrap().drain() {
            if let Err(e) = file.close() {
                error!(logger, "sftp: closing leftover handle {}: {}", handle, e);
            }
        }
        self.dirs.write().unwrap().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().unwrap().is_empty() && self.dirs.read().unwrap().is_empty()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_owned();
    }
    let mut buf = [0u8; 13];
    let mut i = buf.len();
    while n > 0 {
        i -= 1;
        buf[i] = DIGITS[(n % 36) as usize];
        n /= 36;
    }
    String::from_utf8_lossy(&buf[i..]).into_owned()
}
