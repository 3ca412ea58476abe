use crate::backend::{Backend, DirEntry, DirReader, FileHandle};
use crate::path::{clean_path, split_parent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use wherry_constants::Error;
use wherry_proto::{FileAttr, FileMode, OpenFlags, StatVfs};

type Result<T> = std::result::Result<T, Error>;

const MAX_LINK_DEPTH: usize = 8;

fn now_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

enum NodeKind {
    File,
    Dir,
    Symlink(String),
}

struct NodeMeta {
    perms: u32,
    uid: u32,
    gid: u32,
    atime: u32,
    mtime: u32,
}

struct Node {
    kind: NodeKind,
    meta: Mutex<NodeMeta>,
    content: RwLock<Vec<u8>>,
}

impl Node {
    fn new(kind: NodeKind, perms: u32, attr: &FileAttr) -> Node {
        let now = now_secs();
        Node {
            kind,
            meta: Mutex::new(NodeMeta {
                perms: attr.permissions.map(|p| p & 0o7777).unwrap_or(perms),
                uid: attr.uid.unwrap_or(0),
                gid: attr.gid.unwrap_or(0),
                atime: attr.atime.unwrap_or(now),
                mtime: attr.mtime.unwrap_or(now),
            }),
            content: RwLock::new(Vec::new()),
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir)
    }

    fn type_bits(&self) -> u32 {
        match self.kind {
            NodeKind::File => FileMode::IFREG.bits(),
            NodeKind::Dir => FileMode::IFDIR.bits(),
            NodeKind::Symlink(_) => FileMode::IFLNK.bits(),
        }
    }

    fn attr(&self) -> FileAttr {
        let meta = self.meta.lock().unwrap();
        let size = match &self.kind {
            NodeKind::File => self.content.read().unwrap().len() as u64,
            NodeKind::Dir => 0,
            NodeKind::Symlink(target) => target.len() as u64,
        };
        FileAttr {
            size: Some(size),
            uid: Some(meta.uid),
            gid: Some(meta.gid),
            permissions: Some(self.type_bits() | meta.perms),
            atime: Some(meta.atime),
            mtime: Some(meta.mtime),
            ..Default::default()
        }
    }

    // Fields apply in the order size, permissions, times, uid/gid.
    fn apply_setstat(&self, attr: &FileAttr) {
        if let Some(size) = attr.size {
            if matches!(self.kind, NodeKind::File) {
                self.content.write().unwrap().resize(size as usize, 0);
            }
        }
        let mut meta = self.meta.lock().unwrap();
        if let Some(perms) = attr.permissions {
            meta.perms = perms & 0o7777;
        }
        if let (Some(atime), Some(mtime)) = (attr.atime, attr.mtime) {
            meta.atime = atime;
            meta.mtime = mtime;
        }
        if let (Some(uid), Some(gid)) = (attr.uid, attr.gid) {
            meta.uid = uid;
            meta.gid = gid;
        }
    }
}

type NodeMap = HashMap<String, Arc<Node>>;

/// An in-memory filesystem: a flat table of cleaned absolute paths.
///
/// Suitable for tests and for serving ephemeral trees.  All operations are
/// implemented, including symlinks and directory renames.
pub struct MemoryBackend {
    nodes: Mutex<NodeMap>,
    read_only: bool,
}

impl MemoryBackend {
    pub fn new() -> MemoryBackend {
        Self::build(false)
    }

    /// A backend that rejects every mutating operation with `EACCES`.
    pub fn read_only() -> MemoryBackend {
        Self::build(true)
    }

    fn build(read_only: bool) -> MemoryBackend {
        let mut nodes = HashMap::new();
        nodes.insert(
            "/".to_owned(),
            Arc::new(Node::new(NodeKind::Dir, 0o755, &FileAttr::default())),
        );
        MemoryBackend {
            nodes: Mutex::new(nodes),
            read_only,
        }
    }

    fn require_writable(&self) -> Result<()> {
        if self.read_only {
            Err(Error::EACCES)
        } else {
            Ok(())
        }
    }

    fn lock(&self) -> MutexGuard<'_, NodeMap> {
        self.nodes.lock().unwrap()
    }

    fn lookup(nodes: &NodeMap, path: &str) -> Result<Arc<Node>> {
        nodes.get(path).cloned().ok_or(Error::ENOENT)
    }

    /// Follows symlinks until a non-link node, with a fixed depth limit.
    fn resolve(nodes: &NodeMap, path: &str) -> Result<(String, Arc<Node>)> {
        let mut path = path.to_owned();
        for _ in 0..MAX_LINK_DEPTH {
            let node = Self::lookup(nodes, &path)?;
            match &node.kind {
                NodeKind::Symlink(target) => {
                    path = if target.starts_with('/') {
                        clean_path(target)
                    } else {
                        let (parent, _) = split_parent(&path).ok_or(Error::ENOENT)?;
                        clean_path(&format!("{}/{}", parent, target))
                    };
                }
                _ => return Ok((path, node)),
            }
        }
        Err(Error::ELOOP)
    }

    fn child_prefix(path: &str) -> String {
        if path == "/" {
            "/".to_owned()
        } else {
            format!("{}/", path)
        }
    }

    fn has_children(nodes: &NodeMap, path: &str) -> bool {
        let prefix = Self::child_prefix(path);
        nodes
            .keys()
            .any(|k| k.len() > prefix.len() && k.starts_with(&prefix))
    }

    fn require_parent_dir(nodes: &NodeMap, path: &str) -> Result<()> {
        let (parent, _) = split_parent(path).ok_or(Error::EINVAL)?;
        let node = Self::lookup(nodes, parent)?;
        if !node.is_dir() {
            return Err(Error::ENOTDIR);
        }
        Ok(())
    }

    /// Moves `old` and everything beneath it to `new`.  Callers have already
    /// validated both endpoints.
    fn move_subtree(nodes: &mut NodeMap, old: &str, new: &str) {
        let old_prefix = Self::child_prefix(old);
        let moved: Vec<String> = nodes
            .keys()
            .filter(|k| k.as_str() == old || k.starts_with(&old_prefix))
            .cloned()
            .collect();
        for key in moved {
            if let Some(node) = nodes.remove(&key) {
                let dest = format!("{}{}", new, &key[old.len()..]);
                nodes.insert(dest, node);
            }
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
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
        let path = clean_path(path);
        let mut nodes = self.lock();
        let node = match Self::resolve(&nodes, &path) {
            Ok((_, node)) => {
                if flags.contains(OpenFlags::CREATE | OpenFlags::EXCLUSIVE) {
                    return Err(Error::EEXIST);
                }
                if node.is_dir() {
                    return Err(Error::EISDIR);
                }
                if flags.contains(OpenFlags::TRUNCATE) {
                    node.content.write().unwrap().clear();
                    node.meta.lock().unwrap().mtime = now_secs();
                }
                node
            }
            Err(Error::ENOENT) if flags.contains(OpenFlags::CREATE) => {
                // A dangling symlink occupies the name; creating through it
                // is not supported.
                if nodes.contains_key(&path) {
                    return Err(Error::ENOENT);
                }
                Self::require_parent_dir(&nodes, &path)?;
                let node = Arc::new(Node::new(NodeKind::File, 0o644, attr));
                nodes.insert(path.clone(), node.clone());
                node
            }
            Err(e) => return Err(e),
        };
        Ok(Box::new(MemFile {
            node,
            readable: flags.contains(OpenFlags::READ),
            writable: flags.intersects(OpenFlags::WRITE | OpenFlags::APPEND),
            append: flags.contains(OpenFlags::APPEND),
        }))
    }

    fn mkdir(&self, path: &str, attr: &FileAttr) -> Result<()> {
        self.require_writable()?;
        let path = clean_path(path);
        let mut nodes = self.lock();
        if nodes.contains_key(&path) {
            return Err(Error::EEXIST);
        }
        Self::require_parent_dir(&nodes, &path)?;
        nodes.insert(path, Arc::new(Node::new(NodeKind::Dir, 0o755, attr)));
        Ok(())
    }

    fn open_dir(&self, path: &str) -> Result<Box<dyn DirReader>> {
        let path = clean_path(path);
        let nodes = self.lock();
        let (path, node) = Self::resolve(&nodes, &path)?;
        if !node.is_dir() {
            return Err(Error::ENOTDIR);
        }
        let prefix = Self::child_prefix(&path);
        let mut entries: Vec<DirEntry> = nodes
            .iter()
            .filter(|(k, _)| {
                k.len() > prefix.len()
                    && k.starts_with(&prefix)
                    && !k[prefix.len()..].contains('/')
            })
            .map(|(k, node)| DirEntry {
                name: k[prefix.len()..].to_owned(),
                attr: node.attr(),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Box::new(MemDirReader { entries, pos: 0 }))
    }

    fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        self.require_writable()?;
        let old = clean_path(old_path);
        let new = clean_path(new_path);
        if old == new {
            return Ok(());
        }
        let mut nodes = self.lock();
        Self::lookup(&nodes, &old)?;
        if nodes.contains_key(&new) {
            return Err(Error::EEXIST);
        }
        if new.starts_with(&Self::child_prefix(&old)) {
            return Err(Error::EINVAL);
        }
        Self::require_parent_dir(&nodes, &new)?;
        Self::move_subtree(&mut nodes, &old, &new);
        Ok(())
    }

    fn posix_rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        self.require_writable()?;
        let old = clean_path(old_path);
        let new = clean_path(new_path);
        if old == new {
            return Ok(());
        }
        let mut nodes = self.lock();
        Self::lookup(&nodes, &old)?;
        if new.starts_with(&Self::child_prefix(&old)) {
            return Err(Error::EINVAL);
        }
        let replacing = match nodes.get(&new) {
            Some(existing) => {
                if existing.is_dir() && Self::has_children(&nodes, &new) {
                    return Err(Error::ENOTEMPTY);
                }
                true
            }
            None => false,
        };
        if replacing {
            nodes.remove(&new);
        } else {
            Self::require_parent_dir(&nodes, &new)?;
        }
        Self::move_subtree(&mut nodes, &old, &new);
        Ok(())
    }

    fn stat(&self, path: &str) -> Result<FileAttr> {
        let nodes = self.lock();
        let (_, node) = Self::resolve(&nodes, &clean_path(path))?;
        Ok(node.attr())
    }

    fn lstat(&self, path: &str) -> Result<FileAttr> {
        let nodes = self.lock();
        Ok(Self::lookup(&nodes, &clean_path(path))?.attr())
    }

    fn setstat(&self, path: &str, attr: &FileAttr) -> Result<()> {
        self.require_writable()?;
        let nodes = self.lock();
        let (_, node) = Self::resolve(&nodes, &clean_path(path))?;
        node.apply_setstat(attr);
        Ok(())
    }

    fn symlink(&self, link_path: &str, target_path: &str) -> Result<()> {
        self.require_writable()?;
        let link = clean_path(link_path);
        let mut nodes = self.lock();
        if nodes.contains_key(&link) {
            return Err(Error::EEXIST);
        }
        Self::require_parent_dir(&nodes, &link)?;
        let node = Node::new(
            NodeKind::Symlink(target_path.to_owned()),
            0o777,
            &FileAttr::default(),
        );
        nodes.insert(link, Arc::new(node));
        Ok(())
    }

    fn read_link(&self, path: &str) -> Result<String> {
        let nodes = self.lock();
        let node = Self::lookup(&nodes, &clean_path(path))?;
        match &node.kind {
            NodeKind::Symlink(target) => Ok(target.clone()),
            _ => Err(Error::EINVAL),
        }
    }

    fn rmdir(&self, path: &str) -> Result<()> {
        self.require_writable()?;
        let path = clean_path(path);
        if path == "/" {
            return Err(Error::EBUSY);
        }
        let mut nodes = self.lock();
        let node = Self::lookup(&nodes, &path)?;
        if !node.is_dir() {
            return Err(Error::ENOTDIR);
        }
        if Self::has_children(&nodes, &path) {
            return Err(Error::ENOTEMPTY);
        }
        nodes.remove(&path);
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<()> {
        self.require_writable()?;
        let path = clean_path(path);
        let mut nodes = self.lock();
        let node = Self::lookup(&nodes, &path)?;
        if node.is_dir() {
            return Err(Error::EISDIR);
        }
        nodes.remove(&path);
        Ok(())
    }

    fn real_path(&self, path: &str) -> Result<String> {
        Ok(clean_path(path))
    }

    fn statvfs(&self, _path: &str) -> Result<StatVfs> {
        let nodes = self.lock();
        let used: u64 = nodes
            .values()
            .map(|n| n.content.read().unwrap().len() as u64)
            .sum();
        let blocks = 1 << 20;
        let free = blocks - (used / 4096).min(blocks);
        Ok(StatVfs {
            block_size: 4096,
            fragment_size: 4096,
            blocks,
            blocks_free: free,
            blocks_avail: free,
            files: 1 << 16,
            files_free: (1 << 16) - nodes.len() as u64,
            files_avail: (1 << 16) - nodes.len() as u64,
            fs_id: 0,
            flags: if self.read_only {
                StatVfs::FLAG_READONLY
            } else {
                0
            },
            name_max: 255,
        })
    }
}

struct MemFile {
    node: Arc<Node>,
    readable: bool,
    writable: bool,
    append: bool,
}

impl FileHandle for MemFile {
    fn stat(&self) -> Result<FileAttr> {
        Ok(self.node.attr())
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        if !self.readable {
            return Err(Error::EBADF);
        }
        let content = self.node.content.read().unwrap();
        if offset >= content.len() as u64 {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(content.len() - start);
        buf[..n].copy_from_slice(&content[start..start + n]);
        Ok(n)
    }

    fn write_at(&self, data: &[u8], offset: u64) -> Result<usize> {
        if !self.writable {
            return Err(Error::EBADF);
        }
        let mut content = self.node.content.write().unwrap();
        let start = if self.append {
            content.len()
        } else {
            usize::try_from(offset).map_err(|_| Error::EFBIG)?
        };
        let end = start.checked_add(data.len()).ok_or(Error::EFBIG)?;
        if end > content.len() {
            content.resize(end, 0);
        }
        content[start..end].copy_from_slice(data);
        self.node.meta.lock().unwrap().mtime = now_secs();
        Ok(data.len())
    }

    fn setstat(&self, attr: &FileAttr) -> Result<()> {
        self.node.apply_setstat(attr);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct MemDirReader {
    entries: Vec<DirEntry>,
    pos: usize,
}

impl DirReader for MemDirReader {
    fn read_entries(&mut self, out: &mut Vec<DirEntry>, limit: usize) -> Result<bool> {
        let n = limit.min(self.entries.len() - self.pos);
        out.extend_from_slice(&self.entries[self.pos..self.pos + n]);
        self.pos += n;
        Ok(self.pos == self.entries.len())
    }
}
