use crate::wire::{Deserializer, Serializer};
use wherry_constants::Error;

bitflags! {
    /// Validity bits in the flags word of a file-attributes record.
    pub struct AttrFlags: u32 {
        const SIZE = 0x00000001;
        const UIDGID = 0x00000002;
        const PERMISSIONS = 0x00000004;
        const ACMODTIME = 0x00000008;
        const EXTENDED = 0x80000000;
    }

    /// POSIX mode bits as carried in the permissions field.
    pub struct FileMode: u32 {
        const IFMT   = 0o170000;
        const IFSOCK = 0o140000;
        const IFLNK  = 0o120000;
        const IFREG  = 0o100000;
        const IFBLK  = 0o060000;
        const IFDIR  = 0o040000;
        const IFCHR  = 0o020000;
        const IFIFO  = 0o010000;
        const ISUID  = 0o4000;
        const ISGID  = 0o2000;
        const ISVTX  = 0o1000;
        const IRUSR  = 0o0400;
        const IWUSR  = 0o0200;
        const IXUSR  = 0o0100;
        const IRGRP  = 0o0040;
        const IWGRP  = 0o0020;
        const IXGRP  = 0o0010;
        const IROTH  = 0o0004;
        const IWOTH  = 0o0002;
        const IXOTH  = 0o0001;
    }
}

impl FileMode {
    pub fn file_type(self) -> FileMode {
        self & FileMode::IFMT
    }

    pub fn is_dir(self) -> bool {
        self.file_type() == FileMode::IFDIR
    }

    pub fn is_regular(self) -> bool {
        self.file_type() == FileMode::IFREG
    }

    pub fn is_symlink(self) -> bool {
        self.file_type() == FileMode::IFLNK
    }

    pub fn permissions(self) -> u32 {
        self.bits() & 0o7777
    }
}

/// An opaque vendor extension record inside a file-attributes record.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Extension {
    pub name: String,
    pub data: Vec<u8>,
}

/// The variable-length file-attributes record.
///
/// Fields are present on the wire exactly when the corresponding flag bit is
/// set; here each optional field is `None` when absent.  The uid/gid and
/// atime/mtime pairs share one flag apiece and are therefore encoded only
/// when both halves are present.  Extended records are carried opaquely.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FileAttr {
    pub size: Option<u64>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub permissions: Option<u32>,
    pub atime: Option<u32>,
    pub mtime: Option<u32>,
    pub extended: Vec<Extension>,
    /// Flag bits from the wire that this implementation does not recognize.
    /// They survive a round trip through the codec verbatim; whatever data
    /// they govern cannot be interpreted.
    pub unknown_flags: u32,
}

impl FileAttr {
    /// The known-flag word derived from which fields are present.  The wire
    /// flags word also carries [`FileAttr::unknown_flags`].
    pub fn flags(&self) -> AttrFlags {
        let mut flags = AttrFlags::empty();
        if self.size.is_some() {
            flags |= AttrFlags::SIZE;
        }
        if self.uid.is_some() && self.gid.is_some() {
            flags |= AttrFlags::UIDGID;
        }
        if self.permissions.is_some() {
            flags |= AttrFlags::PERMISSIONS;
        }
        if self.atime.is_some() && self.mtime.is_some() {
            flags |= AttrFlags::ACMODTIME;
        }
        if !self.extended.is_empty() {
            flags |= AttrFlags::EXTENDED;
        }
        flags
    }

    /// The exact number of bytes `encode` will produce.
    pub fn encoded_size(&self) -> usize {
        let flags = self.flags();
        let mut size = 4;
        if flags.contains(AttrFlags::SIZE) {
            size += 8;
        }
        if flags.contains(AttrFlags::UIDGID) {
            size += 8;
        }
        if flags.contains(AttrFlags::PERMISSIONS) {
            size += 4;
        }
        if flags.contains(AttrFlags::ACMODTIME) {
            size += 8;
        }
        if flags.contains(AttrFlags::EXTENDED) {
            size += 4;
            for ext in &self.extended {
                size += 8 + ext.name.len() + ext.data.len();
            }
        }
        size
    }

    pub fn encode(&self, s: &mut Serializer) -> Result<(), Error> {
        s.write_u32(self.flags().bits() | self.unknown_flags);
        if let Some(size) = self.size {
            s.write_u64(size);
        }
        if let (Some(uid), Some(gid)) = (self.uid, self.gid) {
            s.write_u32(uid);
            s.write_u32(gid);
        }
        if let Some(perms) = self.permissions {
            s.write_u32(perms);
        }
        if let (Some(atime), Some(mtime)) = (self.atime, self.mtime) {
            s.write_u32(atime);
            s.write_u32(mtime);
        }
        if !self.extended.is_empty() {
            s.write_u32(self.extended.len() as u32);
            for ext in &self.extended {
                s.write_string(ext.name.as_bytes())?;
                s.write_string(&ext.data)?;
            }
        }
        Ok(())
    }

    /// Decodes an attributes record, consuming exactly the bytes governed by
    /// its flags word.  Unknown flag bits are tolerated and preserved in
    /// [`FileAttr::unknown_flags`] so they re-emit on encode; the data of an
    /// unknown field cannot be interpreted.
    pub fn decode(d: &mut Deserializer<'_>) -> Result<FileAttr, Error> {
        let raw = d.read_u32()?;
        let flags = AttrFlags::from_bits_truncate(raw);
        let mut attr = FileAttr {
            unknown_flags: raw & !AttrFlags::all().bits(),
            ..Default::default()
        };
        if flags.contains(AttrFlags::SIZE) {
            attr.size = Some(d.read_u64()?);
        }
        if flags.contains(AttrFlags::UIDGID) {
            attr.uid = Some(d.read_u32()?);
            attr.gid = Some(d.read_u32()?);
        }
        if flags.contains(AttrFlags::PERMISSIONS) {
            attr.permissions = Some(d.read_u32()?);
        }
        if flags.contains(AttrFlags::ACMODTIME) {
            attr.atime = Some(d.read_u32()?);
            attr.mtime = Some(d.read_u32()?);
        }
        if flags.contains(AttrFlags::EXTENDED) {
            let count = d.read_u32()?;
            for _ in 0..count {
                attr.extended.push(Extension {
                    name: d.read_str()?.to_owned(),
                    data: d.read_string()?.to_vec(),
                });
            }
        }
        Ok(attr)
    }
}
