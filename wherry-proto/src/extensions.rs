use crate::wire::{Deserializer, Serializer};
use wherry_constants::Error;

pub const EXT_STATVFS: &str = "statvfs@openssh.com";
pub const EXT_POSIX_RENAME: &str = "posix-rename@openssh.com";

/// A recognized EXTENDED request, parsed from its name and request data.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExtendedRequest {
    StatVfs { path: String },
    PosixRename { old_path: String, new_path: String },
}

impl ExtendedRequest {
    /// Parses the request-specific data of an EXTENDED packet.
    ///
    /// Returns `Ok(None)` for extensions this server does not implement;
    /// those are answered with STATUS `OP_UNSUPPORTED`.
    pub fn parse(name: &str, data: &[u8]) -> Result<Option<ExtendedRequest>, Error> {
        let mut d = Deserializer::new(data);
        match name {
            EXT_STATVFS => Ok(Some(ExtendedRequest::StatVfs {
                path: d.read_str()?.to_owned(),
            })),
            EXT_POSIX_RENAME => Ok(Some(ExtendedRequest::PosixRename {
                old_path: d.read_str()?.to_owned(),
                new_path: d.read_str()?.to_owned(),
            })),
            _ => Ok(None),
        }
    }
}

/// Filesystem statistics for the `statvfs@openssh.com` extension: eleven
/// u64 fields after the EXTENDED_REPLY type byte and request id.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct StatVfs {
    pub block_size: u64,
    pub fragment_size: u64,
    pub blocks: u64,
    pub blocks_free: u64,
    pub blocks_avail: u64,
    pub files: u64,
    pub files_free: u64,
    pub files_avail: u64,
    pub fs_id: u64,
    pub flags: u64,
    pub name_max: u64,
}

impl StatVfs {
    pub const FLAG_READONLY: u64 = 0x1;
    pub const FLAG_NOSUID: u64 = 0x2;

    pub const ENCODED_SIZE: usize = 11 * 8;

    /// The EXTENDED_REPLY payload for this record.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut s = Serializer::new();
        s.write_u64(self.block_size);
        s.write_u64(self.fragment_size);
        s.write_u64(self.blocks);
        s.write_u64(self.blocks_free);
        s.write_u64(self.blocks_avail);
        s.write_u64(self.files);
        s.write_u64(self.files_free);
        s.write_u64(self.files_avail);
        s.write_u64(self.fs_id);
        s.write_u64(self.flags);
        s.write_u64(self.name_max);
        s.into_inner()
    }

    pub fn decode(d: &mut Deserializer<'_>) -> Result<StatVfs, Error> {
        Ok(StatVfs {
            block_size: d.read_u64()?,
            fragment_size: d.read_u64()?,
            blocks: d.read_u64()?,
            blocks_free: d.read_u64()?,
            blocks_avail: d.read_u64()?,
            files: d.read_u64()?,
            files_free: d.read_u64()?,
            files_avail: d.read_u64()?,
            fs_id: d.read_u64()?,
            flags: d.read_u64()?,
            name_max: d.read_u64()?,
        })
    }

    pub fn total_space(&self) -> u64 {
        self.fragment_size * self.blocks
    }

    pub fn free_space(&self) -> u64 {
        self.fragment_size * self.blocks_free
    }

    pub fn readonly(&self) -> bool {
        self.flags & Self::FLAG_READONLY != 0
    }
}
