//! Wire codec and packet types for version 3 of the SSH File Transfer
//! Protocol, as described in draft-ietf-secsh-filexfer-02.
//!
//! Every packet on the wire is `u32 length | u8 type | payload`, with all
//! integers big-endian and strings length-prefixed.  [`Request`] and
//! [`Response`] cover the full set of protocol packets; [`wire::Serializer`]
//! and [`wire::Deserializer`] provide the primitives they are built from.

#[macro_use]
extern crate bitflags;

pub mod attr;
pub mod extensions;
pub mod packet;
pub mod status;
pub mod wire;

pub use attr::{AttrFlags, Extension, FileAttr, FileMode};
pub use extensions::{ExtendedRequest, StatVfs, EXT_POSIX_RENAME, EXT_STATVFS};
pub use packet::{ExtensionPair, NameEntry, PacketType, Request, Response, SymlinkOrder};
pub use status::StatusCode;

/// The protocol version this implementation speaks.
pub const PROTOCOL_VERSION: u32 = 3;

/// The largest DATA payload the server will return for a single READ, and
/// the largest WRITE payload it expects well-behaved clients to send.
pub const MAX_DATA_PAYLOAD: u32 = 32 * 1024;

/// The maximum number of entries in a single READDIR reply.
pub const MAX_READDIR_ENTRIES: usize = 100;

bitflags! {
    /// Open-mode bits carried by an OPEN request (the `pflags` word).
    pub struct OpenFlags: u32 {
        const READ = 0x1;
        const WRITE = 0x2;
        const APPEND = 0x4;
        const CREATE = 0x8;
        const TRUNCATE = 0x10;
        const EXCLUSIVE = 0x20;
    }
}

impl OpenFlags {
    /// Whether these flags request any modification of the filesystem.
    pub fn is_mutating(self) -> bool {
        self.intersects(
            OpenFlags::WRITE | OpenFlags::APPEND | OpenFlags::CREATE | OpenFlags::TRUNCATE,
        )
    }

    /// Applies the protocol's implications before mapping onto POSIX open
    /// flags: TRUNCATE implies CREATE.
    pub fn normalized(self) -> OpenFlags {
        if self.contains(OpenFlags::TRUNCATE) {
            self | OpenFlags::CREATE
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::OpenFlags;

    #[test]
    fn truncate_normalizes_to_create() {
        let flags = (OpenFlags::WRITE | OpenFlags::TRUNCATE).normalized();
        assert!(flags.contains(OpenFlags::CREATE));

        let flags = (OpenFlags::READ | OpenFlags::WRITE).normalized();
        assert!(!flags.contains(OpenFlags::CREATE));
    }
}
