use crate::attr::FileAttr;
use crate::status::StatusCode;
use crate::wire::{Deserializer, Serializer};
use crate::OpenFlags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;
use wherry_constants::Error;

/// Packet type numbers from draft-ietf-secsh-filexfer-02 section 3.
#[derive(Copy, Clone, FromPrimitive, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum PacketType {
    Init = 1,
    Version = 2,
    Open = 3,
    Close = 4,
    Read = 5,
    Write = 6,
    Lstat = 7,
    Fstat = 8,
    Setstat = 9,
    Fsetstat = 10,
    Opendir = 11,
    Readdir = 12,
    Remove = 13,
    Mkdir = 14,
    Rmdir = 15,
    Realpath = 16,
    Stat = 17,
    Rename = 18,
    Readlink = 19,
    Symlink = 20,
    Status = 101,
    Handle = 102,
    Data = 103,
    Name = 104,
    Attrs = 105,
    Extended = 200,
    ExtendedReply = 201,
}

/// Which order the two paths of a SYMLINK packet appear in.
///
/// OpenSSH shipped SYMLINK with `targetpath` first, the reverse of the
/// draft, and the deployed base follows it.  Servers must pick one order and
/// keep it for the whole session; `OpenSsh` is the interoperable default.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum SymlinkOrder {
    /// `targetpath, linkpath` — what OpenSSH actually sends.
    OpenSsh,
    /// `linkpath, targetpath` — the order the draft specifies.
    Spec,
}

impl Default for SymlinkOrder {
    fn default() -> Self {
        SymlinkOrder::OpenSsh
    }
}

/// A name/data pair from an INIT or VERSION packet.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExtensionPair {
    pub name: String,
    pub data: String,
}

/// One item of a NAME response: short name, `ls -l`-style long name, and
/// attributes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NameEntry {
    pub name: String,
    pub long_name: String,
    pub attr: FileAttr,
}

impl NameEntry {
    fn encoded_size(&self) -> usize {
        4 + self.name.len() + 4 + self.long_name.len() + self.attr.encoded_size()
    }
}

/// A client-to-server packet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Request {
    Init {
        version: u32,
        extensions: Vec<ExtensionPair>,
    },
    Open {
        id: u32,
        path: String,
        pflags: OpenFlags,
        attr: FileAttr,
    },
    Close {
        id: u32,
        handle: String,
    },
    Read {
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    },
    Write {
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    },
    Lstat {
        id: u32,
        path: String,
    },
    Fstat {
        id: u32,
        handle: String,
    },
    Setstat {
        id: u32,
        path: String,
        attr: FileAttr,
    },
    Fsetstat {
        id: u32,
        handle: String,
        attr: FileAttr,
    },
    Opendir {
        id: u32,
        path: String,
    },
    Readdir {
        id: u32,
        handle: String,
    },
    Remove {
        id: u32,
        path: String,
    },
    Mkdir {
        id: u32,
        path: String,
        attr: FileAttr,
    },
    Rmdir {
        id: u32,
        path: String,
    },
    Realpath {
        id: u32,
        path: String,
    },
    Stat {
        id: u32,
        path: String,
    },
    Rename {
        id: u32,
        old_path: String,
        new_path: String,
    },
    Readlink {
        id: u32,
        path: String,
    },
    Symlink {
        id: u32,
        link_path: String,
        target_path: String,
    },
    Extended {
        id: u32,
        name: String,
        data: Vec<u8>,
    },
}

// Many request packets are just `u32 id | string`; these helpers cover that
// shape and the `u32 id | string | attrs` one.

fn encode_id_string(kind: PacketType, id: u32, s: &str) -> Result<Vec<u8>, Error> {
    let mut ser = Serializer::frame(kind as u8, 4 + 4 + s.len())?;
    ser.write_u32(id);
    ser.write_string(s.as_bytes())?;
    Ok(ser.into_inner())
}

fn encode_id_string_attr(
    kind: PacketType,
    id: u32,
    s: &str,
    attr: &FileAttr,
) -> Result<Vec<u8>, Error> {
    let mut ser = Serializer::frame(kind as u8, 4 + 4 + s.len() + attr.encoded_size())?;
    ser.write_u32(id);
    ser.write_string(s.as_bytes())?;
    ser.write_attr(attr)?;
    Ok(ser.into_inner())
}

fn decode_id_string(d: &mut Deserializer<'_>) -> Result<(u32, String), Error> {
    let id = d.read_u32()?;
    let s = d.read_str()?.to_owned();
    Ok((id, s))
}

fn decode_id_string_attr(d: &mut Deserializer<'_>) -> Result<(u32, String, FileAttr), Error> {
    let id = d.read_u32()?;
    let s = d.read_str()?.to_owned();
    let attr = d.read_attr()?;
    Ok((id, s, attr))
}

impl Request {
    pub fn kind(&self) -> PacketType {
        match self {
            Request::Init { .. } => PacketType::Init,
            Request::Open { .. } => PacketType::Open,
            Request::Close { .. } => PacketType::Close,
            Request::Read { .. } => PacketType::Read,
            Request::Write { .. } => PacketType::Write,
            Request::Lstat { .. } => PacketType::Lstat,
            Request::Fstat { .. } => PacketType::Fstat,
            Request::Setstat { .. } => PacketType::Setstat,
            Request::Fsetstat { .. } => PacketType::Fsetstat,
            Request::Opendir { .. } => PacketType::Opendir,
            Request::Readdir { .. } => PacketType::Readdir,
            Request::Remove { .. } => PacketType::Remove,
            Request::Mkdir { .. } => PacketType::Mkdir,
            Request::Rmdir { .. } => PacketType::Rmdir,
            Request::Realpath { .. } => PacketType::Realpath,
            Request::Stat { .. } => PacketType::Stat,
            Request::Rename { .. } => PacketType::Rename,
            Request::Readlink { .. } => PacketType::Readlink,
            Request::Symlink { .. } => PacketType::Symlink,
            Request::Extended { .. } => PacketType::Extended,
        }
    }

    /// The client-chosen request id, or `None` for INIT.
    pub fn request_id(&self) -> Option<u32> {
        match self {
            Request::Init { .. } => None,
            Request::Open { id, .. }
            | Request::Close { id, .. }
            | Request::Read { id, .. }
            | Request::Write { id, .. }
            | Request::Lstat { id, .. }
            | Request::Fstat { id, .. }
            | Request::Setstat { id, .. }
            | Request::Fsetstat { id, .. }
            | Request::Opendir { id, .. }
            | Request::Readdir { id, .. }
            | Request::Remove { id, .. }
            | Request::Mkdir { id, .. }
            | Request::Rmdir { id, .. }
            | Request::Realpath { id, .. }
            | Request::Stat { id, .. }
            | Request::Rename { id, .. }
            | Request::Readlink { id, .. }
            | Request::Symlink { id, .. }
            | Request::Extended { id, .. } => Some(*id),
        }
    }

    /// Decodes a request body of the given packet type.
    ///
    /// Fails with `EBADMSG` on truncated or malformed input and with
    /// `EOPNOTSUPP` when `kind` is not a client-to-server packet.
    pub fn decode(
        kind: PacketType,
        body: &[u8],
        order: SymlinkOrder,
    ) -> Result<Request, Error> {
        let mut d = Deserializer::new(body);
        match kind {
            PacketType::Init => {
                let version = d.read_u32()?;
                let mut extensions = Vec::new();
                while !d.is_empty() {
                    extensions.push(ExtensionPair {
                        name: d.read_str()?.to_owned(),
                        data: d.read_str()?.to_owned(),
                    });
                }
                Ok(Request::Init {
                    version,
                    extensions,
                })
            }
            PacketType::Open => {
                let id = d.read_u32()?;
                let path = d.read_str()?.to_owned();
                let pflags = OpenFlags::from_bits_truncate(d.read_u32()?);
                let attr = d.read_attr()?;
                Ok(Request::Open {
                    id,
                    path,
                    pflags,
                    attr,
                })
            }
            PacketType::Close => {
                let (id, handle) = decode_id_string(&mut d)?;
                Ok(Request::Close { id, handle })
            }
            PacketType::Read => {
                let id = d.read_u32()?;
                let handle = d.read_str()?.to_owned();
                let offset = d.read_u64()?;
                let len = d.read_u32()?;
                Ok(Request::Read {
                    id,
                    handle,
                    offset,
                    len,
                })
            }
            PacketType::Write => {
                let id = d.read_u32()?;
                let handle = d.read_str()?.to_owned();
                let offset = d.read_u64()?;
                let data = d.read_string()?.to_vec();
                Ok(Request::Write {
                    id,
                    handle,
                    offset,
                    data,
                })
            }
            PacketType::Lstat => {
                let (id, path) = decode_id_string(&mut d)?;
                Ok(Request::Lstat { id, path })
            }
            PacketType::Fstat => {
                let (id, handle) = decode_id_string(&mut d)?;
                Ok(Request::Fstat { id, handle })
            }
            PacketType::Setstat => {
                let (id, path, attr) = decode_id_string_attr(&mut d)?;
                Ok(Request::Setstat { id, path, attr })
            }
            PacketType::Fsetstat => {
                let (id, handle, attr) = decode_id_string_attr(&mut d)?;
                Ok(Request::Fsetstat { id, handle, attr })
            }
            PacketType::Opendir => {
                let (id, path) = decode_id_string(&mut d)?;
                Ok(Request::Opendir { id, path })
            }
            PacketType::Readdir => {
                let (id, handle) = decode_id_string(&mut d)?;
                Ok(Request::Readdir { id, handle })
            }
            PacketType::Remove => {
                let (id, path) = decode_id_string(&mut d)?;
                Ok(Request::Remove { id, path })
            }
            PacketType::Mkdir => {
                let (id, path, attr) = decode_id_string_attr(&mut d)?;
                Ok(Request::Mkdir { id, path, attr })
            }
            PacketType::Rmdir => {
                let (id, path) = decode_id_string(&mut d)?;
                Ok(Request::Rmdir { id, path })
            }
            PacketType::Realpath => {
                let (id, path) = decode_id_string(&mut d)?;
                Ok(Request::Realpath { id, path })
            }
            PacketType::Stat => {
                let (id, path) = decode_id_string(&mut d)?;
                Ok(Request::Stat { id, path })
            }
            PacketType::Rename => {
                let id = d.read_u32()?;
                let old_path = d.read_str()?.to_owned();
                let new_path = d.read_str()?.to_owned();
                Ok(Request::Rename {
                    id,
                    old_path,
                    new_path,
                })
            }
            PacketType::Readlink => {
                let (id, path) = decode_id_string(&mut d)?;
                Ok(Request::Readlink { id, path })
            }
            PacketType::Symlink => {
                let id = d.read_u32()?;
                let first = d.read_str()?.to_owned();
                let second = d.read_str()?.to_owned();
                let (link_path, target_path) = match order {
                    SymlinkOrder::Spec => (first, second),
                    SymlinkOrder::OpenSsh => (second, first),
                };
                Ok(Request::Symlink {
                    id,
                    link_path,
                    target_path,
                })
            }
            PacketType::Extended => {
                let id = d.read_u32()?;
                let name = d.read_str()?.to_owned();
                let data = d.read_data(d.remaining())?.to_vec();
                Ok(Request::Extended { id, name, data })
            }
            _ => Err(Error::EOPNOTSUPP),
        }
    }

    /// Encodes a complete frame, length prefix included, with one allocation.
    pub fn encode(&self, order: SymlinkOrder) -> Result<Vec<u8>, Error> {
        match self {
            Request::Init {
                version,
                extensions,
            } => {
                let mut len = 4;
                for ext in extensions {
                    len += 8 + ext.name.len() + ext.data.len();
                }
                let mut s = Serializer::frame(PacketType::Init as u8, len)?;
                s.write_u32(*version);
                for ext in extensions {
                    s.write_string(ext.name.as_bytes())?;
                    s.write_string(ext.data.as_bytes())?;
                }
                Ok(s.into_inner())
            }
            Request::Open {
                id,
                path,
                pflags,
                attr,
            } => {
                let len = 4 + 4 + path.len() + 4 + attr.encoded_size();
                let mut s = Serializer::frame(PacketType::Open as u8, len)?;
                s.write_u32(*id);
                s.write_string(path.as_bytes())?;
                s.write_u32(pflags.bits());
                s.write_attr(attr)?;
                Ok(s.into_inner())
            }
            Request::Close { id, handle } => encode_id_string(PacketType::Close, *id, handle),
            Request::Read {
                id,
                handle,
                offset,
                len,
            } => {
                let mut s =
                    Serializer::frame(PacketType::Read as u8, 4 + 4 + handle.len() + 8 + 4)?;
                s.write_u32(*id);
                s.write_string(handle.as_bytes())?;
                s.write_u64(*offset);
                s.write_u32(*len);
                Ok(s.into_inner())
            }
            Request::Write {
                id,
                handle,
                offset,
                data,
            } => {
                let len = 4 + 4 + handle.len() + 8 + 4 + data.len();
                let mut s = Serializer::frame(PacketType::Write as u8, len)?;
                s.write_u32(*id);
                s.write_string(handle.as_bytes())?;
                s.write_u64(*offset);
                s.write_string(data)?;
                Ok(s.into_inner())
            }
            Request::Lstat { id, path } => encode_id_string(PacketType::Lstat, *id, path),
            Request::Fstat { id, handle } => encode_id_string(PacketType::Fstat, *id, handle),
            Request::Setstat { id, path, attr } => {
                encode_id_string_attr(PacketType::Setstat, *id, path, attr)
            }
            Request::Fsetstat { id, handle, attr } => {
                encode_id_string_attr(PacketType::Fsetstat, *id, handle, attr)
            }
            Request::Opendir { id, path } => encode_id_string(PacketType::Opendir, *id, path),
            Request::Readdir { id, handle } => encode_id_string(PacketType::Readdir, *id, handle),
            Request::Remove { id, path } => encode_id_string(PacketType::Remove, *id, path),
            Request::Mkdir { id, path, attr } => {
                encode_id_string_attr(PacketType::Mkdir, *id, path, attr)
            }
            Request::Rmdir { id, path } => encode_id_string(PacketType::Rmdir, *id, path),
            Request::Realpath { id, path } => encode_id_string(PacketType::Realpath, *id, path),
            Request::Stat { id, path } => encode_id_string(PacketType::Stat, *id, path),
            Request::Rename {
                id,
                old_path,
                new_path,
            } => {
                let len = 4 + 4 + old_path.len() + 4 + new_path.len();
                let mut s = Serializer::frame(PacketType::Rename as u8, len)?;
                s.write_u32(*id);
                s.write_string(old_path.as_bytes())?;
                s.write_string(new_path.as_bytes())?;
                Ok(s.into_inner())
            }
            Request::Readlink { id, path } => encode_id_string(PacketType::Readlink, *id, path),
            Request::Symlink {
                id,
                link_path,
                target_path,
            } => {
                let len = 4 + 4 + link_path.len() + 4 + target_path.len();
                let mut s = Serializer::frame(PacketType::Symlink as u8, len)?;
                s.write_u32(*id);
                let (first, second) = match order {
                    SymlinkOrder::Spec => (link_path, target_path),
                    SymlinkOrder::OpenSsh => (target_path, link_path),
                };
                s.write_string(first.as_bytes())?;
                s.write_string(second.as_bytes())?;
                Ok(s.into_inner())
            }
            Request::Extended { id, name, data } => {
                let len = 4 + 4 + name.len() + data.len();
                let mut s = Serializer::frame(PacketType::Extended as u8, len)?;
                s.write_u32(*id);
                s.write_string(name.as_bytes())?;
                s.write_data(data);
                Ok(s.into_inner())
            }
        }
    }
}

/// A server-to-client packet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Response {
    Version {
        version: u32,
        extensions: Vec<ExtensionPair>,
    },
    Status {
        id: u32,
        code: StatusCode,
        msg: String,
        lang: String,
    },
    Handle {
        id: u32,
        handle: String,
    },
    Data {
        id: u32,
        data: Vec<u8>,
    },
    Name {
        id: u32,
        entries: Vec<NameEntry>,
    },
    Attrs {
        id: u32,
        attr: FileAttr,
    },
    ExtendedReply {
        id: u32,
        data: Vec<u8>,
    },
}

impl Response {
    pub fn kind(&self) -> PacketType {
        match self {
            Response::Version { .. } => PacketType::Version,
            Response::Status { .. } => PacketType::Status,
            Response::Handle { .. } => PacketType::Handle,
            Response::Data { .. } => PacketType::Data,
            Response::Name { .. } => PacketType::Name,
            Response::Attrs { .. } => PacketType::Attrs,
            Response::ExtendedReply { .. } => PacketType::ExtendedReply,
        }
    }

    /// The echoed request id, or `None` for VERSION.
    pub fn request_id(&self) -> Option<u32> {
        match self {
            Response::Version { .. } => None,
            Response::Status { id, .. }
            | Response::Handle { id, .. }
            | Response::Data { id, .. }
            | Response::Name { id, .. }
            | Response::Attrs { id, .. }
            | Response::ExtendedReply { id, .. } => Some(*id),
        }
    }

    /// A STATUS response with the default language tag.
    pub fn status(id: u32, code: StatusCode, msg: &str) -> Response {
        Response::Status {
            id,
            code,
            msg: msg.to_owned(),
            lang: "en".to_owned(),
        }
    }

    /// A STATUS response for a handler error, per the status-code taxonomy.
    pub fn status_from_error(id: u32, err: Error) -> Response {
        Response::status(id, StatusCode::from(err), &err.to_string())
    }

    /// A STATUS OK response.
    pub fn ok(id: u32) -> Response {
        Response::status(id, StatusCode::Ok, StatusCode::Ok.message())
    }

    /// Encodes a complete frame, length prefix included, with one allocation.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        match self {
            Response::Version {
                version,
                extensions,
            } => {
                let mut len = 4;
                for ext in extensions {
                    len += 8 + ext.name.len() + ext.data.len();
                }
                let mut s = Serializer::frame(PacketType::Version as u8, len)?;
                s.write_u32(*version);
                for ext in extensions {
                    s.write_string(ext.name.as_bytes())?;
                    s.write_string(ext.data.as_bytes())?;
                }
                Ok(s.into_inner())
            }
            Response::Status {
                id,
                code,
                msg,
                lang,
            } => {
                let len = 4 + 4 + 4 + msg.len() + 4 + lang.len();
                let mut s = Serializer::frame(PacketType::Status as u8, len)?;
                s.write_u32(*id);
                s.write_u32(*code as u32);
                s.write_string(msg.as_bytes())?;
                s.write_string(lang.as_bytes())?;
                Ok(s.into_inner())
            }
            Response::Handle { id, handle } => encode_id_string(PacketType::Handle, *id, handle),
            Response::Data { id, data } => {
                let mut s = Serializer::frame(PacketType::Data as u8, 4 + 4 + data.len())?;
                s.write_u32(*id);
                s.write_string(data)?;
                Ok(s.into_inner())
            }
            Response::Name { id, entries } => {
                let mut len = 4 + 4;
                for entry in entries {
                    len += entry.encoded_size();
                }
                let mut s = Serializer::frame(PacketType::Name as u8, len)?;
                s.write_u32(*id);
                s.write_u32(entries.len() as u32);
                for entry in entries {
                    s.write_string(entry.name.as_bytes())?;
                    s.write_string(entry.long_name.as_bytes())?;
                    s.write_attr(&entry.attr)?;
                }
                Ok(s.into_inner())
            }
            Response::Attrs { id, attr } => {
                let mut s =
                    Serializer::frame(PacketType::Attrs as u8, 4 + attr.encoded_size())?;
                s.write_u32(*id);
                s.write_attr(attr)?;
                Ok(s.into_inner())
            }
            Response::ExtendedReply { id, data } => {
                let mut s =
                    Serializer::frame(PacketType::ExtendedReply as u8, 4 + data.len())?;
                s.write_u32(*id);
                s.write_data(data);
                Ok(s.into_inner())
            }
        }
    }

    /// Decodes a response body of the given packet type.
    pub fn decode(kind: PacketType, body: &[u8]) -> Result<Response, Error> {
        let mut d = Deserializer::new(body);
        match kind {
            PacketType::Version => {
                let version = d.read_u32()?;
                let mut extensions = Vec::new();
                while !d.is_empty() {
                    extensions.push(ExtensionPair {
                        name: d.read_str()?.to_owned(),
                        data: d.read_str()?.to_owned(),
                    });
                }
                Ok(Response::Version {
                    version,
                    extensions,
                })
            }
            PacketType::Status => {
                let id = d.read_u32()?;
                let code = StatusCode::from_u32(d.read_u32()?).ok_or(Error::EBADMSG)?;
                let msg = d.read_str()?.to_owned();
                let lang = d.read_str()?.to_owned();
                Ok(Response::Status {
                    id,
                    code,
                    msg,
                    lang,
                })
            }
            PacketType::Handle => {
                let (id, handle) = decode_id_string(&mut d)?;
                Ok(Response::Handle { id, handle })
            }
            PacketType::Data => {
                let id = d.read_u32()?;
                let data = d.read_string()?.to_vec();
                Ok(Response::Data { id, data })
            }
            PacketType::Name => {
                let id = d.read_u32()?;
                let count = d.read_u32()?;
                let mut entries = Vec::new();
                for _ in 0..count {
                    entries.push(NameEntry {
                        name: d.read_str()?.to_owned(),
                        long_name: d.read_str()?.to_owned(),
                        attr: d.read_attr()?,
                    });
                }
                Ok(Response::Name { id, entries })
            }
            PacketType::Attrs => {
                let id = d.read_u32()?;
                let attr = d.read_attr()?;
                Ok(Response::Attrs { id, attr })
            }
            PacketType::ExtendedReply => {
                let id = d.read_u32()?;
                let data = d.read_data(d.remaining())?.to_vec();
                Ok(Response::ExtendedReply { id, data })
            }
            _ => Err(Error::EOPNOTSUPP),
        }
    }
}

/// Extracts the request id from the front of an undecodable packet body so a
/// failure STATUS can still echo it.
pub fn peek_request_id(body: &[u8]) -> Option<u32> {
    Deserializer::new(body).read_u32().ok()
}

#[cfg(test)]
mod tests {
    use super::{
        ExtensionPair, NameEntry, PacketType, Request, Response, SymlinkOrder,
    };
    use crate::attr::{Extension, FileAttr};
    use crate::status::StatusCode;
    use crate::OpenFlags;
    use num_traits::FromPrimitive;
    use std::convert::TryInto;
    use wherry_constants::Error;

    fn split_frame(frame: &[u8]) -> (PacketType, &[u8]) {
        let len = u32::from_be_bytes(frame[0..4].try_into().unwrap()) as usize;
        assert_eq!(len, frame.len() - 4, "length prefix must be total - 4");
        let kind = PacketType::from_u8(frame[4]).expect("known packet type");
        (kind, &frame[5..])
    }

    fn request_round_trip(req: Request, order: SymlinkOrder) {
        let frame = req.encode(order).unwrap();
        let (kind, body) = split_frame(&frame);
        assert_eq!(kind, req.kind());
        let decoded = Request::decode(kind, body, order).unwrap();
        assert_eq!(decoded, req);
    }

    fn response_round_trip(resp: Response) {
        let frame = resp.encode().unwrap();
        let (kind, body) = split_frame(&frame);
        assert_eq!(kind, resp.kind());
        let decoded = Response::decode(kind, body).unwrap();
        assert_eq!(decoded, resp);
    }

    fn sample_attr() -> FileAttr {
        FileAttr {
            size: Some(1234),
            uid: Some(1000),
            gid: Some(100),
            permissions: Some(0o100644),
            atime: Some(1_600_000_000),
            mtime: Some(1_600_000_100),
            extended: vec![Extension {
                name: "vendor@example.com".into(),
                data: b"xyz".to_vec(),
            }],
            unknown_flags: 0x0001_0000,
        }
    }

    #[test]
    fn request_round_trips() {
        let order = SymlinkOrder::default();
        let reqs = vec![
            Request::Init {
                version: 3,
                extensions: vec![ExtensionPair {
                    name: "posix-rename@openssh.com".into(),
                    data: "1".into(),
                }],
            },
            Request::Open {
                id: 1,
                path: "/a/b".into(),
                pflags: OpenFlags::WRITE | OpenFlags::CREATE,
                attr: sample_attr(),
            },
            Request::Close {
                id: 2,
                handle: "h1".into(),
            },
            Request::Read {
                id: 3,
                handle: "h1".into(),
                offset: 1 << 33,
                len: 32768,
            },
            Request::Write {
                id: 4,
                handle: "h1".into(),
                offset: 0,
                data: b"hello".to_vec(),
            },
            Request::Lstat {
                id: 5,
                path: "/x".into(),
            },
            Request::Fstat {
                id: 6,
                handle: "h2".into(),
            },
            Request::Setstat {
                id: 7,
                path: "/x".into(),
                attr: sample_attr(),
            },
            Request::Fsetstat {
                id: 8,
                handle: "h2".into(),
                attr: FileAttr::default(),
            },
            Request::Opendir {
                id: 9,
                path: "/".into(),
            },
            Request::Readdir {
                id: 10,
                handle: "h3".into(),
            },
            Request::Remove {
                id: 11,
                path: "/x".into(),
            },
            Request::Mkdir {
                id: 12,
                path: "/d".into(),
                attr: FileAttr {
                    permissions: Some(0o755),
                    ..Default::default()
                },
            },
            Request::Rmdir {
                id: 13,
                path: "/d".into(),
            },
            Request::Realpath {
                id: 14,
                path: ".".into(),
            },
            Request::Stat {
                id: 15,
                path: "/x".into(),
            },
            Request::Rename {
                id: 16,
                old_path: "/a".into(),
                new_path: "/b".into(),
            },
            Request::Readlink {
                id: 17,
                path: "/l".into(),
            },
            Request::Symlink {
                id: 18,
                link_path: "/l".into(),
                target_path: "/t".into(),
            },
            Request::Extended {
                id: 19,
                name: "statvfs@openssh.com".into(),
                data: b"\x00\x00\x00\x01/".to_vec(),
            },
        ];
        for req in reqs {
            request_round_trip(req, order);
        }
    }

    #[test]
    fn response_round_trips() {
        let resps = vec![
            Response::Version {
                version: 3,
                extensions: vec![],
            },
            Response::status(1, StatusCode::Ok, "OK"),
            Response::status(2, StatusCode::Eof, "end of file"),
            Response::Handle {
                id: 3,
                handle: "a1".into(),
            },
            Response::Data {
                id: 4,
                data: vec![0, 1, 2, 3, 0xff],
            },
            Response::Name {
                id: 5,
                entries: vec![
                    NameEntry {
                        name: "file".into(),
                        long_name: "-rw-r--r-- 1 0 0 3 file".into(),
                        attr: sample_attr(),
                    },
                    NameEntry {
                        name: "dir".into(),
                        long_name: "drwxr-xr-x 1 0 0 0 dir".into(),
                        attr: FileAttr::default(),
                    },
                ],
            },
            Response::Attrs {
                id: 6,
                attr: sample_attr(),
            },
            Response::ExtendedReply {
                id: 7,
                data: vec![0u8; 88],
            },
        ];
        for resp in resps {
            response_round_trip(resp);
        }
    }

    #[test]
    fn symlink_orders_differ_on_the_wire() {
        let req = Request::Symlink {
            id: 1,
            link_path: "/link".into(),
            target_path: "/target".into(),
        };
        let openssh = req.encode(SymlinkOrder::OpenSsh).unwrap();
        let spec = req.encode(SymlinkOrder::Spec).unwrap();
        assert_ne!(openssh, spec);

        // OpenSSH order puts the target first.
        let body = &openssh[5..];
        let mut d = crate::wire::Deserializer::new(body);
        d.read_u32().unwrap();
        assert_eq!(d.read_str().unwrap(), "/target");
        assert_eq!(d.read_str().unwrap(), "/link");

        // Decoding with the same order restores the packet; with the wrong
        // order, the paths swap.
        let decoded = Request::decode(PacketType::Symlink, &spec[5..], SymlinkOrder::Spec).unwrap();
        assert_eq!(decoded, req);
        let swapped =
            Request::decode(PacketType::Symlink, &spec[5..], SymlinkOrder::OpenSsh).unwrap();
        assert_eq!(
            swapped,
            Request::Symlink {
                id: 1,
                link_path: "/target".into(),
                target_path: "/link".into(),
            }
        );
    }

    #[test]
    fn handshake_wire_bytes() {
        // INIT v3 and VERSION v3, byte for byte.
        let init = Request::Init {
            version: 3,
            extensions: vec![],
        };
        assert_eq!(
            init.encode(SymlinkOrder::default()).unwrap(),
            [0x00, 0x00, 0x00, 0x05, 0x01, 0x00, 0x00, 0x00, 0x03]
        );
        let version = Response::Version {
            version: 3,
            extensions: vec![],
        };
        assert_eq!(
            version.encode().unwrap(),
            [0x00, 0x00, 0x00, 0x05, 0x02, 0x00, 0x00, 0x00, 0x03]
        );
    }

    #[test]
    fn truncated_bodies_fail() {
        // READ missing its length field.
        let req = Request::Read {
            id: 3,
            handle: "h".into(),
            offset: 9,
            len: 10,
        };
        let frame = req.encode(SymlinkOrder::default()).unwrap();
        let body = &frame[5..frame.len() - 2];
        assert_eq!(
            Request::decode(PacketType::Read, body, SymlinkOrder::default()),
            Err(Error::EBADMSG)
        );

        // WRITE whose data length overruns the body.
        let mut s = crate::wire::Serializer::new();
        s.write_u32(4);
        s.write_string(b"h").unwrap();
        s.write_u64(0);
        s.write_u32(100); // claims 100 bytes
        s.write_data(b"abc");
        let body = s.into_inner();
        assert_eq!(
            Request::decode(PacketType::Write, &body, SymlinkOrder::default()),
            Err(Error::EBADMSG)
        );
    }

    #[test]
    fn decode_of_non_request_kind_is_unsupported() {
        assert_eq!(
            Request::decode(PacketType::Version, &[0, 0, 0, 3], SymlinkOrder::default()),
            Err(Error::EOPNOTSUPP)
        );
    }

    #[test]
    fn peek_id() {
        assert_eq!(super::peek_request_id(&[0, 0, 0, 42, 1, 2]), Some(42));
        assert_eq!(super::peek_request_id(&[0, 0]), None);
    }

    #[test]
    fn status_from_error_maps_code_and_text() {
        match Response::status_from_error(9, Error::ENOENT) {
            Response::Status {
                id, code, lang, ..
            } => {
                assert_eq!(id, 9);
                assert_eq!(code, StatusCode::NoSuchFile);
                assert_eq!(lang, "en");
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }
}
