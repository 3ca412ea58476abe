use crate::attr::FileAttr;
use std::convert::TryInto;
use wherry_constants::Error;

/// A bounds-checked reader over a packet body.
///
/// Every read fails with `Error::EBADMSG` when the input is truncated; no
/// read ever advances past the end of the buffer.
pub struct Deserializer<'a> {
    data: &'a [u8],
    off: usize,
}

impl<'a> Deserializer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, off: 0 }
    }

    pub fn offset(&self) -> usize {
        self.off
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.off
    }

    pub fn is_empty(&self) -> bool {
        self.off == self.data.len()
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        if self.off + 1 > self.data.len() {
            return Err(Error::EBADMSG);
        }
        let v = self.data[self.off];
        self.off += 1;
        Ok(v)
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        if self.off + 4 > self.data.len() {
            return Err(Error::EBADMSG);
        }
        let v = u32::from_be_bytes(self.data[self.off..self.off + 4].try_into().unwrap());
        self.off += 4;
        Ok(v)
    }

    pub fn read_u64(&mut self) -> Result<u64, Error> {
        if self.off + 8 > self.data.len() {
            return Err(Error::EBADMSG);
        }
        let v = u64::from_be_bytes(self.data[self.off..self.off + 8].try_into().unwrap());
        self.off += 8;
        Ok(v)
    }

    /// Reads a length-prefixed byte string.
    pub fn read_string(&mut self) -> Result<&'a [u8], Error> {
        let len = self.read_u32()? as usize;
        self.read_data(len)
    }

    /// Reads a length-prefixed string and validates it as UTF-8.
    pub fn read_str(&mut self) -> Result<&'a str, Error> {
        std::str::from_utf8(self.read_string()?).map_err(|_| Error::EBADMSG)
    }

    pub fn read_data(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if len > self.remaining() {
            return Err(Error::EBADMSG);
        }
        let v = &self.data[self.off..self.off + len];
        self.off += len;
        Ok(v)
    }

    pub fn read_attr(&mut self) -> Result<FileAttr, Error> {
        FileAttr::decode(self)
    }
}

/// A writer for packet bodies and frames.
///
/// [`Serializer::frame`] pre-sizes the buffer for an entire
/// `u32 length | u8 type | data` frame so marshalling an outbound packet
/// costs a single allocation; the caller supplies the exact data length,
/// typically computed with [`FileAttr::encoded_size`] and friends.
pub struct Serializer {
    data: Vec<u8>,
}

impl Serializer {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Starts a frame of the given type with `data_len` bytes of payload to
    /// follow.  The length word counts the type byte but not itself.
    pub fn frame(kind: u8, data_len: usize) -> Result<Self, Error> {
        let body: u32 = data_len
            .checked_add(1)
            .and_then(|n| n.try_into().ok())
            .ok_or(Error::EMSGSIZE)?;
        let mut s = Serializer {
            data: Vec::with_capacity(data_len + 5),
        };
        s.write_u32(body);
        s.write_u8(kind);
        Ok(s)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    pub fn write_u8(&mut self, data: u8) {
        self.data.push(data);
    }

    pub fn write_u32(&mut self, data: u32) {
        self.data.extend(&data.to_be_bytes());
    }

    pub fn write_u64(&mut self, data: u64) {
        self.data.extend(&data.to_be_bytes());
    }

    pub fn write_string(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.len() > u32::MAX as usize {
            return Err(Error::EMSGSIZE);
        }
        self.write_u32(data.len() as u32);
        self.data.extend(data);
        Ok(())
    }

    pub fn write_data(&mut self, data: &[u8]) {
        self.data.extend(data);
    }

    pub fn write_attr(&mut self, attr: &FileAttr) -> Result<(), Error> {
        attr.encode(self)
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}
