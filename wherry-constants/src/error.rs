use num_derive::FromPrimitive;
use std::fmt;
use std::io;

/// A POSIX error code.
///
/// Backend and codec operations in this workspace report failures with these
/// codes, which the server then folds into SFTP status packets.  The meanings
/// are those specified by POSIX.
#[derive(FromPrimitive, Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub enum Error {
    EPERM = 1,
    ENOENT = 2,
    EINTR = 4,
    EIO = 5,
    ENXIO = 6,
    EBADF = 9,
    EAGAIN = 11,
    ENOMEM = 12,
    EACCES = 13,
    EFAULT = 14,
    EBUSY = 16,
    EEXIST = 17,
    EXDEV = 18,
    ENODEV = 19,
    ENOTDIR = 20,
    EISDIR = 21,
    EINVAL = 22,
    ENFILE = 23,
    EMFILE = 24,
    EFBIG = 27,
    ENOSPC = 28,
    ESPIPE = 29,
    EROFS = 30,
    EMLINK = 31,
    EPIPE = 32,
    ERANGE = 34,
    ENAMETOOLONG = 36,
    ENOSYS = 38,
    ENOTEMPTY = 39,
    ELOOP = 40,
    EPROTO = 71,
    EBADMSG = 74,
    EOVERFLOW = 75,
    EILSEQ = 84,
    ENOTSOCK = 88,
    EMSGSIZE = 90,
    EOPNOTSUPP = 95,
    ECONNRESET = 104,
    ENOTCONN = 107,
    ETIMEDOUT = 110,
    ESTALE = 116,
    EDQUOT = 122,
    ECANCELED = 125,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let e: io::Error = (*self).into();
        write!(f, "{}", e)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        match err {
            Error::EPERM => io::Error::from_raw_os_error(libc::EPERM),
            Error::ENOENT => io::Error::from_raw_os_error(libc::ENOENT),
            Error::EINTR => io::Error::from_raw_os_error(libc::EINTR),
            Error::EIO => io::Error::from_raw_os_error(libc::EIO),
            Error::ENXIO => io::Error::from_raw_os_error(libc::ENXIO),
            Error::EBADF => io::Error::from_raw_os_error(libc::EBADF),
            Error::EAGAIN => io::Error::from_raw_os_error(libc::EAGAIN),
            Error::ENOMEM => io::Error::from_raw_os_error(libc::ENOMEM),
            Error::EACCES => io::Error::from_raw_os_error(libc::EACCES),
            Error::EFAULT => io::Error::from_raw_os_error(libc::EFAULT),
            Error::EBUSY => io::Error::from_raw_os_error(libc::EBUSY),
            Error::EEXIST => io::Error::from_raw_os_error(libc::EEXIST),
            Error::EXDEV => io::Error::from_raw_os_error(libc::EXDEV),
            Error::ENODEV => io::Error::from_raw_os_error(libc::ENODEV),
            Error::ENOTDIR => io::Error::from_raw_os_error(libc::ENOTDIR),
            Error::EISDIR => io::Error::from_raw_os_error(libc::EISDIR),
            Error::EINVAL => io::Error::from_raw_os_error(libc::EINVAL),
            Error::ENFILE => io::Error::from_raw_os_error(libc::ENFILE),
            Error::EMFILE => io::Error::from_raw_os_error(libc::EMFILE),
            Error::EFBIG => io::Error::from_raw_os_error(libc::EFBIG),
            Error::ENOSPC => io::Error::from_raw_os_error(libc::ENOSPC),
            Error::ESPIPE => io::Error::from_raw_os_error(libc::ESPIPE),
            Error::EROFS => io::Error::from_raw_os_error(libc::EROFS),
            Error::EMLINK => io::Error::from_raw_os_error(libc::EMLINK),
            Error::EPIPE => io::Error::from_raw_os_error(libc::EPIPE),
            Error::ERANGE => io::Error::from_raw_os_error(libc::ERANGE),
            Error::ENAMETOOLONG => io::Error::from_raw_os_error(libc::ENAMETOOLONG),
            Error::ENOSYS => io::Error::from_raw_os_error(libc::ENOSYS),
            Error::ENOTEMPTY => io::Error::from_raw_os_error(libc::ENOTEMPTY),
            Error::ELOOP => io::Error::from_raw_os_error(libc::ELOOP),
            Error::EPROTO => io::Error::from_raw_os_error(libc::EPROTO),
            Error::EBADMSG => io::Error::from_raw_os_error(libc::EBADMSG),
            Error::EOVERFLOW => io::Error::from_raw_os_error(libc::EOVERFLOW),
            Error::EILSEQ => io::Error::from_raw_os_error(libc::EILSEQ),
            Error::ENOTSOCK => io::Error::from_raw_os_error(libc::ENOTSOCK),
            Error::EMSGSIZE => io::Error::from_raw_os_error(libc::EMSGSIZE),
            Error::EOPNOTSUPP => io::Error::from_raw_os_error(libc::EOPNOTSUPP),
            Error::ECONNRESET => io::Error::from_raw_os_error(libc::ECONNRESET),
            Error::ENOTCONN => io::Error::from_raw_os_error(libc::ENOTCONN),
            Error::ETIMEDOUT => io::Error::from_raw_os_error(libc::ETIMEDOUT),
            Error::ESTALE => io::Error::from_raw_os_error(libc::ESTALE),
            Error::EDQUOT => io::Error::from_raw_os_error(libc::EDQUOT),
            Error::ECANCELED => io::Error::from_raw_os_error(libc::ECANCELED),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::from(&err)
    }
}

impl<'a> From<&'a io::Error> for Error {
    fn from(err: &'a io::Error) -> Error {
        if let Some(code) = err.raw_os_error() {
            if let Some(e) = num_traits::FromPrimitive::from_i32(code) {
                return e;
            }
        }
        match err.kind() {
            io::ErrorKind::NotFound => Self::ENOENT,
            io::ErrorKind::PermissionDenied => Self::EACCES,
            io::ErrorKind::AlreadyExists => Self::EEXIST,
            io::ErrorKind::InvalidInput => Self::EINVAL,
            io::ErrorKind::InvalidData => Self::EBADMSG,
            io::ErrorKind::UnexpectedEof => Self::EBADMSG,
            io::ErrorKind::TimedOut => Self::ETIMEDOUT,
            io::ErrorKind::BrokenPipe => Self::EPIPE,
            io::ErrorKind::ConnectionReset => Self::ECONNRESET,
            io::ErrorKind::NotConnected => Self::ENOTCONN,
            io::ErrorKind::WriteZero => Self::EIO,
            io::ErrorKind::Interrupted => Self::EINTR,
            io::ErrorKind::OutOfMemory => Self::ENOMEM,
            _ => Self::EIO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Error;
    use std::io;

    #[test]
    fn io_round_trip() {
        let cases = &[
            Error::EPERM,
            Error::ENOENT,
            Error::EBADF,
            Error::EACCES,
            Error::EEXIST,
            Error::ENOTDIR,
            Error::EISDIR,
            Error::EINVAL,
            Error::ENOTEMPTY,
            Error::EBADMSG,
            Error::EOPNOTSUPP,
        ];
        for &e in cases {
            let ioerr: io::Error = e.into();
            assert_eq!(Error::from(&ioerr), e, "round trip through io::Error: {:?}", e);
        }
    }

    #[test]
    fn from_io_kind_when_no_errno() {
        let err = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert_eq!(Error::from(err), Error::ENOENT);
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(Error::from(err), Error::EACCES);
        let err = io::Error::new(io::ErrorKind::Other, "???");
        assert_eq!(Error::from(err), Error::EIO);
    }
}
