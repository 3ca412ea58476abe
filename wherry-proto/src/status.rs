use num_derive::FromPrimitive;
use wherry_constants::Error;

/// SFTP status codes, with their wire values.
///
/// Only the codes a version-3 server can emit are represented; 6 and 7 are
/// client-generated pseudo-errors.
#[derive(Copy, Clone, FromPrimitive, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum StatusCode {
    Ok = 0,
    Eof = 1,
    NoSuchFile = 2,
    PermissionDenied = 3,
    Failure = 4,
    BadMessage = 5,
    OpUnsupported = 8,
}

impl StatusCode {
    /// A default human-readable message for this code.
    pub fn message(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Eof => "end of file",
            Self::NoSuchFile => "no such file",
            Self::PermissionDenied => "permission denied",
            Self::Failure => "failure",
            Self::BadMessage => "bad message",
            Self::OpUnsupported => "operation unsupported",
        }
    }
}

impl From<Error> for StatusCode {
    // This mapping is roughly the one used by OpenSSH.
    fn from(err: Error) -> StatusCode {
        match err {
            Error::EPERM | Error::EACCES | Error::EROFS | Error::EFAULT => {
                StatusCode::PermissionDenied
            }
            Error::ENOENT | Error::ENOTDIR | Error::EBADF | Error::ELOOP => StatusCode::NoSuchFile,
            Error::EOPNOTSUPP | Error::ENOSYS => StatusCode::OpUnsupported,
            Error::EBADMSG | Error::EINVAL | Error::ENAMETOOLONG => StatusCode::BadMessage,
            _ => StatusCode::Failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::StatusCode;
    use num_traits::FromPrimitive;
    use wherry_constants::Error;

    #[test]
    fn wire_values() {
        assert_eq!(StatusCode::Ok as u32, 0);
        assert_eq!(StatusCode::Eof as u32, 1);
        assert_eq!(StatusCode::NoSuchFile as u32, 2);
        assert_eq!(StatusCode::PermissionDenied as u32, 3);
        assert_eq!(StatusCode::Failure as u32, 4);
        assert_eq!(StatusCode::BadMessage as u32, 5);
        assert_eq!(StatusCode::OpUnsupported as u32, 8);
        assert_eq!(StatusCode::from_u32(8), Some(StatusCode::OpUnsupported));
        assert_eq!(StatusCode::from_u32(6), None);
    }

    #[test]
    fn error_mapping() {
        assert_eq!(StatusCode::from(Error::ENOENT), StatusCode::NoSuchFile);
        assert_eq!(StatusCode::from(Error::EBADF), StatusCode::NoSuchFile);
        assert_eq!(StatusCode::from(Error::EACCES), StatusCode::PermissionDenied);
        assert_eq!(StatusCode::from(Error::EROFS), StatusCode::PermissionDenied);
        assert_eq!(StatusCode::from(Error::EBADMSG), StatusCode::BadMessage);
        assert_eq!(StatusCode::from(Error::EOPNOTSUPP), StatusCode::OpUnsupported);
        assert_eq!(StatusCode::from(Error::EIO), StatusCode::Failure);
        assert_eq!(StatusCode::from(Error::ENOTEMPTY), StatusCode::Failure);
    }
}
