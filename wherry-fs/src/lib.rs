//! The filesystem interface the wherry SFTP server core calls into, plus two
//! reference backends: an in-memory filesystem and a wrapper around the host
//! OS filesystem rooted at a directory.

pub mod backend;
pub mod path;

pub use backend::memory::MemoryBackend;
pub use backend::{Backend, DirEntry, DirReader, FileHandle};
pub use path::clean_path;

#[cfg(unix)]
pub use backend::host::HostBackend;
