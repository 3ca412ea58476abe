//! The server core of SFTP version 3 (draft-ietf-secsh-filexfer-02).
//!
//! [`Server`] consumes a bidirectional byte stream, typically an SSH session
//! channel, decodes SFTP requests, and executes them against a
//! [`wherry_fs::Backend`].  Replies are written back in request-arrival
//! order: READ and WRITE run on a small worker pool for throughput, every
//! other operation runs on a single serial worker, and an ordering
//! controller holds completed responses until their turn on the wire.

pub mod handles;
pub mod long_name;
mod manager;
pub mod server;

pub use server::{serve, Server, ServerConfig, ServerError};
