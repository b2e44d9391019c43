//! Econet FS - An Acorn Econet-compatible fileserver in Rust.
//!
//! The server speaks the classic fileserver protocol over a datagram
//! transport: stations log in, hold small-integer handles onto files and
//! directories in a case-insensitive dotted namespace, and move bulk data
//! over negotiated ancillary ports. Storage is an ordinary host directory
//! tree with per-object attribute sidecars.

pub mod attr;
pub mod bulk;
pub mod config;
pub mod discs;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod interlock;
pub mod name;
mod ops;
pub mod resolve;
pub mod server;
pub mod session;
pub mod transport;
pub mod users;
pub mod wire;

pub use config::ServerConfig;
pub use error::FsError;
pub use server::{reply_channel, start, Server, FILESERVER_PORT};
pub use transport::{Inbound, Outbound, Station, Transport};
