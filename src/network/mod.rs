//! Network module.
//!
//! Contains the chat server [`Connection`], the socket seam it talks
//! through, and outbound flood limiting.

mod connection;
pub mod limit;
mod transport;

pub use connection::{Connection, ConnectionState, READ_CHUNK};
pub use transport::{Connector, TcpConnector, TcpTransport, Transport};

#[cfg(test)]
pub(crate) use connection::tests as tests_support;
