//! The socket seam under a [`Connection`](super::Connection).
//!
//! Connections never block on I/O: reads return `WouldBlock` when nothing
//! has arrived and writes park what the kernel would not take. Only the
//! connect itself is awaited.

use async_trait::async_trait;
use std::io;
use tokio::net::TcpStream;
use tracing::debug;

/// A connected, non-blocking byte stream.
pub trait Transport {
    /// Read whatever is available. `Ok(0)` means the peer closed the
    /// stream; `WouldBlock` means nothing has arrived yet.
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write `data` without blocking. Bytes the socket cannot take right
    /// now are kept and written ahead of the next call.
    fn write(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Opens transports.
#[async_trait(?Send)]
pub trait Connector {
    async fn connect(&self, address: &str, port: u16) -> io::Result<Box<dyn Transport>>;
}

/// Plain TCP.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait(?Send)]
impl Connector for TcpConnector {
    async fn connect(&self, address: &str, port: u16) -> io::Result<Box<dyn Transport>> {
        let stream = TcpStream::connect((address, port)).await?;
        stream.set_nodelay(true)?;
        debug!(address = %address, port, "TCP connected");
        Ok(Box::new(TcpTransport::new(stream)))
    }
}

pub struct TcpTransport {
    stream: TcpStream,
    pending: Vec<u8>,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            pending: Vec::new(),
        }
    }

    fn flush_pending(&mut self) -> io::Result<()> {
        while !self.pending.is_empty() {
            match self.stream.try_write(&self.pending) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.pending.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl Transport for TcpTransport {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.flush_pending()?;
        self.stream.try_read(buf)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.pending.extend_from_slice(data);
        self.flush_pending()
    }
}
