//! Transport seam and the TCP frame channel
//!
//! The engine only needs a readiness predicate and a binary send
//! primitive; receiving is the owner's loop, which feeds raw frames to the
//! dispatcher. [`TcpTransport`] is the concrete channel used by the CLI:
//! an ordered stream of length-delimited binary frames over TCP.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use parking_lot::Mutex;

/// An open, ordered, message-oriented duplex channel.
///
/// `send` takes `&self` so every service can share one transport handle;
/// the engine is single-threaded, so sends never interleave.
pub trait Transport {
    /// True if the channel is open and writable.
    fn is_ready(&self) -> bool;

    /// Send one binary frame.
    fn send(&self, frame: &[u8]) -> io::Result<()>;
}

/// Frames larger than this are treated as a protocol violation.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// TCP transport carrying u32-BE length-delimited frames.
pub struct TcpTransport {
    stream: Mutex<Option<TcpStream>>,
}

impl TcpTransport {
    /// Connect to the monitor server.
    pub fn connect(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream: Mutex::new(Some(stream)),
        })
    }

    /// Clone the underlying stream for the inbound read loop.
    pub fn reader(&self) -> io::Result<TcpStream> {
        match &*self.stream.lock() {
            Some(stream) => stream.try_clone(),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed")),
        }
    }

    /// Set the read timeout used by the inbound loop, allowing it to
    /// interleave deadline polls with blocking reads.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match &*self.stream.lock() {
            Some(stream) => stream.set_read_timeout(timeout),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed")),
        }
    }

    /// Close the channel. Subsequent sends fail with `NotConnected`.
    pub fn close(&self) {
        if let Some(stream) = self.stream.lock().take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

impl Transport for TcpTransport {
    fn is_ready(&self) -> bool {
        self.stream.lock().is_some()
    }

    fn send(&self, frame: &[u8]) -> io::Result<()> {
        let mut guard = self.stream.lock();
        let stream = guard
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "transport closed"))?;
        let len = u32::try_from(frame.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
        if len > MAX_FRAME_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "frame too large"));
        }
        stream.write_all(&len.to_be_bytes())?;
        stream.write_all(frame)?;
        stream.flush()
    }
}

/// Read one length-delimited frame from the inbound side of the channel.
///
/// Returns `Ok(None)` on a clean end of stream at a frame boundary.
pub fn read_frame(reader: &mut impl Read) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {len} exceeds limit"),
        ));
    }
    let mut frame = vec![0u8; len as usize];
    reader.read_exact(&mut frame)?;
    Ok(Some(frame))
}
