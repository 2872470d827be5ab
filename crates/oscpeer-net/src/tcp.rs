//! TCP stream link
//!
//! The peer is symmetric, so the connection is "either-first": the side
//! that sends first opens it, the other side accepts a single inbound
//! connection, and both directions then share that one stream. The slot
//! mutex serializes writers; a failed write marks the connection broken
//! and the next send reconnects.
//!
//! Streams carry a generation number so the receive loop, which reads
//! from a clone of the stream, can only tear down the connection it was
//! actually reading. Without it, a stale reader noticing EOF could drop a
//! newer stream the send path had already reestablished.

use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::{PeerError, Result};

struct Conn {
    stream: TcpStream,
    generation: u64,
}

pub(crate) struct TcpLink {
    remote: SocketAddr,
    read_timeout: Duration,
    keepalive: Option<Duration>,
    conn: Mutex<Option<Conn>>,
    generations: Mutex<u64>,
}

impl TcpLink {
    pub fn new(remote: SocketAddr, read_timeout: Duration, keepalive: Option<Duration>) -> Self {
        Self {
            remote,
            read_timeout,
            keepalive,
            conn: Mutex::new(None),
            generations: Mutex::new(0),
        }
    }

    /// Write one framed packet, connecting first if no stream is active.
    pub fn send(&self, frame: &[u8]) -> Result<()> {
        let mut conn = self.conn.lock();
        if conn.is_none() {
            let stream = TcpStream::connect(self.remote)
                .map_err(|e| PeerError::ConnectionFailed(e.to_string()))?;
            self.configure(&stream)?;
            info!(remote = %self.remote, "tcp connection opened");
            *conn = Some(Conn {
                stream,
                generation: self.next_generation(),
            });
        }
        if let Some(active) = conn.as_mut() {
            if let Err(e) = active.stream.write_all(frame) {
                *conn = None;
                return Err(PeerError::SendFailed(e.to_string()));
            }
            trace!(bytes = frame.len(), "tcp frame sent");
        }
        Ok(())
    }

    /// Adopt an accepted inbound stream as the shared connection.
    pub fn install(&self, stream: TcpStream) -> Result<()> {
        self.configure(&stream)?;
        *self.conn.lock() = Some(Conn {
            stream,
            generation: self.next_generation(),
        });
        Ok(())
    }

    /// A read handle on the active stream, if any. The clone shares the
    /// underlying socket, so reads and framed writes stay concurrent.
    pub fn reader(&self) -> Option<(TcpStream, u64)> {
        let conn = self.conn.lock();
        let active = conn.as_ref()?;
        let stream = active.stream.try_clone().ok()?;
        Some((stream, active.generation))
    }

    pub fn is_connected(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Drop the active stream if it is still the given generation.
    pub fn disconnect(&self, generation: u64) {
        let mut conn = self.conn.lock();
        if conn.as_ref().is_some_and(|c| c.generation == generation) {
            *conn = None;
            debug!(remote = %self.remote, "tcp connection dropped");
        }
    }

    /// Drop whatever stream is active.
    pub fn disconnect_any(&self) {
        if self.conn.lock().take().is_some() {
            debug!(remote = %self.remote, "tcp connection dropped");
        }
    }

    fn next_generation(&self) -> u64 {
        let mut generations = self.generations.lock();
        *generations += 1;
        *generations
    }

    fn configure(&self, stream: &TcpStream) -> Result<()> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(self.read_timeout))?;
        if let Some(period) = self.keepalive {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new().with_time(period);
            let _ = socket.set_tcp_keepalive(&keepalive);
        }
        Ok(())
    }
}
