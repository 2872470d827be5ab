//! UDP datagram link
//!
//! One OSC packet per datagram; the datagram boundary is the frame
//! boundary, so OSC 1.0 and 1.1 behave identically here. The socket is
//! bound at construction and tied to a single remote peer: datagrams from
//! any other source are dropped. This models a peer-to-peer link, not a
//! general UDP listener.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use tracing::{debug, info, trace};

use crate::{PeerError, Result};

pub(crate) struct UdpLink {
    socket: UdpSocket,
    remote: SocketAddr,
}

impl UdpLink {
    /// Bind the local socket. The read timeout doubles as the receive
    /// loop's poll interval, keeping shutdown responsive.
    pub fn bind(local: SocketAddr, remote: SocketAddr, poll_interval: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(local).map_err(|e| PeerError::BindFailed(e.to_string()))?;
        socket.set_read_timeout(Some(poll_interval))?;
        info!(local = %socket.local_addr()?, %remote, "udp peer bound");
        Ok(Self { socket, remote })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// One `sendto` per packet.
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        self.socket
            .send_to(payload, self.remote)
            .map_err(|e| PeerError::SendFailed(e.to_string()))?;
        trace!(bytes = payload.len(), to = %self.remote, "udp packet sent");
        Ok(())
    }

    /// One receive poll. `Ok(None)` on timeout or a filtered datagram.
    pub fn recv(&self, buf: &mut [u8]) -> Result<Option<usize>> {
        match self.socket.recv_from(buf) {
            Ok((len, from)) => {
                if from != self.remote {
                    debug!(%from, expected = %self.remote, "dropping datagram from unexpected source");
                    return Ok(None);
                }
                trace!(bytes = len, %from, "udp packet received");
                Ok(Some(len))
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(PeerError::Io(e)),
        }
    }
}
