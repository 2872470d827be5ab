//! Peer builder

use std::net::SocketAddr;
use std::time::Duration;

use crate::peer::{OscVersion, Peer, PeerConfig, TransportMode};
use crate::Result;

/// Builder for [`Peer`].
///
/// Defaults to UDP with OSC 1.0 framing; a UDP peer still needs
/// [`bind`](Self::bind) before [`build`](Self::build) succeeds.
pub struct PeerBuilder {
    config: PeerConfig,
}

impl PeerBuilder {
    pub fn new(remote: SocketAddr) -> Self {
        Self {
            config: PeerConfig::new(remote, TransportMode::Udp, OscVersion::Osc10),
        }
    }

    pub fn mode(mut self, mode: TransportMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn version(mut self, version: OscVersion) -> Self {
        self.config.version = version;
        self
    }

    /// Local bind address (UDP socket, or TCP listener endpoint).
    pub fn bind(mut self, bind: SocketAddr) -> Self {
        self.config.bind = Some(bind);
        self
    }

    /// Receive poll timeout; bounds shutdown latency.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Largest accepted packet (and receive buffer size).
    pub fn max_packet_size(mut self, size: usize) -> Self {
        self.config.max_packet_size = size;
        self
    }

    /// TCP keepalive period, `None` to disable.
    pub fn keepalive(mut self, period: Option<Duration>) -> Self {
        self.config.keepalive = period;
        self
    }

    pub fn build(self) -> Result<Peer> {
        Peer::new(self.config)
    }
}
