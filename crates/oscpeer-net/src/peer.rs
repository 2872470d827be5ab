//! The OSC peer: transport lifecycle, send path, receive loop
//!
//! A peer is a symmetric endpoint bound to one remote: it sends with
//! [`Peer::send`] and, once [`Peer::start_listening`] is called, receives
//! on a background thread that decodes incoming packets and hands them to
//! the shared [`Dispatcher`]. Neither side is a client or a server; over
//! TCP, whichever peer sends first opens the connection and the other
//! accepts it.

use std::io::{ErrorKind, Read};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use oscpeer_dispatch::Dispatcher;
use parking_lot::Mutex;
use rosc::{OscMessage, OscPacket, OscType};
use tracing::{debug, error, info, warn};

use crate::builder::PeerBuilder;
use crate::frame::{self, FrameDecoder, Framing};
use crate::tcp::TcpLink;
use crate::udp::UdpLink;
use crate::{PeerError, Result};

/// Transport the peer runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Connectionless datagrams
    Udp,
    /// One long-lived stream
    Tcp,
}

/// OSC version, which selects the TCP framing. UDP behaves identically
/// under both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OscVersion {
    /// OSC 1.0: SLIP framing over TCP
    Osc10,
    /// OSC 1.1: length-prefix framing over TCP
    Osc11,
}

impl OscVersion {
    pub(crate) fn framing(self) -> Framing {
        match self {
            OscVersion::Osc10 => Framing::Slip,
            OscVersion::Osc11 => Framing::LengthPrefix,
        }
    }
}

/// Peer configuration.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Remote endpoint this peer talks to
    pub remote: SocketAddr,
    pub mode: TransportMode,
    pub version: OscVersion,
    /// Local bind address. Required for UDP; for TCP it is where the
    /// listener accepts (defaulting to the remote port on all interfaces).
    pub bind: Option<SocketAddr>,
    /// Receive poll timeout; bounds how long shutdown can lag
    pub poll_interval: Duration,
    /// Receive buffer size, and the largest accepted packet
    pub max_packet_size: usize,
    /// TCP keepalive period, `None` to disable
    pub keepalive: Option<Duration>,
}

impl PeerConfig {
    pub fn new(remote: SocketAddr, mode: TransportMode, version: OscVersion) -> Self {
        Self {
            remote,
            mode,
            version,
            bind: None,
            poll_interval: Duration::from_millis(100),
            max_packet_size: frame::MAX_FRAME_SIZE,
            keepalive: Some(Duration::from_secs(30)),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.mode == TransportMode::Udp && self.bind.is_none() {
            return Err(PeerError::Config(
                "udp mode requires a bind address".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(PeerError::Config(
                "poll interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

enum Link {
    Udp(UdpLink),
    Tcp(TcpLink),
}

/// A symmetric OSC endpoint. Cloning is cheap; clones share the transport,
/// dispatcher, and lifecycle.
#[derive(Clone)]
pub struct Peer {
    inner: Arc<PeerInner>,
}

struct PeerInner {
    config: PeerConfig,
    dispatcher: Dispatcher,
    link: Link,
    running: AtomicBool,
    receiver: Mutex<Option<JoinHandle<()>>>,
    listen_addr: Mutex<Option<SocketAddr>>,
}

impl Peer {
    /// Create a peer from a full configuration.
    ///
    /// A UDP peer binds its socket here, so sending works before
    /// [`start_listening`](Self::start_listening); a TCP peer defers all
    /// socket work to the first send or to `start_listening`.
    pub fn new(config: PeerConfig) -> Result<Self> {
        config.validate()?;

        let link = match config.mode {
            TransportMode::Udp => {
                let bind = config
                    .bind
                    .ok_or_else(|| PeerError::Config("udp mode requires a bind address".into()))?;
                Link::Udp(UdpLink::bind(bind, config.remote, config.poll_interval)?)
            }
            TransportMode::Tcp => Link::Tcp(TcpLink::new(
                config.remote,
                config.poll_interval,
                config.keepalive,
            )),
        };

        Ok(Self {
            inner: Arc::new(PeerInner {
                config,
                dispatcher: Dispatcher::new(),
                link,
                running: AtomicBool::new(false),
                receiver: Mutex::new(None),
                listen_addr: Mutex::new(None),
            }),
        })
    }

    /// Builder with defaults for everything but the remote address.
    pub fn builder(remote: SocketAddr) -> PeerBuilder {
        PeerBuilder::new(remote)
    }

    /// The dispatcher handlers are registered on.
    pub fn dispatcher(&self) -> Dispatcher {
        self.inner.dispatcher.clone()
    }

    pub fn config(&self) -> &PeerConfig {
        &self.inner.config
    }

    /// Local address: the UDP socket, or the TCP listener once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.inner.link {
            Link::Udp(udp) => udp.local_addr().ok(),
            Link::Tcp(_) => *self.inner.listen_addr.lock(),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Whether the transport can reach the remote right now. Always true
    /// for UDP; for TCP, whether a stream is currently established.
    pub fn is_connected(&self) -> bool {
        match &self.inner.link {
            Link::Udp(_) => true,
            Link::Tcp(tcp) => tcp.is_connected(),
        }
    }

    /// Encode and send one packet to the remote.
    ///
    /// Safe before `start_listening` and concurrently with receiving. On
    /// TCP a send failure marks the connection broken; the next send
    /// reconnects.
    pub fn send(&self, packet: &OscPacket) -> Result<()> {
        let payload =
            rosc::encoder::encode(packet).map_err(|e| PeerError::Encode(format!("{e:?}")))?;
        match &self.inner.link {
            Link::Udp(udp) => udp.send(&payload),
            Link::Tcp(tcp) => {
                let framed = frame::encode_frame(self.inner.config.version.framing(), &payload)?;
                tcp.send(&framed)
            }
        }
    }

    /// Send a single message.
    pub fn send_message(&self, message: OscMessage) -> Result<()> {
        self.send(&OscPacket::Message(message))
    }

    /// Send a message built from an address and its arguments.
    pub fn send_to_addr(&self, addr: &str, args: Vec<OscType>) -> Result<()> {
        self.send_message(OscMessage {
            addr: addr.to_string(),
            args,
        })
    }

    /// Spawn the receive thread and start the scheduler. Idempotent.
    pub fn start_listening(&self) -> Result<()> {
        let mut receiver = self.inner.receiver.lock();
        if let Some(handle) = receiver.as_ref() {
            if !handle.is_finished() {
                return Ok(());
            }
        }
        // reap a receive thread that stopped itself on a socket failure
        if let Some(stale) = receiver.take() {
            let _ = stale.join();
        }

        // TCP binds its listener here so the failure surfaces to the caller.
        let listener = match &self.inner.link {
            Link::Tcp(_) => {
                let listener = TcpListener::bind(self.tcp_listen_addr())
                    .map_err(|e| PeerError::BindFailed(e.to_string()))?;
                listener.set_nonblocking(true)?;
                let addr = listener.local_addr()?;
                info!(%addr, "tcp peer listening");
                *self.inner.listen_addr.lock() = Some(addr);
                Some(listener)
            }
            Link::Udp(_) => None,
        };

        self.inner.running.store(true, Ordering::SeqCst);
        self.inner.dispatcher.start_scheduler();

        let inner = self.inner.clone();
        let handle = std::thread::Builder::new()
            .name("oscpeer-recv".to_string())
            .spawn(move || receive_loop(inner, listener));
        match handle {
            Ok(handle) => {
                *receiver = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.inner.running.store(false, Ordering::SeqCst);
                Err(PeerError::Io(e))
            }
        }
    }

    /// Stop the receive thread, close the transport, and stop the
    /// scheduler. Idempotent.
    ///
    /// Must not be called from a handler: the receive thread cannot join
    /// itself, so such a call is rejected with
    /// [`PeerError::StopFromReceiveThread`].
    pub fn stop_listening(&self) -> Result<()> {
        let handle = {
            let mut receiver = self.inner.receiver.lock();
            if let Some(handle) = receiver.as_ref() {
                if handle.thread().id() == std::thread::current().id() {
                    return Err(PeerError::StopFromReceiveThread);
                }
            }
            receiver.take()
        };

        self.inner.running.store(false, Ordering::SeqCst);
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        if let Link::Tcp(tcp) = &self.inner.link {
            tcp.disconnect_any();
        }
        *self.inner.listen_addr.lock() = None;
        self.inner.dispatcher.shutdown();
        debug!("peer stopped");
        Ok(())
    }

    fn tcp_listen_addr(&self) -> SocketAddr {
        self.inner.config.bind.unwrap_or_else(|| {
            let ip: IpAddr = match self.inner.config.remote.ip() {
                IpAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
                IpAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
            };
            SocketAddr::new(ip, self.inner.config.remote.port())
        })
    }
}

fn receive_loop(inner: Arc<PeerInner>, listener: Option<TcpListener>) {
    match (&inner.link, listener) {
        (Link::Udp(udp), _) => udp_loop(&inner, udp),
        (Link::Tcp(tcp), Some(listener)) => tcp_loop(&inner, tcp, listener),
        (Link::Tcp(_), None) => error!("tcp receive loop started without a listener"),
    }
    debug!("receive loop exited");
}

fn udp_loop(inner: &PeerInner, udp: &UdpLink) {
    let mut buf = vec![0u8; inner.config.max_packet_size];
    while inner.running.load(Ordering::SeqCst) {
        match udp.recv(&mut buf) {
            Ok(Some(len)) => match rosc::decoder::decode_udp(&buf[..len]) {
                Ok((_, packet)) => inner.dispatcher.dispatch(packet),
                Err(e) => debug!(error = ?e, "discarding undecodable datagram"),
            },
            Ok(None) => {}
            Err(e) => {
                // a failing socket stops the peer rather than spinning
                error!(%e, "udp receive failed; stopping listener");
                inner.running.store(false, Ordering::SeqCst);
            }
        }
    }
}

fn tcp_loop(inner: &PeerInner, tcp: &TcpLink, listener: TcpListener) {
    while inner.running.load(Ordering::SeqCst) {
        if let Some((stream, generation)) = tcp.reader() {
            read_stream(inner, tcp, stream, generation);
        } else {
            match listener.accept() {
                Ok((stream, from)) => {
                    info!(%from, "tcp connection accepted");
                    if let Err(e) = tcp.install(stream) {
                        warn!(%e, "failed to adopt inbound connection");
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(inner.config.poll_interval);
                }
                Err(e) => {
                    error!(%e, "tcp accept failed; stopping listener");
                    inner.running.store(false, Ordering::SeqCst);
                }
            }
        }
    }
}

/// Drain one connection until it closes, fails, or the peer stops.
fn read_stream(inner: &PeerInner, tcp: &TcpLink, mut stream: TcpStream, generation: u64) {
    let framing = inner.config.version.framing();
    let mut decoder = FrameDecoder::with_max_frame(framing, inner.config.max_packet_size);
    let mut buf = [0u8; 8192];

    while inner.running.load(Ordering::SeqCst) {
        match stream.read(&mut buf) {
            Ok(0) => {
                debug!("tcp connection closed by remote");
                tcp.disconnect(generation);
                return;
            }
            Ok(n) => {
                decoder.extend(&buf[..n]);
                loop {
                    match decoder.next_frame() {
                        Ok(Some(payload)) => match rosc::decoder::decode_udp(&payload) {
                            Ok((_, packet)) => inner.dispatcher.dispatch(packet),
                            Err(e) => debug!(error = ?e, "discarding undecodable frame"),
                        },
                        Ok(None) => break,
                        Err(e) => {
                            if framing == Framing::LengthPrefix {
                                // a desynced length prefix cannot recover
                                warn!(%e, "framing lost; dropping connection");
                                tcp.disconnect(generation);
                                return;
                            }
                            // SLIP resynchronizes at the next delimiter
                            warn!(%e, "oversize frame discarded");
                        }
                    }
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => {
                warn!(%e, "tcp read failed");
                tcp.disconnect(generation);
                return;
            }
        }
    }
}
