//! # oscpeer
//!
//! A symmetric OSC endpoint over UDP or TCP. A [`Peer`] both sends and
//! receives; it is neither a client nor a server. Incoming packets are
//! decoded by `rosc` and routed through an [`oscpeer_dispatch::Dispatcher`]:
//! pattern-matched handlers, an optional default handler, and a scheduler
//! that holds future-dated bundles until their timetag.
//!
//! ## Quick start
//!
//! ```no_run
//! use oscpeer_net::{CallHandler, OscVersion, Peer, TransportMode};
//! use rosc::OscType;
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let peer = Peer::builder("192.168.1.20:9000".parse()?)
//!         .mode(TransportMode::Udp)
//!         .version(OscVersion::Osc11)
//!         .bind("0.0.0.0:9001".parse()?)
//!         .build()?;
//!
//!     peer.dispatcher().add_handler("/mixer/*/level", |msg| {
//!         println!("{} = {:?}", msg.addr, msg.args);
//!     })?;
//!
//!     peer.start_listening()?;
//!     peer.send_to_addr("/mixer/1/level", vec![OscType::Float(0.8)])?;
//!
//!     // send-and-wait on a return address
//!     let calls = CallHandler::new(&peer);
//!     let reply = calls.call(
//!         rosc::OscMessage { addr: "/ping".into(), args: vec![] },
//!         "/pong",
//!         Duration::from_secs(1),
//!         None,
//!     )?;
//!     println!("reply: {reply:?}");
//!
//!     peer.stop_listening()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Transports and framing
//!
//! - UDP: one packet per datagram; identical under OSC 1.0 and 1.1.
//!   Datagrams from any source other than the configured remote are
//!   dropped.
//! - TCP: one long-lived stream, opened by whichever peer sends first and
//!   accepted by the other. [`OscVersion::Osc10`] frames it with SLIP,
//!   [`OscVersion::Osc11`] with a 4-byte length prefix.
//!
//! ## Threads
//!
//! Each peer owns a receive thread while listening and a scheduler worker
//! while bundles are pending. Handlers run on those threads; they must not
//! call [`Peer::stop_listening`], which would mean joining the thread they
//! run on (such calls are rejected). [`CallHandler::call`] blocks its
//! calling thread up to the given timeout.

pub mod builder;
pub mod call;
pub mod error;
pub mod frame;
pub mod peer;

mod tcp;
mod udp;

pub use builder::PeerBuilder;
pub use call::{CallError, CallHandler};
pub use error::{PeerError, Result};
pub use frame::{encode_frame, FrameDecoder, Framing, MAX_FRAME_SIZE};
pub use peer::{OscVersion, Peer, PeerConfig, TransportMode};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::builder::PeerBuilder;
    pub use crate::call::{CallError, CallHandler};
    pub use crate::error::{PeerError, Result};
    pub use crate::peer::{OscVersion, Peer, PeerConfig, TransportMode};
    pub use oscpeer_core::{ArgKind, MessageSchema, Pattern, Validate, ValidationError};
    pub use oscpeer_dispatch::Dispatcher;
    pub use rosc::{OscBundle, OscMessage, OscPacket, OscTime, OscType};
}
