//! oscpeer core
//!
//! Protocol-level primitives shared by the oscpeer crates:
//! - OSC address pattern compilation and matching ([`Pattern`])
//! - NTP timetag handling and monotonic deadline conversion ([`time`])
//! - Declarative message validation ([`MessageSchema`], [`Validate`])
//!
//! The OSC wire codec itself lives in the `rosc` crate; this crate only
//! builds on its types.

pub mod error;
pub mod pattern;
pub mod time;
pub mod validate;

pub use error::{Error, Result};
pub use pattern::Pattern;
pub use validate::{ArgKind, MessageSchema, Validate, ValidationError};
