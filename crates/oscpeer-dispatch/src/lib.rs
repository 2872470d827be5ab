//! oscpeer dispatch
//!
//! Routes decoded OSC packets to registered handlers:
//! - pattern-keyed handler table with an explicit default-handler slot
//! - memo cache from concrete address to its matching handler set
//! - timetag-aware scheduler that defers future-dated bundles to a
//!   background worker
//!
//! The [`Dispatcher`] is a cloneable handle; clones share one routing
//! state, so the transport receive loop and application threads can hold
//! their own copies.

pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod scheduler;

pub use dispatcher::Dispatcher;
pub use error::{DispatchError, Result};
pub use handler::MessageCallback;
pub use scheduler::Scheduler;
