//! Packet dispatch: routing, validation, bundle scheduling

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use oscpeer_core::{time, Pattern, Validate};
use parking_lot::Mutex;
use rosc::{OscBundle, OscMessage, OscPacket};
use tracing::{debug, trace, warn};

use crate::handler::{Handler, HandlerTable, MessageCallback};
use crate::scheduler::Scheduler;
use crate::Result;

/// Routes decoded packets to registered handlers.
///
/// Messages are matched against registered address patterns and delivered
/// to every matching handler in registration order; when nothing matches,
/// the default handler (if set) receives the message. Bundles are unpacked
/// immediately or handed to the scheduler, depending on their timetag.
///
/// Cloning is cheap and clones share one routing state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    table: Mutex<HandlerTable>,
    scheduler: Scheduler,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                table: Mutex::new(HandlerTable::new()),
                scheduler: Scheduler::new(),
            }),
        }
    }

    /// Register a handler for an address pattern.
    ///
    /// Several handlers may share a pattern. A malformed pattern is
    /// rejected here and nothing is registered.
    pub fn add_handler<F>(&self, pattern: &str, callback: F) -> Result<()>
    where
        F: Fn(&OscMessage) + Send + Sync + 'static,
    {
        self.insert(pattern, Box::new(callback), None)
    }

    /// Like [`add_handler`](Self::add_handler), with a validator guard.
    /// The handler only sees messages the validator accepts.
    pub fn add_handler_validated<F>(
        &self,
        pattern: &str,
        validator: Arc<dyn Validate>,
        callback: F,
    ) -> Result<()>
    where
        F: Fn(&OscMessage) + Send + Sync + 'static,
    {
        self.insert(pattern, Box::new(callback), Some(validator))
    }

    fn insert(
        &self,
        pattern: &str,
        callback: MessageCallback,
        validator: Option<Arc<dyn Validate>>,
    ) -> Result<()> {
        let matcher = Pattern::compile(pattern)?;
        let mut table = self.inner.table.lock();
        table.add(matcher, Handler {
            callback,
            validator,
        });
        Ok(())
    }

    /// Remove every handler registered under exactly `pattern`.
    /// Removing an absent pattern is a no-op.
    pub fn remove_handler(&self, pattern: &str) {
        let removed = self.inner.table.lock().remove(pattern);
        trace!(pattern, removed, "handlers removed");
    }

    /// Set the default handler, replacing any prior one. It receives every
    /// message no pattern matched.
    pub fn add_default_handler<F>(&self, callback: F)
    where
        F: Fn(&OscMessage) + Send + Sync + 'static,
    {
        self.set_default(Box::new(callback), None)
    }

    /// Like [`add_default_handler`](Self::add_default_handler), with a
    /// validator guard.
    pub fn add_default_handler_validated<F>(&self, validator: Arc<dyn Validate>, callback: F)
    where
        F: Fn(&OscMessage) + Send + Sync + 'static,
    {
        self.set_default(Box::new(callback), Some(validator))
    }

    fn set_default(&self, callback: MessageCallback, validator: Option<Arc<dyn Validate>>) {
        self.inner.table.lock().set_fallback(Handler {
            callback,
            validator,
        });
    }

    /// Dispatch a decoded packet.
    ///
    /// This is the entry point used by the transport receive loop; it is
    /// public so routing can be driven directly in tests.
    pub fn dispatch(&self, packet: OscPacket) {
        match packet {
            OscPacket::Message(message) => self.dispatch_message(&message),
            OscPacket::Bundle(bundle) => self.dispatch_bundle(bundle),
        }
    }

    fn dispatch_message(&self, message: &OscMessage) {
        // Snapshot under the lock, invoke outside it: handlers may take
        // arbitrarily long or re-enter handler registration.
        let (matched, fallback) = {
            let mut table = self.inner.table.lock();
            (table.lookup(&message.addr), table.fallback())
        };

        let targets = if matched.is_empty() {
            match fallback {
                Some(handler) => vec![handler],
                None => {
                    trace!(addr = %message.addr, "no handler for message");
                    return;
                }
            }
        } else {
            matched
        };

        for handler in targets {
            if let Some(validator) = &handler.validator {
                if let Err(rejection) = validator.validate(message) {
                    debug!(addr = %message.addr, %rejection, "message rejected by validator");
                    continue;
                }
            }
            if catch_unwind(AssertUnwindSafe(|| (handler.callback)(message))).is_err() {
                warn!(addr = %message.addr, "handler panicked");
            }
        }
    }

    fn dispatch_bundle(&self, bundle: OscBundle) {
        if time::is_immediate(bundle.timetag) {
            return self.unpack(bundle);
        }
        match time::monotonic_deadline(bundle.timetag) {
            // Past timetags fire now rather than being dropped.
            None => self.unpack(bundle),
            Some(deadline) => {
                self.start_scheduler();
                self.inner.scheduler.schedule(deadline, bundle);
            }
        }
    }

    fn unpack(&self, bundle: OscBundle) {
        for element in bundle.content {
            self.dispatch(element);
        }
    }

    /// Start the scheduler worker. Idempotent; also done lazily by the
    /// first future-dated bundle.
    pub fn start_scheduler(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.scheduler.start(Arc::new(move |bundle| {
            if let Some(inner) = weak.upgrade() {
                Dispatcher { inner }.unpack(bundle);
            }
        }));
    }

    /// Stop the scheduler worker, discarding bundles still queued.
    pub fn shutdown(&self) {
        self.inner.scheduler.stop();
    }

    /// Number of bundles waiting on the scheduler.
    pub fn scheduled(&self) -> usize {
        self.inner.scheduler.pending()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
