//! Synchronous calls over the asynchronous dispatch
//!
//! A call sends a message and blocks the caller until a reply arrives on
//! an agreed return address, or the deadline passes. The reply side is
//! ordinary dispatch: the call handler installs a fan-in handler (by
//! default as the dispatcher's default handler) that completes whichever
//! pending call is registered under the incoming address.
//!
//! One pending call per return address: a newer call on the same address
//! supersedes the older one, whose caller gets [`CallError::Superseded`].
//! Calls on distinct return addresses are fully concurrent.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use oscpeer_core::{Validate, ValidationError};
use parking_lot::{Condvar, Mutex};
use rosc::OscMessage;
use thiserror::Error;
use tracing::{debug, trace};

use crate::peer::Peer;
use crate::PeerError;

/// Why a call ended without a usable reply. A timeout is not an error;
/// [`CallHandler::call`] reports it as `Ok(None)`.
#[derive(Error, Debug)]
pub enum CallError {
    /// The reply arrived but the call's validator rejected it
    #[error("reply rejected by validator: {0}")]
    Validation(#[from] ValidationError),

    /// A newer call took over this return address
    #[error("superseded by a newer call on the same return address")]
    Superseded,

    /// The outgoing message could not be sent
    #[error("send failed: {0}")]
    Send(#[from] PeerError),
}

enum Outcome {
    Reply(OscMessage),
    Rejected(ValidationError),
    Superseded,
}

/// Single-shot slot a caller blocks on until the dispatcher (or a
/// superseding call) resolves it.
struct PendingCall {
    slot: Mutex<Option<Outcome>>,
    ready: Condvar,
    validator: Option<Arc<dyn Validate>>,
}

impl PendingCall {
    fn new(validator: Option<Arc<dyn Validate>>) -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
            validator,
        })
    }

    fn resolve(&self, outcome: Outcome) {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            *slot = Some(outcome);
        }
        drop(slot);
        self.ready.notify_all();
    }

    /// Block until resolved or the deadline passes with an empty slot.
    fn wait(&self, deadline: Instant) -> Option<Outcome> {
        let mut slot = self.slot.lock();
        loop {
            if let Some(outcome) = slot.take() {
                return Some(outcome);
            }
            if self.ready.wait_until(&mut slot, deadline).timed_out() {
                return slot.take();
            }
        }
    }

    /// Block until resolved. Only used once resolution is guaranteed to
    /// be in flight.
    fn wait_settled(&self) -> Outcome {
        let mut slot = self.slot.lock();
        loop {
            if let Some(outcome) = slot.take() {
                return outcome;
            }
            self.ready.wait(&mut slot);
        }
    }
}

/// Blocking request/response layer on top of a [`Peer`].
pub struct CallHandler {
    peer: Peer,
    pending: Arc<DashMap<String, Arc<PendingCall>>>,
}

impl CallHandler {
    /// Create a call handler whose reply fan-in is the dispatcher's
    /// default handler: any message no other handler matches is treated
    /// as a candidate reply.
    pub fn new(peer: &Peer) -> Self {
        let pending: Arc<DashMap<String, Arc<PendingCall>>> = Arc::new(DashMap::new());
        peer.dispatcher().add_default_handler(fan_in(pending.clone()));
        Self {
            peer: peer.clone(),
            pending,
        }
    }

    /// Create a call handler whose fan-in listens on a specific
    /// return-address pattern instead of the default slot.
    pub fn attach(peer: &Peer, pattern: &str) -> Result<Self, oscpeer_dispatch::DispatchError> {
        let pending: Arc<DashMap<String, Arc<PendingCall>>> = Arc::new(DashMap::new());
        peer.dispatcher().add_handler(pattern, fan_in(pending.clone()))?;
        Ok(Self {
            peer: peer.clone(),
            pending,
        })
    }

    /// Send `message` and block for a reply on `return_addr`.
    ///
    /// `Ok(None)` means the deadline passed with no reply. A validator, if
    /// given, gates the reply: a rejected reply ends the call with
    /// [`CallError::Validation`] rather than being delivered.
    pub fn call(
        &self,
        message: OscMessage,
        return_addr: &str,
        timeout: Duration,
        validator: Option<Arc<dyn Validate>>,
    ) -> Result<Option<OscMessage>, CallError> {
        let deadline = Instant::now() + timeout;
        let call = PendingCall::new(validator);

        if let Some(superseded) = self
            .pending
            .insert(return_addr.to_string(), call.clone())
        {
            debug!(return_addr, "superseding pending call");
            superseded.resolve(Outcome::Superseded);
        }

        if let Err(e) = self.peer.send_message(message) {
            // never leave a dead entry behind
            self.pending
                .remove_if(return_addr, |_, v| Arc::ptr_eq(v, &call));
            return Err(CallError::Send(e));
        }

        match call.wait(deadline) {
            Some(outcome) => finish(outcome),
            None => {
                // Deadline passed. Whoever removes the registry entry owns
                // the outcome, so delivery and timeout cannot both win.
                if self
                    .pending
                    .remove_if(return_addr, |_, v| Arc::ptr_eq(v, &call))
                    .is_some()
                {
                    trace!(return_addr, "call timed out");
                    Ok(None)
                } else {
                    // the fan-in already claimed this call; its resolve is
                    // imminent
                    finish(call.wait_settled())
                }
            }
        }
    }

    /// Number of calls currently awaiting replies.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

fn finish(outcome: Outcome) -> Result<Option<OscMessage>, CallError> {
    match outcome {
        Outcome::Reply(message) => Ok(Some(message)),
        Outcome::Rejected(rejection) => Err(CallError::Validation(rejection)),
        Outcome::Superseded => Err(CallError::Superseded),
    }
}

/// Dispatcher handler completing pending calls from incoming messages.
fn fan_in(
    pending: Arc<DashMap<String, Arc<PendingCall>>>,
) -> impl Fn(&OscMessage) + Send + Sync + 'static {
    move |message: &OscMessage| {
        let Some((_, call)) = pending.remove(&message.addr) else {
            // not a reply to anything; dropping is not an error
            trace!(addr = %message.addr, "no pending call for message");
            return;
        };
        if let Some(validator) = &call.validator {
            if let Err(rejection) = validator.validate(message) {
                debug!(addr = %message.addr, %rejection, "reply rejected by validator");
                call.resolve(Outcome::Rejected(rejection));
                return;
            }
        }
        call.resolve(Outcome::Reply(message.clone()));
    }
}
