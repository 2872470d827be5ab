//! Deferred-bundle scheduler
//!
//! A single lazy background worker holds future-dated bundles in a min-heap
//! keyed by monotonic fire time and dispatches each one when it comes due.
//! Entries with equal fire times are dispatched in insertion order.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use rosc::OscBundle;
use tracing::{debug, error, trace};

/// Callback the worker fires with each due bundle.
pub type FireFn = Arc<dyn Fn(OscBundle) + Send + Sync>;

struct Entry {
    fire_at: Instant,
    seq: u64,
    bundle: OscBundle,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // seq breaks ties: FIFO within one fire time
        self.fire_at
            .cmp(&other.fire_at)
            .then(self.seq.cmp(&other.seq))
    }
}

struct State {
    queue: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    wakeup: Condvar,
}

/// Background worker for future-dated bundles.
pub struct Scheduler {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: BinaryHeap::new(),
                    next_seq: 0,
                    shutdown: false,
                }),
                wakeup: Condvar::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Launch the worker if it is not already running. Idempotent.
    pub fn start(&self, fire: FireFn) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        self.shared.state.lock().shutdown = false;

        let shared = self.shared.clone();
        match std::thread::Builder::new()
            .name("oscpeer-scheduler".to_string())
            .spawn(move || run_worker(shared, fire))
        {
            Ok(handle) => *worker = Some(handle),
            Err(e) => error!("failed to spawn scheduler worker: {}", e),
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Queue a bundle for dispatch at `fire_at`.
    pub fn schedule(&self, fire_at: Instant, bundle: OscBundle) {
        {
            let mut state = self.shared.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.queue.push(Reverse(Entry {
                fire_at,
                seq,
                bundle,
            }));
            trace!(pending = state.queue.len(), "bundle scheduled");
        }
        self.shared.wakeup.notify_one();
    }

    /// Number of bundles still waiting to fire.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Stop the worker and discard anything still queued. Idempotent.
    pub fn stop(&self) {
        let handle = self.worker.lock().take();
        let Some(handle) = handle else { return };

        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            let discarded = state.queue.len();
            state.queue.clear();
            if discarded > 0 {
                debug!(discarded, "discarding scheduled bundles on stop");
            }
        }
        self.shared.wakeup.notify_all();

        if handle.thread().id() == std::thread::current().id() {
            // Joining ourselves would deadlock; the shutdown flag already
            // makes the worker exit after the current bundle.
            error!("scheduler stop called from its own worker; skipping join");
            return;
        }
        let _ = handle.join();
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(shared: Arc<Shared>, fire: FireFn) {
    loop {
        let bundle = {
            let mut state = shared.state.lock();
            loop {
                if state.shutdown {
                    return;
                }
                let now = Instant::now();
                match state.queue.peek().map(|entry| entry.0.fire_at) {
                    None => {
                        shared.wakeup.wait(&mut state);
                    }
                    Some(fire_at) if fire_at <= now => {
                        if let Some(Reverse(entry)) = state.queue.pop() {
                            break entry.bundle;
                        }
                    }
                    Some(fire_at) => {
                        shared.wakeup.wait_until(&mut state, fire_at);
                    }
                }
            }
        };

        // Dispatch outside the lock so handlers cannot block schedule().
        if catch_unwind(AssertUnwindSafe(|| fire(bundle))).is_err() {
            error!("scheduled bundle dispatch panicked");
        }
    }
}
