//! Timetag bundle scheduler
//!
//! Future-dated bundles wait in a min-heap keyed by monotonic fire time and
//! are dispatched by a single background worker. Fire times are converted
//! from NTP timetags to `Instant`s at scheduling time, so firing stays
//! correct across wall-clock adjustments. Entries with equal fire times
//! dispatch in insertion order.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::SystemTime;

use oscpeer_core::time;
use parking_lot::Mutex;
use rosc::{OscBundle, OscTime};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::dispatcher::Dispatcher;

/// Shared wall-clock/monotonic anchor for timetag conversion. A fixed anchor
/// makes the conversion a pure function of the timetag, so equal timetags
/// always land on equal fire times and the insertion-order tiebreak applies.
static ANCHOR: OnceLock<(std::time::Instant, SystemTime)> = OnceLock::new();

/// Convert an absolute NTP timetag to a monotonic fire time
///
/// Evaluated when the bundle is scheduled, not when it fires, so later
/// wall-clock adjustments cannot shift pending bundles.
pub(crate) fn instant_for_timetag(tag: OscTime) -> Instant {
    let (anchor_instant, anchor_time) =
        *ANCHOR.get_or_init(|| (std::time::Instant::now(), SystemTime::now()));
    let instant = match time::to_system_time(tag).duration_since(anchor_time) {
        Ok(offset) => anchor_instant + offset,
        // before the anchor: due in the past
        Err(_) => anchor_instant,
    };
    Instant::from_std(instant)
}

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
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.fire_at
            .cmp(&other.fire_at)
            .then(self.seq.cmp(&other.seq))
    }
}

#[derive(Default)]
struct State {
    heap: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
}

/// Shared between the scheduler handle and its worker task
#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    notify: Notify,
    shutdown: AtomicBool,
}

pub(crate) struct Scheduler {
    shared: Arc<Shared>,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            running: AtomicBool::new(false),
            worker: Mutex::new(None),
        }
    }

    /// Queue a bundle for dispatch at `fire_at`
    pub(crate) fn schedule(&self, fire_at: Instant, bundle: OscBundle) {
        {
            let mut state = self.shared.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.heap.push(Reverse(Entry {
                fire_at,
                seq,
                bundle,
            }));
        }
        self.shared.notify.notify_one();
    }

    /// Launch the worker if it is not already running. Idempotent.
    pub(crate) fn start(&self, dispatcher: &Arc<Dispatcher>) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        self.shared.shutdown.store(false, Ordering::SeqCst);
        let shared = self.shared.clone();
        let dispatcher = Arc::downgrade(dispatcher);
        *self.worker.lock() = Some(tokio::spawn(run_worker(shared, dispatcher)));
        debug!("bundle scheduler started");
    }

    /// Stop the worker and discard queued bundles. Idempotent.
    pub(crate) async fn stop(&self) {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.notify.notify_one();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }

        let discarded = {
            let mut state = self.shared.state.lock();
            let n = state.heap.len();
            state.heap.clear();
            n
        };
        if discarded > 0 {
            debug!("discarded {} scheduled bundles at shutdown", discarded);
        }
    }
}

async fn run_worker(shared: Arc<Shared>, dispatcher: Weak<Dispatcher>) {
    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }

        let next_due = shared.state.lock().heap.peek().map(|Reverse(e)| e.fire_at);

        match next_due {
            None => shared.notify.notified().await,
            Some(at) if at <= Instant::now() => {
                let popped = shared.state.lock().heap.pop();
                if let Some(Reverse(entry)) = popped {
                    trace!("firing scheduled bundle (seq {})", entry.seq);
                    let Some(dispatcher) = dispatcher.upgrade() else {
                        break;
                    };
                    dispatcher.dispatch_elements(&entry.bundle);
                }
            }
            Some(at) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(at) => {}
                    _ = shared.notify.notified() => {}
                }
            }
        }
    }
}
