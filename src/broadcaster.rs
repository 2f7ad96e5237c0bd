//! Per-subject fan-out.
//!
//! A broadcaster owns every subscription currently attached to one subject and
//! serialises fan-out so that per-subject FIFO ordering holds across all of
//! them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, RwLock};
use std::thread;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::subscription::Subscription;

pub(crate) struct Broadcaster<M: Send + Sync + 'static> {
    subscriptions: RwLock<HashMap<u64, Arc<Subscription<M>>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl<M: Send + Sync + 'static> Broadcaster<M> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Assigns the next monotonically increasing subscription id.
    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn register(&self, id: u64, sub: Arc<Subscription<M>>) {
        self.subscriptions
            .write()
            .expect("broadcaster subscription map lock poisoned")
            .insert(id, sub);
    }

    pub(crate) fn unregister(&self, id: u64) {
        self.subscriptions
            .write()
            .expect("broadcaster subscription map lock poisoned")
            .remove(&id);
    }

    /// Fans `msg` out to every currently-attached subscription.
    ///
    /// `closed` is read under the shared lock rather than before acquiring
    /// it, so the reject decision is always consistent with whichever
    /// subscriber set the lock is currently protecting.
    pub(crate) fn publish(&self, msg: Arc<M>) -> Result<()> {
        let subs = self
            .subscriptions
            .read()
            .expect("broadcaster subscription map lock poisoned");
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::TopicClosed);
        }
        for sub in subs.values() {
            sub.deliver(Arc::clone(&msg));
        }
        Ok(())
    }

    /// Closes the broadcaster and unsubscribes everything attached to it.
    ///
    /// Returns `Cancelled` without marking the broadcaster closed if
    /// `deadline` has already passed. Once marked closed, further publishes
    /// are rejected regardless of how the rest of this call goes.
    ///
    /// Tearing a single subscription down joins its receiver and processor
    /// threads, which can take as long as that subscriber's slowest pending
    /// callback invocation — arbitrarily longer than `deadline`. So the
    /// actual tear-down work runs on a dedicated background thread, and this
    /// call races *that thread's completion* against `deadline`, exactly the
    /// way the source races a goroutine against `ctx.Done()` via `select`.
    /// If the deadline wins, this returns `Cancelled` immediately without
    /// waiting for the in-flight teardown to finish; the background thread
    /// keeps running and will complete the subscription it is currently
    /// tearing down (but starts no new ones) — "at most one more
    /// subscription may still complete its tear-down after this return".
    pub(crate) fn close(&self, deadline: Instant) -> Result<()> {
        if Instant::now() >= deadline {
            return Err(Error::Cancelled);
        }

        if self.closed.swap(true, Ordering::AcqRel) {
            // Already closed by a previous call; retrying is safe.
            return Ok(());
        }

        // Drain the map under the write lock just long enough to move every
        // subscription out of it; the lock is never held across a teardown.
        let drained: Vec<Arc<Subscription<M>>> = {
            let mut subs = self
                .subscriptions
                .write()
                .expect("broadcaster subscription map lock poisoned");
            std::mem::take(&mut *subs).into_values().collect()
        };

        let (done_tx, done_rx) = mpsc::channel::<()>();
        thread::Builder::new()
            .name("subpub-broadcaster-close".to_string())
            .spawn(move || {
                for sub in drained {
                    if Instant::now() >= deadline {
                        break;
                    }
                    sub.teardown();
                }
                let _ = done_tx.send(());
            })
            .expect("failed to spawn broadcaster close thread");

        match done_rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(()) => Ok(()),
            Err(_) => Err(Error::Cancelled),
        }
    }
}
