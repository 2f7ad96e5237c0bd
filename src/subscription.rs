//! One logical consumer attached to one subject.
//!
//! A subscription decouples the rate at which a broadcaster fans messages out
//! from the rate at which a single subscriber's callback can consume them. Two
//! dedicated threads cooperate to do this: a *receiver* that drains the bounded
//! hand-off channel from the broadcaster into an unbounded internal queue, and
//! a *processor* that drains that queue into the user's callback.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::broadcaster::Broadcaster;

/// Capacity of the hand-off channel between a broadcaster and one subscriber.
///
/// Kept at 1 deliberately: it bounds the transient memory between producer and
/// consumer while letting publish return as soon as the receiver worker takes
/// the item, pushing any real backlog into the subscriber's unbounded queue
/// instead of onto the publisher's call stack.
const HANDOFF_CAPACITY: usize = 1;

/// Count of currently-running receiver/processor worker threads, across
/// every subscription in the process.
static LIVE_WORKERS: AtomicUsize = AtomicUsize::new(0);

/// Number of receiver/processor worker threads currently running.
///
/// Not part of the crate's stable API surface; exposed only so tests (and
/// benchmarks) can assert that a subscribe/publish/unsubscribe/close cycle
/// leaves no background workers behind (spec'd in §5/§8 as a mandatory
/// property).
#[doc(hidden)]
pub fn live_worker_count() -> usize {
    LIVE_WORKERS.load(Ordering::SeqCst)
}

/// Marks one worker thread as live for as long as it's in scope; decrements
/// on drop so a panicking handler (which only unwinds the processor thread,
/// see `processor_loop`) still gets counted as stopped.
struct WorkerGuard;

impl WorkerGuard {
    fn started() -> Self {
        LIVE_WORKERS.fetch_add(1, Ordering::SeqCst);
        Self
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        LIVE_WORKERS.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) type Handler<M> = Box<dyn FnMut(Arc<M>) + Send + 'static>;

struct Inner<M> {
    active: bool,
    queue: VecDeque<Arc<M>>,
}

struct Shared<M> {
    state: Mutex<Inner<M>>,
    ready: Condvar,
}

/// A live subscription returned from [`crate::Engine::subscribe`].
///
/// Call [`Subscription::unsubscribe`] to tear it down; dropping the handle
/// does not unsubscribe it, since the broadcaster itself also holds a
/// reference for as long as the subscription is attached.
pub struct Subscription<M: Send + Sync + 'static> {
    id: u64,
    broadcaster: Arc<Broadcaster<M>>,
    sender: Mutex<Option<SyncSender<Arc<M>>>>,
    shared: Arc<Shared<M>>,
    receiver_handle: Mutex<Option<JoinHandle<()>>>,
    processor_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<M: Send + Sync + 'static> Subscription<M> {
    /// Creates a subscription and starts its receiver and processor workers.
    pub(crate) fn start(id: u64, broadcaster: Arc<Broadcaster<M>>, handler: Handler<M>) -> Arc<Self> {
        let (sender, receiver) = sync_channel::<Arc<M>>(HANDOFF_CAPACITY);
        let shared = Arc::new(Shared {
            state: Mutex::new(Inner {
                active: true,
                queue: VecDeque::new(),
            }),
            ready: Condvar::new(),
        });

        let recv_shared = Arc::clone(&shared);
        let receiver_handle = thread::Builder::new()
            .name(format!("subpub-recv-{id}"))
            .spawn(move || receiver_loop(recv_shared, receiver))
            .expect("failed to spawn subscription receiver thread");

        let proc_shared = Arc::clone(&shared);
        let processor_handle = thread::Builder::new()
            .name(format!("subpub-proc-{id}"))
            .spawn(move || processor_loop(proc_shared, handler))
            .expect("failed to spawn subscription processor thread");

        Arc::new(Self {
            id,
            broadcaster,
            sender: Mutex::new(Some(sender)),
            shared,
            receiver_handle: Mutex::new(Some(receiver_handle)),
            processor_handle: Mutex::new(Some(processor_handle)),
        })
    }

    /// The identifier this subscription was assigned within its broadcaster.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Pushes `msg` onto the hand-off channel. Called only by the owning
    /// broadcaster's fan-out loop. A no-op once the subscription has been (or
    /// is concurrently being) torn down.
    pub(crate) fn deliver(&self, msg: Arc<M>) {
        let sender = self.sender.lock().expect("subscription sender lock poisoned").clone();
        if let Some(sender) = sender {
            // The receiver end may have already stopped draining (teardown in
            // progress); a full channel or a disconnected peer both just fail
            // the send, which is fine — nothing is owed to a departing subscriber.
            let _ = sender.send(msg);
        }
    }

    /// Deregisters from the broadcaster and waits for both workers to stop.
    ///
    /// Idempotent: if the broadcaster concurrently closed (and tore this
    /// subscription down via [`Subscription::teardown`]) first, this becomes a
    /// no-op beyond the (already harmless) repeat deregistration attempt.
    pub fn unsubscribe(&self) {
        self.broadcaster.unregister(self.id);
        self.teardown();
    }

    /// The tear-down sequence shared by [`Subscription::unsubscribe`] and
    /// [`Broadcaster::close`][crate::broadcaster::Broadcaster::close]. The
    /// broadcaster's closing path has already removed this subscription from
    /// its map (under its own exclusive lock) before calling this, so no
    /// further locking against the map is needed here.
    pub(crate) fn teardown(&self) {
        // Close the hand-off channel: drop our side so the receiver worker's
        // `for` loop over it terminates once already-enqueued items drain.
        self.sender.lock().expect("subscription sender lock poisoned").take();

        if let Some(handle) = self
            .receiver_handle
            .lock()
            .expect("subscription receiver handle lock poisoned")
            .take()
        {
            let _ = handle.join();
        }

        {
            let mut inner = self.shared.state.lock().expect("subscription state lock poisoned");
            inner.active = false;
            // Holding the mutex across both the flip and the notify rules out
            // the lost-wakeup window a bare atomic `active` flag would have.
            self.shared.ready.notify_one();
        }

        if let Some(handle) = self
            .processor_handle
            .lock()
            .expect("subscription processor handle lock poisoned")
            .take()
        {
            // A panicking handler kills only this thread; we don't resurface
            // that panic to the caller of unsubscribe/close.
            let _ = handle.join();
        }
    }
}

fn receiver_loop<M>(shared: Arc<Shared<M>>, receiver: Receiver<Arc<M>>) {
    let _guard = WorkerGuard::started();
    for message in receiver.iter() {
        let mut inner = shared.state.lock().expect("subscription state lock poisoned");
        inner.queue.push_back(message);
        drop(inner);
        shared.ready.notify_one();
    }
}

fn processor_loop<M>(shared: Arc<Shared<M>>, mut callback: Handler<M>) {
    let _guard = WorkerGuard::started();
    loop {
        let batch = {
            let mut inner = shared.state.lock().expect("subscription state lock poisoned");
            while inner.active && inner.queue.is_empty() {
                inner = shared.ready.wait(inner).expect("subscription condvar poisoned");
            }
            if !inner.active && inner.queue.is_empty() {
                return;
            }
            std::mem::take(&mut inner.queue)
        };
        for message in batch {
            callback(message);
        }
    }
}
