//! Top-level subject → broadcaster registry.
//!
//! The engine is the entry point of the core: it routes `subscribe` and
//! `publish` calls to the broadcaster for a subject, creating that
//! broadcaster lazily on first use, and coordinates the two-level shutdown
//! that tears every broadcaster (and through it, every subscription) down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

use crate::broadcaster::Broadcaster;
use crate::error::{Error, Result};
use crate::subscription::{Handler, Subscription};

/// A subject-multiplexed broadcast engine over payloads of type `M`.
///
/// `M` is never inspected by the core; it is shared with subscribers via
/// `Arc<M>` rather than cloned per subscriber.
pub struct Engine<M: Send + Sync + 'static> {
    broadcasters: DashMap<String, Arc<Broadcaster<M>>>,
    closed: AtomicBool,
}

impl<M: Send + Sync + 'static> Default for Engine<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Send + Sync + 'static> Engine<M> {
    /// Creates an engine with an empty subject registry.
    pub fn new() -> Self {
        Self {
            broadcasters: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Attaches a new subscription to `subject`, creating the subject's
    /// broadcaster if this is the first subscriber ever seen for it.
    ///
    /// Fails with [`Error::Closed`] if the engine has already been closed.
    /// Two concurrent calls racing to create the broadcaster for the same new
    /// subject produce exactly one broadcaster (via `DashMap::entry`, never a
    /// separate load-then-insert), with both subscriptions attached to it.
    pub fn subscribe(&self, subject: &str, handler: Handler<M>) -> Result<Arc<Subscription<M>>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }

        let broadcaster = Arc::clone(
            self.broadcasters
                .entry(subject.to_string())
                .or_insert_with(Broadcaster::new)
                .value(),
        );

        let id = broadcaster.next_id();
        let sub = Subscription::start(id, Arc::clone(&broadcaster), handler);
        broadcaster.register(id, Arc::clone(&sub));
        Ok(sub)
    }

    /// Publishes `msg` to every subscription currently attached to `subject`.
    ///
    /// Publishing to a subject with no subscribers (or no broadcaster at
    /// all) succeeds as a no-op. Fails with [`Error::Closed`] if the engine
    /// is closed, or [`Error::TopicClosed`] if `subject`'s broadcaster has
    /// already been closed.
    pub fn publish(&self, subject: &str, msg: M) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }

        let broadcaster = match self.broadcasters.get(subject) {
            Some(entry) => Arc::clone(entry.value()),
            None => return Ok(()),
        };
        broadcaster.publish(Arc::new(msg))
    }

    /// Closes the engine: closes every broadcaster (in unspecified order)
    /// with the same `deadline`, tearing down every subscription attached to
    /// it.
    ///
    /// If a broadcaster's close is cancelled by the deadline, iteration stops
    /// immediately and this returns [`Error::Cancelled`] without marking the
    /// engine closed — broadcasters visited before the one that cancelled are
    /// left closed, so a caller may retry `close` to keep making progress on
    /// the remainder.
    pub fn close(&self, deadline: Instant) -> Result<()> {
        if Instant::now() >= deadline {
            return Err(Error::Cancelled);
        }

        for entry in self.broadcasters.iter() {
            entry.value().close(deadline)?;
        }

        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    /// Whether `close` has completed successfully.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn publish_to_unknown_subject_is_a_noop() {
        let engine = Engine::<i32>::new();
        assert_eq!(engine.publish("nobody-home", 1), Ok(()));
    }

    #[test]
    fn subscribe_then_publish_delivers_in_order() {
        let engine = Engine::<i32>::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);
        let sub = engine
            .subscribe("order", Box::new(move |msg| received_clone.lock().unwrap().push(*msg)))
            .unwrap();

        for i in 0..100 {
            engine.publish("order", i).unwrap();
        }
        sub.unsubscribe();

        assert_eq!(*received.lock().unwrap(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn subject_isolation() {
        let engine = Engine::<i32>::new();
        let a_hits = Arc::new(Mutex::new(Vec::new()));
        let b_hits = Arc::new(Mutex::new(Vec::new()));
        let (a_clone, b_clone) = (Arc::clone(&a_hits), Arc::clone(&b_hits));

        let sub_a = engine
            .subscribe("a", Box::new(move |msg| a_clone.lock().unwrap().push(*msg)))
            .unwrap();
        let sub_b = engine
            .subscribe("b", Box::new(move |msg| b_clone.lock().unwrap().push(*msg)))
            .unwrap();

        engine.publish("a", 1).unwrap();
        sub_a.unsubscribe();
        sub_b.unsubscribe();

        assert_eq!(*a_hits.lock().unwrap(), vec![1]);
        assert!(b_hits.lock().unwrap().is_empty());
    }

    #[test]
    fn close_rejects_further_subscribe_and_publish() {
        let engine = Engine::<i32>::new();
        engine.close(Instant::now() + Duration::from_secs(1)).unwrap();
        assert_eq!(engine.publish("t", 1), Err(Error::Closed));
        assert!(matches!(engine.subscribe("t", Box::new(|_| {})), Err(Error::Closed)));
    }

    #[test]
    fn close_with_past_deadline_is_cancelled() {
        let engine = Engine::<i32>::new();
        let past = Instant::now() - Duration::from_millis(1);
        assert_eq!(engine.close(past), Err(Error::Cancelled));
        assert!(!engine.is_closed());
    }

    #[test]
    fn concurrent_subscribe_to_new_subject_creates_one_broadcaster() {
        let engine = Arc::new(Engine::<i32>::new());
        let counts = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = Arc::clone(&engine);
                let counts = Arc::clone(&counts);
                std::thread::spawn(move || {
                    let sub = engine
                        .subscribe("fresh", Box::new(move |_| {}))
                        .unwrap();
                    counts.lock().unwrap().push(i);
                    sub
                })
            })
            .collect();

        let subs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(engine.broadcasters.len(), 1);
        for sub in subs {
            sub.unsubscribe();
        }
    }

    #[test]
    fn no_worker_leak_after_subscribe_publish_unsubscribe_close() {
        let baseline = crate::subscription::live_worker_count();

        let engine = Engine::<i32>::new();
        let sub = engine.subscribe("t", Box::new(|_| {})).unwrap();
        engine.publish("t", 1).unwrap();
        sub.unsubscribe();
        assert_eq!(engine.close(Instant::now() + Duration::from_secs(1)), Ok(()));

        assert_eq!(crate::subscription::live_worker_count(), baseline);
    }
}
