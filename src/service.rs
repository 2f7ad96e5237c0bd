//! Adapts the opaque-payload core [`Engine`] to the façade's concrete
//! `String` payload type, attaching structured logging to each call.
//!
//! Mirrors `internal/service/service.go`: the Go service wraps
//! `pkg/subpub.SubPub` and bridges its callback-based `Subscribe` onto a
//! channel the gRPC handler can range over. Here that bridge is a
//! `tokio::sync::mpsc::UnboundedReceiver<String>` fed by a callback that
//! forwards onto the paired sender — safe to call from the synchronous
//! processor-worker thread that invokes it.

use std::sync::Arc;
use std::time::Instant;

use log::{error, info};
use tokio::sync::mpsc;

use crate::engine::Engine;
use crate::error::Result;

/// The core engine, specialised to string payloads and wrapped with logging.
pub struct SubPubService {
    engine: Arc<Engine<String>>,
}

impl Default for SubPubService {
    fn default() -> Self {
        Self::new()
    }
}

impl SubPubService {
    pub fn new() -> Self {
        Self {
            engine: Arc::new(Engine::new()),
        }
    }

    /// Subscribes to `subject`, returning the receiving half of an unbounded
    /// channel onto which every published message is forwarded in order.
    ///
    /// The returned subscription handle must outlive the receiver for as
    /// long as the caller wants messages delivered; dropping it without
    /// calling `unsubscribe` leaves the background workers running (matching
    /// [`crate::subscription::Subscription`]'s documented lifecycle).
    pub fn subscribe(&self, subject: &str) -> Result<(Arc<crate::subscription::Subscription<String>>, mpsc::UnboundedReceiver<String>)> {
        info!("service.Subscribe: started subscription, subject={subject}");

        let (tx, rx) = mpsc::unbounded_channel();
        let result = self.engine.subscribe(
            subject,
            Box::new(move |msg: Arc<String>| {
                let _ = tx.send((*msg).clone());
            }),
        );

        match result {
            Ok(sub) => {
                info!("service.Subscribe: subscription successful, subject={subject}");
                Ok((sub, rx))
            }
            Err(err) => {
                error!("service.Subscribe: subscription failed, subject={subject}: {err}");
                Err(err)
            }
        }
    }

    /// Publishes `data` on `subject`.
    pub fn publish(&self, subject: &str, data: String) -> Result<()> {
        info!("service.Publish: started publish, subject={subject}, data={data}");
        let result = self.engine.publish(subject, data);
        match &result {
            Ok(()) => info!("service.Publish: successfully published, subject={subject}"),
            Err(err) => error!("service.Publish: publish failed, subject={subject}: {err}"),
        }
        result
    }

    /// Closes the underlying engine.
    pub fn stop(&self, deadline: Instant) -> Result<()> {
        self.engine.close(deadline)
    }
}

impl Clone for SubPubService {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}
