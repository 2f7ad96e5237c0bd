//! Streaming RPC façade: bridges the `pubsub.v1.PubSub` gRPC service to
//! [`crate::service::SubPubService`].
//!
//! Mirrors `internal/grpc/server.go`: one core subscription per incoming
//! `Subscribe` stream, torn down via `Unsubscribe` when the remote cancels or
//! the stream write fails; a single process-wide cancellation token
//! (triggered by the host before `Engine::close`, per §6.3 of the design)
//! terminates every in-flight stream with a `server-terminated` status.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

use crate::pubsub::pub_sub_server::PubSub;
use crate::pubsub::{Empty, Event, PublishRequest, SubscribeRequest};
use crate::service::SubPubService;

/// gRPC implementation of `pubsub.v1.PubSub`.
pub struct PubSubServer {
    service: SubPubService,
    cancel: CancellationToken,
}

impl PubSubServer {
    pub fn new(service: SubPubService, cancel: CancellationToken) -> Self {
        Self { service, cancel }
    }
}

fn map_engine_error(err: crate::error::Error) -> Status {
    match err {
        crate::error::Error::Closed | crate::error::Error::TopicClosed => {
            Status::internal("internal error")
        }
        crate::error::Error::Cancelled => Status::deadline_exceeded("deadline exceeded"),
    }
}

/// Wraps `fut` so that a panic inside a handler is caught and turned into an
/// internal-error `Status` rather than unwinding past the RPC boundary,
/// mirroring the original's `recovery.WithRecoveryHandler` middleware (the
/// per-task isolation `tokio::spawn` already gives the `Subscribe` pump loop
/// in `subscribe` below covers *that* task; this covers the handler body
/// itself, which runs directly on the request-handling task).
async fn catch_panic<T>(fut: impl std::future::Future<Output = Result<T, Status>>) -> Result<T, Status> {
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(Status::internal("internal error")))
}

#[tonic::async_trait]
impl PubSub for PubSubServer {
    type SubscribeStream = UnboundedReceiverStream<Result<Event, Status>>;

    async fn subscribe(
        &self,
        request: Request<SubscribeRequest>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        catch_panic(self.subscribe_inner(request)).await
    }

    async fn publish(&self, request: Request<PublishRequest>) -> Result<Response<Empty>, Status> {
        catch_panic(self.publish_inner(request)).await
    }
}

impl PubSubServer {
    async fn subscribe_inner(
        &self,
        request: Request<SubscribeRequest>,
    ) -> Result<Response<<Self as PubSub>::SubscribeStream>, Status> {
        let subject = request.into_inner().key;

        let (sub, mut messages) = self
            .service
            .subscribe(&subject)
            .map_err(map_engine_error)?;

        let cancel = self.cancel.clone();
        let (out_tx, out_rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        let _ = out_tx.send(Err(Status::aborted("server died")));
                        break;
                    }
                    item = messages.recv() => {
                        match item {
                            Some(data) => {
                                if out_tx.send(Ok(Event { data })).is_err() {
                                    // Outbound stream write failed (receiver
                                    // dropped): abort rather than keep pumping.
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
            // `Subscription` does not unsubscribe on drop (the broadcaster
            // holds its own reference for as long as it's attached); the
            // façade must call it explicitly when it stops pumping the
            // stream, exactly as `internal/grpc/server.go`'s caller is
            // expected to via the core's documented contract. `unsubscribe`
            // joins the subscription's worker threads, so it runs on a
            // blocking-pool thread rather than this async task's worker.
            let _ = tokio::task::spawn_blocking(move || sub.unsubscribe()).await;
        });

        Ok(Response::new(UnboundedReceiverStream::new(out_rx)))
    }

    async fn publish_inner(
        &self,
        request: Request<PublishRequest>,
    ) -> Result<Response<Empty>, Status> {
        let request = request.into_inner();
        self.service
            .publish(&request.key, request.data)
            .map_err(map_engine_error)?;
        Ok(Response::new(Empty {}))
    }
}
