//! Process-level composition of the engine, façade, and gRPC server.
//!
//! Mirrors `internal/app/app.go` + `internal/app/grpc/app.go`: owns the
//! `tonic` server, the core engine (through a [`SubPubService`]), and the
//! process-wide cancellation signal the façade watches (§6.2/§6.3 of the
//! design).

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::{error, info};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use crate::facade::PubSubServer;
use crate::pubsub::pub_sub_server::PubSubServer as PubSubGrpcServer;
use crate::service::SubPubService;

/// Owns the gRPC server task, the core engine, and the shutdown signal.
pub struct App {
    service: SubPubService,
    cancel: CancellationToken,
    port: u16,
    request_timeout: Duration,
    server_task: Option<JoinHandle<Result<(), tonic::transport::Error>>>,
}

impl App {
    pub fn new(port: u16, request_timeout: Duration) -> Self {
        Self {
            service: SubPubService::new(),
            cancel: CancellationToken::new(),
            port,
            request_timeout,
            server_task: None,
        }
    }

    /// Binds the configured port and serves the `PubSub` gRPC service until
    /// the server future completes, errors, or [`App::stop`] is called.
    ///
    /// Spawns the server as a background task so the caller's thread is free
    /// to wait on OS signals (§6.3); the task's result is awaited by `stop`.
    pub fn run(&mut self) -> anyhow::Result<()> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();
        let facade = PubSubServer::new(self.service.clone(), self.cancel.clone());
        let shutdown = self.cancel.clone();
        let timeout = self.request_timeout;

        info!("grpc server started, addr={addr}");

        let task = tokio::spawn(async move {
            Server::builder()
                .timeout(timeout)
                .add_service(PubSubGrpcServer::new(facade))
                .serve_with_shutdown(addr, shutdown.cancelled())
                .await
        });
        self.server_task = Some(task);
        Ok(())
    }

    /// Triggers the process-wide cancellation signal, races the gRPC
    /// server's graceful shutdown against `deadline`, and — regardless of
    /// whether that raced — always closes the core engine afterward.
    ///
    /// Mirrors `grpcsubpub.App.Stop`: cancellation first (so in-flight
    /// streams unsubscribe themselves), then a bounded wait for the server,
    /// then an unconditional engine close attempt.
    pub async fn stop(&mut self, deadline: Duration) {
        info!("stopping grpc server, port={}", self.port);
        self.cancel.cancel();

        if let Some(task) = self.server_task.take() {
            match tokio::time::timeout(deadline, task).await {
                Ok(Ok(Ok(()))) => info!("server stopped"),
                Ok(Ok(Err(err))) => error!("server stopped with error: {err}"),
                Ok(Err(err)) => error!("server task panicked: {err}"),
                Err(_) => {
                    info!("couldn't gracefully stop server within deadline");
                    info!("killing server forcibly");
                    // The task is dropped here; `serve_with_shutdown` was
                    // already told to shut down via `self.cancel`, so this is
                    // only reached if it's still mid-drain past the deadline.
                }
            }
        }

        info!("stopping subpub system");
        let engine_deadline = Instant::now() + deadline;
        match self.service.stop(engine_deadline) {
            Ok(()) => info!("subpub system stopped"),
            Err(err) => {
                info!("couldn't gracefully stop subpub system: {err}");
                info!("killing subpub system forcibly");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_without_run_still_closes_the_engine() {
        let mut app = App::new(0, Duration::from_millis(100));
        app.stop(Duration::from_millis(100)).await;
    }
}
