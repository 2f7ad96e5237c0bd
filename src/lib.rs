//! `subpub`: an in-process publish/subscribe broadcast engine, plus the
//! ambient production stack (gRPC façade, configuration, logging) needed to
//! run it as a standalone server.
//!
//! The core (`engine`, `broadcaster`, `subscription`, `error`) has no
//! dependency on an async runtime: subscriptions are serviced by plain OS
//! threads, so the engine is usable as a library with no `tokio` in the
//! picture at all. Everything under `facade`, `service`, `app`, `config`, and
//! `logging` is the runtime scaffolding that turns the core into the
//! `subpub-server` binary.

mod broadcaster;
pub mod engine;
pub mod error;
pub mod subscription;

pub mod app;
pub mod config;
pub mod facade;
pub mod logging;
pub mod service;

pub use engine::Engine;
pub use error::{Error, Result};
pub use subscription::Subscription;

pub mod pubsub {
    //! Generated gRPC/protobuf types for the `pubsub.v1` package.
    tonic::include_proto!("pubsub.v1");
}
