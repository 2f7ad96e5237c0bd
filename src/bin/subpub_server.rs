use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use log::info;

use subpub::app::App;
use subpub::config::AppConfig;
use subpub::logging;

#[derive(Parser, Debug)]
#[command(author, version, about = "subpub gRPC server", long_about = None)]
struct Args {
    /// Path to the YAML config file (falls back to SUBPUB_CONFIG if unset).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg = AppConfig::load(args.config)?;

    logging::init(&cfg.env);
    info!("loaded config: env={}, grpc.port={}", cfg.env, cfg.grpc.port);

    let mut app = App::new(cfg.grpc.port, cfg.grpc.timeout);
    app.run()?;

    wait_for_shutdown_signal().await;

    let start = Instant::now();
    app.stop(cfg.stop_timeout).await;
    info!("shutdown completed in {:?}", start.elapsed());

    Ok(())
}

/// Waits for either `SIGINT` (Ctrl-C) or `SIGTERM`, mirroring `main.go`'s
/// `signal.Notify(stop, syscall.SIGTERM, syscall.SIGINT)` followed by a
/// blocking receive.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}
