//! # Taaza Email Service
//!
//! Accepts email submissions over HTTP, queues them in Redis, and delivers
//! them through SMTP with retries and per-recipient rate limiting.

use taaza_config::ConfigLoader;
use taaza_core::init_logging;
use taaza_mail::register_metrics;
use taaza_server::{
    startup::{print_banner, print_startup_info},
    App,
};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Application error: {:#}", e);
        eprintln!("taaza-server: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = ConfigLoader::from_default_location()?.into_config();

    init_logging(&config.logging)?;
    print_banner();

    info!("Starting Taaza Email Service...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.environment);

    register_metrics();
    print_startup_info(&config);

    let app = App::connect(config).await?;
    app.run(shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        () = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}
