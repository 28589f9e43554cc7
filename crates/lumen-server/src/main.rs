//! # Lumen Server
//!
//! Main entry point. The process role comes from configuration
//! (`role = "all" | "worker" | "gateway"`, or `LUMEN_ROLE`).

use anyhow::Context;
use lumen_config::ConfigLoader;
use lumen_core::telemetry::{init_telemetry, shutdown_telemetry};
use lumen_server::app::{shutdown_signal, App};
use lumen_server::di::AppModuleBuilder;
use lumen_server::startup::{print_banner, print_startup_info};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Application error: {:#}", e);
        eprintln!("Application error: {e:#}");
        shutdown_telemetry();
        std::process::exit(1);
    }
    shutdown_telemetry();
}

async fn run() -> anyhow::Result<()> {
    let loader = ConfigLoader::from_default_location().context("loading configuration")?;
    let config = loader.get().await;

    init_telemetry(&config.observability.telemetry_config())
        .context("initializing telemetry")?;

    print_banner();
    info!("Starting Lumen server...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.environment);
    print_startup_info(&config);

    let module = AppModuleBuilder::new()
        .with_config(config)
        .build()
        .await
        .context("building application")?;

    App::new(module)
        .run(shutdown_signal())
        .await
        .context("running server")?;
    Ok(())
}
