use portico_core::DylibBackend;
use portico_core::HostConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub async fn run(config: HostConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting Portico with plugins from {}", config.plugin_path.display());

    let application = portico_runtime::build_application(&config, Arc::new(DylibBackend))
        .inspect_err(|e| error!("Startup failed: {}", e))?;
    info!(
        "{} endpoint definition(s), {} route(s)",
        application.registry.len(),
        application.routes().len()
    );

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
        }
        trigger.cancel();
    });

    portico_runtime::serve(application, shutdown).await
}
