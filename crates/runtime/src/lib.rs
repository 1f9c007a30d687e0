mod host;

pub use host::{
    GREETING, HEALTHY, HOST_MODULE, HostEndpoints, RouteCatalog, RouteCatalogEndpoints,
};

use portico_api::{RouteInfo, ServiceCollection, WebApplication};
use portico_core::module::ModuleBackend;
use portico_core::{
    DiscoveryReport, EndpointActivator, EndpointRegistry, HostConfig, PluginPipeline,
    PluginSource,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A host whose plugins are registered and whose routes are attached.
pub struct Application {
    pub app: WebApplication,
    pub registry: Arc<EndpointRegistry>,
    pub report: DiscoveryReport,
    pub config: HostConfig,
}

impl Application {
    pub fn routes(&self) -> &[RouteInfo] {
        self.app.routes()
    }
}

/// The discovery pipeline for a configured host: package archives, then raw
/// module files, both under the plugin root, then the host's own module.
pub fn build_pipeline(config: &HostConfig, backend: Arc<dyn ModuleBackend>) -> PluginPipeline {
    PluginPipeline::from_config(config, backend)
        .with_span(tracing::info_span!("plugins"))
        .with_source(PluginSource::archives(&config.plugin_path))
        .with_source(PluginSource::modules(&config.plugin_path))
        .with_source(PluginSource::in_process(&HOST_MODULE))
}

/// Register every plugin, build the web application and attach all routes.
pub fn build_application(
    config: &HostConfig,
    backend: Arc<dyn ModuleBackend>,
) -> portico_core::Result<Application> {
    let environment = config.host_environment();
    let mut services = ServiceCollection::new();
    services
        .add_singleton(config.clone())
        .add_singleton(environment.clone());

    let (registry, report) = build_pipeline(config, backend).register(&mut services)?;

    let mut app = WebApplication::new(services.build(), environment);
    EndpointActivator::new()
        .with_span(tracing::info_span!("activation"))
        .activate(&mut app)?;
    if let Some(catalog) = app.services().get::<RouteCatalog>() {
        catalog.publish(app.routes().to_vec());
    }

    Ok(Application {
        app,
        registry,
        report,
        config: config.clone(),
    })
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    application: Application,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(application.config.listen_address()).await?;
    tracing::info!("Listening on {}", application.config.url());

    axum::serve(listener, application.app.into_router())
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        })
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

/// Initializes the logging system for a specific component.
/// This delegates to the core logging module.
pub fn init_logging(component: &str, to_stderr: bool) -> tracing_appender::non_blocking::WorkerGuard {
    portico_core::logging::init_logging(component, to_stderr)
}
