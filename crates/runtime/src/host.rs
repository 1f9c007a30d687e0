//! The host's own endpoint definitions, discovered in-process through the
//! same pipeline as plugin modules.

use portico_api::axum::Json;
use portico_api::{HostEnvironment, RouteInfo, ServiceCollection, ServiceResult, WebApplication};
use portico_plugin::{BoxError, EndpointDefinition, FromServices, declare_module};
use std::sync::{Arc, OnceLock};

pub const GREETING: &str = "Hello from Portico!";
pub const HEALTHY: &str = "Service is healthy";

/// `GET /` and `GET /health`.
pub struct HostEndpoints;

impl FromServices for HostEndpoints {
    fn from_services(_services: &ServiceCollection) -> ServiceResult<Self> {
        Ok(HostEndpoints)
    }
}

impl EndpointDefinition for HostEndpoints {
    fn define_endpoints(
        &self,
        app: &mut WebApplication,
        _env: &HostEnvironment,
    ) -> Result<(), BoxError> {
        app.map_get("/", || async { GREETING })
            .map_get("/health", || async { HEALTHY });
        Ok(())
    }
}

/// Every route attached at startup, filled in once activation completes.
#[derive(Debug, Default)]
pub struct RouteCatalog {
    routes: OnceLock<Vec<RouteInfo>>,
}

impl RouteCatalog {
    /// Returns `false` if the catalog was already filled.
    pub fn publish(&self, routes: Vec<RouteInfo>) -> bool {
        self.routes.set(routes).is_ok()
    }

    pub fn routes(&self) -> &[RouteInfo] {
        self.routes.get().map(Vec::as_slice).unwrap_or_default()
    }
}

/// `GET /routes` in Development: the attached route table as JSON.
pub struct RouteCatalogEndpoints;

impl FromServices for RouteCatalogEndpoints {
    fn from_services(_services: &ServiceCollection) -> ServiceResult<Self> {
        Ok(RouteCatalogEndpoints)
    }
}

impl EndpointDefinition for RouteCatalogEndpoints {
    fn define_services(&self, services: &mut ServiceCollection) -> Result<(), BoxError> {
        services.try_add_singleton(RouteCatalog::default());
        Ok(())
    }

    fn define_endpoints(
        &self,
        app: &mut WebApplication,
        env: &HostEnvironment,
    ) -> Result<(), BoxError> {
        if !env.is_development() {
            return Ok(());
        }
        let catalog: Arc<RouteCatalog> = app.services().require()?;
        app.map_get("/routes", move || {
            let catalog = Arc::clone(&catalog);
            async move { Json(catalog.routes().to_vec()) }
        });
        Ok(())
    }
}

declare_module! {
    pub static HOST_MODULE = {
        name: "host",
        entry: Program,
        definitions: [HostEndpoints, RouteCatalogEndpoints],
    };
}
