//! The web application handed to endpoint definitions when routes are attached.

use crate::environment::HostEnvironment;
use crate::services::ServiceProvider;
use axum::Router;
use axum::handler::Handler;
use axum::routing::{self, MethodRouter};
use serde::Serialize;

/// One attached route, kept for introspection (route listings, API docs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    pub method: String,
    pub path: String,
    /// Name of the endpoint definition that attached the route, if any.
    pub owner: Option<String>,
}

pub struct WebApplication {
    router: Router,
    services: ServiceProvider,
    environment: HostEnvironment,
    routes: Vec<RouteInfo>,
    owner: Option<String>,
}

impl WebApplication {
    pub fn new(services: ServiceProvider, environment: HostEnvironment) -> Self {
        Self {
            router: Router::new(),
            services,
            environment,
            routes: Vec::new(),
            owner: None,
        }
    }

    pub fn services(&self) -> &ServiceProvider {
        &self.services
    }

    pub fn environment(&self) -> &HostEnvironment {
        &self.environment
    }

    /// Attach a method router at `path`.
    ///
    /// Panics like `axum::Router::route` when the path is invalid or already
    /// taken by the same method.
    pub fn route(&mut self, path: &str, method_router: MethodRouter) -> &mut Self {
        self.attach("*", path, method_router)
    }

    pub fn map_get<H, T>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.attach("GET", path, routing::get(handler))
    }

    pub fn map_post<H, T>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.attach("POST", path, routing::post(handler))
    }

    pub fn map_put<H, T>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.attach("PUT", path, routing::put(handler))
    }

    pub fn map_delete<H, T>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.attach("DELETE", path, routing::delete(handler))
    }

    fn attach(&mut self, method: &str, path: &str, method_router: MethodRouter) -> &mut Self {
        let router = std::mem::take(&mut self.router);
        self.router = router.route(path, method_router);
        self.routes.push(RouteInfo {
            method: method.to_string(),
            path: path.to_string(),
            owner: self.owner.clone(),
        });
        self
    }

    /// Set the definition name recorded as owner of subsequently attached routes.
    pub fn set_route_owner(&mut self, owner: Option<&str>) {
        self.owner = owner.map(str::to_string);
    }

    pub fn routes(&self) -> &[RouteInfo] {
        &self.routes
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

impl std::fmt::Debug for WebApplication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebApplication")
            .field("environment", &self.environment)
            .field("routes", &self.routes)
            .finish()
    }
}
