//! Contract between the Portico host and its plugin modules.
//!
//! A plugin module is a crate compiled as a `cdylib` that depends on this
//! crate, implements [`EndpointDefinition`] (plus [`FromServices`]) for each
//! unit of routes it contributes, and lists them with [`export_module!`].

use portico_api::{HostEnvironment, ServiceCollection, ServiceResult, WebApplication};

pub mod declaration;
mod macros;

pub use declaration::{
    ActivateFn, CONTRACT_VERSION, DECLARATION_SYMBOL, ENTRY_MARKER, ExportedType, FingerprintFn,
    ModuleDeclaration, RUSTC_VERSION, TypeKind, build_fingerprint,
};

pub use portico_api;
pub use portico_api::axum;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A plugin-supplied unit that first registers services, then attaches routes.
pub trait EndpointDefinition: Send + Sync {
    /// Called once while the service registry is being configured.
    fn define_services(&self, _services: &mut ServiceCollection) -> Result<(), BoxError> {
        Ok(())
    }

    /// Called once after the web application is built, before it serves.
    fn define_endpoints(
        &self,
        app: &mut WebApplication,
        env: &HostEnvironment,
    ) -> Result<(), BoxError>;
}

/// Constructor injection: build an instance from services already registered.
pub trait FromServices: Sized {
    fn from_services(services: &ServiceCollection) -> ServiceResult<Self>;
}
