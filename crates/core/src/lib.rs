pub mod error;
pub mod logging;
pub mod util;

pub mod activator;
pub mod config;
pub mod module;
pub mod package;
pub mod pipeline;
pub mod registrar;
pub mod scan;

pub use activator::{EndpointActivator, use_endpoint_definitions};
pub use config::{HostConfig, RawSettings, SettingsBuilder};
pub use error::{
    ActivationError, ConfigurationError, ExtractionError, ModuleLoadError, PorticoError,
    Result, RouteAttachError,
};
pub use module::{CatalogBackend, DylibBackend, ModuleBackend, ModuleFilter, ModuleHandle};
pub use package::{HostRuntime, PackageExtractor, RuntimeTarget, RuntimeVersion};
pub use pipeline::{DiscoveryReport, FailurePolicy, PluginPipeline, PluginSource};
pub use registrar::{EndpointRegistry, RegisteredDefinition, ServiceRegistrar};
pub use scan::{CapabilityScanner, DefinitionType};
