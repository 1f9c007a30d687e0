use portico_api::ServiceError;
use portico_plugin::BoxError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("PluginPath configuration is missing")]
    MissingPluginPath,
    #[error("PluginPath configuration is not a valid directory: {}", .0.display())]
    PluginRootNotFound(PathBuf),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("Failed to read configuration file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse configuration file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Failed to list packages in {}: {source}", .path.display())]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read package archive {}: {source}", .archive.display())]
    Archive {
        archive: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("Failed to extract {entry} from {}: {source}", .archive.display())]
    Io {
        archive: PathBuf,
        entry: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{} holds more than one payload file named {file_name}", .archive.display())]
    DuplicateFileName { archive: PathBuf, file_name: String },
}

#[derive(Error, Debug)]
pub enum ModuleLoadError {
    #[error("Failed to open module {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("Module {} was built against {found}, host expects {expected}", .path.display())]
    Incompatible {
        path: PathBuf,
        found: String,
        expected: String,
    },
    #[error("Invalid catalog entry {}: {reason}", .path.display())]
    InvalidCatalogEntry { path: PathBuf, reason: String },
    #[error("Catalog entry {} names unknown module {name}", .path.display())]
    UnknownCatalogModule { path: PathBuf, name: String },
    #[error("Failed to read module {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ActivationError {
    #[error("Cannot construct {definition}: {source}")]
    MissingDependency {
        definition: String,
        #[source]
        source: ServiceError,
    },
    #[error("Cannot construct {definition}: {source}")]
    Construct {
        definition: String,
        #[source]
        source: ServiceError,
    },
    #[error("{definition} does not implement the endpoint definition capability")]
    NotCapable { definition: String },
    #[error("{definition} failed to define services: {source}")]
    DefineServices {
        definition: String,
        #[source]
        source: BoxError,
    },
    #[error("{definition} panicked during {phase}: {message}")]
    Panicked {
        definition: String,
        phase: &'static str,
        message: String,
    },
    #[error("Endpoint definition registry has already been published")]
    AlreadyPublished,
}

#[derive(Error, Debug)]
pub enum RouteAttachError {
    #[error("No endpoint definition registry was published")]
    RegistryMissing,
    #[error("Endpoints have already been attached from this registry")]
    AlreadyActivated,
    #[error("{definition} failed to define endpoints: {source}")]
    Failed {
        definition: String,
        #[source]
        source: BoxError,
    },
    #[error("{definition} panicked while defining endpoints: {message}")]
    Panicked { definition: String, message: String },
}

#[derive(Error, Debug)]
pub enum PorticoError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    ModuleLoad(#[from] ModuleLoadError),
    #[error(transparent)]
    Activation(#[from] ActivationError),
    #[error(transparent)]
    RouteAttach(#[from] RouteAttachError),
    #[error("Worker pool error: {0}")]
    WorkerPool(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PorticoError>;
