pub mod application;
pub mod environment;
pub mod error;
pub mod services;

// Re-export commonly used types
pub use application::{RouteInfo, WebApplication};
pub use environment::{EnvironmentName, HostEnvironment};
pub use error::{ServiceError, ServiceResult};
pub use services::{ServiceCollection, ServiceProvider};

// Plugins build routes against the exact axum the host links.
pub use axum;
