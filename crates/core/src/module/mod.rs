//! Module Loader: opens module files in isolation and keeps the ones that
//! expose the entry marker.

mod backend;
mod filter;
mod handle;
mod loader;

pub use backend::{CATALOG_PREFIX, CatalogBackend, DylibBackend, ModuleBackend};
pub use filter::ModuleFilter;
pub use handle::ModuleHandle;
pub use loader::{EntryPoint, LoadReport, ModuleFailure, ModuleLoader, default_parallelism};
