use super::handle::ModuleHandle;
use crate::error::ModuleLoadError;
use libloading::Library;
use portico_plugin::ModuleDeclaration;
use std::collections::HashMap;
use std::path::Path;

/// Turns a module file into a loaded [`ModuleHandle`].
pub trait ModuleBackend: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` when the file loads but declares no module.
    fn open(&self, path: &Path) -> Result<Option<ModuleHandle>, ModuleLoadError>;
}

/// Loads native dynamic libraries.
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibBackend;

impl ModuleBackend for DylibBackend {
    fn name(&self) -> &str {
        "dylib"
    }

    fn open(&self, path: &Path) -> Result<Option<ModuleHandle>, ModuleLoadError> {
        // SAFETY: loading a library runs its initializers; plugin roots are trusted.
        let library = unsafe { Library::new(path) }.map_err(|source| ModuleLoadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        // SAFETY: `PORTICO_MODULE` is only ever emitted by `export_module!`; the
        // contract version and build fingerprint are verified before use.
        unsafe { ModuleHandle::from_library(path, library) }
    }
}

/// Prefix of a catalog manifest file.
pub const CATALOG_PREFIX: &str = "portico-catalog:";

/// Resolves module files to declarations linked into the host.
///
/// A catalog module file holds one line, `portico-catalog:<name>`. This lets
/// hosts without dynamic loading, and tests, run the full discovery pipeline.
#[derive(Debug, Default, Clone)]
pub struct CatalogBackend {
    modules: HashMap<String, &'static ModuleDeclaration>,
}

impl CatalogBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `declaration` loadable under its module name (ASCII case-insensitive).
    pub fn with_module(mut self, declaration: &'static ModuleDeclaration) -> Self {
        self.register(declaration);
        self
    }

    pub fn register(&mut self, declaration: &'static ModuleDeclaration) {
        self.modules
            .insert(declaration.module_name.to_ascii_lowercase(), declaration);
    }

    /// Contents of a manifest file naming `module_name`.
    pub fn manifest_contents(module_name: &str) -> String {
        format!("{CATALOG_PREFIX}{module_name}\n")
    }
}

impl ModuleBackend for CatalogBackend {
    fn name(&self) -> &str {
        "catalog"
    }

    fn open(&self, path: &Path) -> Result<Option<ModuleHandle>, ModuleLoadError> {
        let bytes = std::fs::read(path).map_err(|source| ModuleLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let invalid = |reason: &str| ModuleLoadError::InvalidCatalogEntry {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let text = std::str::from_utf8(&bytes).map_err(|_| invalid("not UTF-8 text"))?;
        let name = text
            .trim()
            .strip_prefix(CATALOG_PREFIX)
            .ok_or_else(|| invalid("missing catalog prefix"))?
            .trim();
        if name.is_empty() {
            return Err(invalid("empty module name"));
        }

        let declaration = self
            .modules
            .get(&name.to_ascii_lowercase())
            .copied()
            .ok_or_else(|| ModuleLoadError::UnknownCatalogModule {
                path: path.to_path_buf(),
                name: name.to_string(),
            })?;
        ModuleHandle::from_static(path, declaration).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_plugin::ExportedType;
    use std::fs;
    use tempfile::tempdir;

    const EXPORTS: &[ExportedType] = &[ExportedType::marker("Program")];
    static BILLING: ModuleDeclaration = ModuleDeclaration::new("Billing", EXPORTS);

    #[test]
    fn test_catalog_resolves_manifest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("billing.pmod");
        fs::write(&path, CatalogBackend::manifest_contents("billing")).unwrap();

        let backend = CatalogBackend::new().with_module(&BILLING);
        let handle = backend.open(&path).unwrap().unwrap();
        assert_eq!(handle.module_name(), "Billing");
        assert_eq!(handle.path(), path);
    }

    #[test]
    fn test_catalog_rejects_bad_manifests() {
        let dir = tempdir().unwrap();
        let backend = CatalogBackend::new().with_module(&BILLING);

        let garbage = dir.path().join("garbage.pmod");
        fs::write(&garbage, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(
            backend.open(&garbage),
            Err(ModuleLoadError::InvalidCatalogEntry { .. })
        ));

        let unknown = dir.path().join("unknown.pmod");
        fs::write(&unknown, CatalogBackend::manifest_contents("shipping")).unwrap();
        assert!(matches!(
            backend.open(&unknown),
            Err(ModuleLoadError::UnknownCatalogModule { name, .. }) if name == "shipping"
        ));
    }

    #[test]
    fn test_dylib_backend_rejects_non_library() {
        let dir = tempdir().unwrap();
        let path = dir
            .path()
            .join(format!("broken.{}", std::env::consts::DLL_EXTENSION));
        fs::write(&path, b"definitely not a shared object").unwrap();
        assert!(matches!(
            DylibBackend.open(&path),
            Err(ModuleLoadError::Open { .. })
        ));
    }
}
