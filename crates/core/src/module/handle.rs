use crate::error::ModuleLoadError;
use libloading::Library;
use portico_plugin::{
    CONTRACT_VERSION, DECLARATION_SYMBOL, ExportedType, ModuleDeclaration, RUSTC_VERSION,
    build_fingerprint,
};
use std::mem::ManuallyDrop;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

enum Image {
    /// Declaration compiled into the host; nothing to unload.
    Static,
    Library(ManuallyDrop<Library>),
}

/// A loaded module image and the declaration it exports.
///
/// Dropping the handle unloads the image, unless it was [pinned](Self::pin):
/// once an object built from the module's code is alive, the image stays
/// mapped for the rest of the process.
pub struct ModuleHandle {
    path: PathBuf,
    declaration: &'static ModuleDeclaration,
    image: Image,
    pinned: AtomicBool,
}

impl ModuleHandle {
    /// Wrap a declaration linked into the host.
    pub fn from_static(
        path: impl Into<PathBuf>,
        declaration: &'static ModuleDeclaration,
    ) -> Result<Self, ModuleLoadError> {
        let path = path.into();
        check_contract(&path, declaration)?;
        Ok(Self {
            path,
            declaration,
            image: Image::Static,
            pinned: AtomicBool::new(false),
        })
    }

    /// Take ownership of a loaded library and resolve its declaration.
    ///
    /// Returns `Ok(None)` for a library that exports no declaration, such as a
    /// helper library shipped next to a module. On `None` or error the library
    /// is dropped, which unloads it.
    ///
    /// # Safety
    ///
    /// If `library` exports [`DECLARATION_SYMBOL`], it must be a
    /// `ModuleDeclaration` static produced by `export_module!`.
    pub unsafe fn from_library(
        path: impl Into<PathBuf>,
        library: Library,
    ) -> Result<Option<Self>, ModuleLoadError> {
        let path = path.into();

        // SAFETY: the symbol is a data symbol holding a `ModuleDeclaration`; the
        // pointer stays valid for as long as `library` is loaded.
        let pointer = match unsafe {
            library.get::<*const ModuleDeclaration>(DECLARATION_SYMBOL.as_bytes())
        } {
            Ok(symbol) => *symbol,
            Err(_) => return Ok(None),
        };
        if pointer.is_null() {
            return Ok(None);
        }

        // SAFETY: non-null and owned by `library`, which the handle keeps loaded
        // for at least as long as the reference is reachable through it.
        let declaration: &'static ModuleDeclaration = unsafe { &*pointer };
        check_contract(&path, declaration)?;

        Ok(Some(Self {
            path,
            declaration,
            image: Image::Library(ManuallyDrop::new(library)),
            pinned: AtomicBool::new(false),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn declaration(&self) -> &ModuleDeclaration {
        self.declaration
    }

    pub fn module_name(&self) -> &str {
        self.declaration.module_name
    }

    pub fn exports(&self) -> &[ExportedType] {
        self.declaration.exports
    }

    pub fn export(&self, index: usize) -> Option<&ExportedType> {
        self.declaration.exports.get(index)
    }

    pub fn entry(&self) -> Option<&ExportedType> {
        self.declaration.entry()
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.image, Image::Library(_))
    }

    /// Keep the image loaded for the rest of the process.
    pub fn pin(&self) {
        if !self.pinned.swap(true, Ordering::AcqRel) {
            tracing::debug!("Pinned module {} ({})", self.module_name(), self.path.display());
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned.load(Ordering::Acquire)
    }
}

/// The contract version is compared first; the fingerprint is only called
/// once the leading layout is known to match.
fn check_contract(path: &Path, declaration: &ModuleDeclaration) -> Result<(), ModuleLoadError> {
    if declaration.contract_version != CONTRACT_VERSION {
        return Err(ModuleLoadError::Incompatible {
            path: path.to_path_buf(),
            found: format!("contract {}", declaration.contract_version),
            expected: format!("contract {CONTRACT_VERSION}"),
        });
    }
    let found = declaration.fingerprint();
    let expected = build_fingerprint();
    if found != expected {
        return Err(ModuleLoadError::Incompatible {
            path: path.to_path_buf(),
            found: format!("build {found:016x}"),
            expected: format!("build {expected:016x} ({RUSTC_VERSION})"),
        });
    }
    Ok(())
}

impl Drop for ModuleHandle {
    fn drop(&mut self) {
        if let Image::Library(library) = &mut self.image {
            if *self.pinned.get_mut() {
                return;
            }
            tracing::debug!("Unloading module {}", self.path.display());
            // SAFETY: not pinned, so no object built from this image outlives
            // the handle; the declaration reference dies with `self`.
            unsafe { ManuallyDrop::drop(library) };
        }
    }
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("path", &self.path)
            .field("module", &self.declaration.module_name)
            .field("dynamic", &self.is_dynamic())
            .field("pinned", &self.is_pinned())
            .finish()
    }
}
