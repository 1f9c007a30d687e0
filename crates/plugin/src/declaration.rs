//! The registration table a module exports instead of runtime type inspection.

use crate::{EndpointDefinition, FromServices};
use portico_api::axum::extract::RawPathParams;
use portico_api::axum::http::Extensions;
use portico_api::axum::{Router, body::Body};
use portico_api::{
    HostEnvironment, ServiceCollection, ServiceProvider, ServiceResult, WebApplication,
};
use std::any::TypeId;
use std::hash::{DefaultHasher, Hash, Hasher};

/// Version of this contract. A module built against any other version is
/// rejected at load time: Rust trait objects are only compatible when host and
/// module agree on the exact contract crate.
pub const CONTRACT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// `rustc --version` of the compiler that built this copy of the contract.
pub const RUSTC_VERSION: &str = env!("PORTICO_RUSTC_VERSION");

/// Symbol under which a dynamic module exports its [`ModuleDeclaration`].
pub const DECLARATION_SYMBOL: &str = "PORTICO_MODULE";

/// Name of the export that anchors discovery inside a module (ASCII case-insensitive).
pub const ENTRY_MARKER: &str = "Program";

pub type FingerprintFn = extern "C" fn() -> u64;

/// Identity of the contract types as compiled into the calling image.
///
/// Host and module exchange trait objects, service handles and axum request
/// types by Rust layout, and look request extensions up by `TypeId`. Those only
/// agree when both sides were built by the same compiler against the same
/// compilation of `portico-api`, axum and `http`, which is what this hash
/// covers. Every image evaluates its own copy, so a module built elsewhere
/// reports a different value.
pub extern "C" fn build_fingerprint() -> u64 {
    let mut hasher = DefaultHasher::new();
    RUSTC_VERSION.hash(&mut hasher);
    CONTRACT_VERSION.hash(&mut hasher);
    for id in [
        TypeId::of::<ServiceCollection>(),
        TypeId::of::<ServiceProvider>(),
        TypeId::of::<WebApplication>(),
        TypeId::of::<HostEnvironment>(),
        TypeId::of::<Box<dyn EndpointDefinition>>(),
        TypeId::of::<Router>(),
        TypeId::of::<Body>(),
        TypeId::of::<RawPathParams>(),
        TypeId::of::<Extensions>(),
    ] {
        id.hash(&mut hasher);
    }
    hasher.finish()
}

pub type ActivateFn = fn(&ServiceCollection) -> ServiceResult<Box<dyn EndpointDefinition>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Concrete,
    Abstract,
    Interface,
}

/// One exported type of a module.
///
/// `activator` is only set for types that implement the endpoint-definition
/// capability; the bound is checked when the table is compiled.
#[derive(Clone, Copy)]
pub struct ExportedType {
    pub name: &'static str,
    pub kind: TypeKind,
    pub activator: Option<ActivateFn>,
}

impl ExportedType {
    pub const fn marker(name: &'static str) -> Self {
        Self {
            name,
            kind: TypeKind::Concrete,
            activator: None,
        }
    }

    pub const fn definition<T>(name: &'static str) -> Self
    where
        T: EndpointDefinition + FromServices + 'static,
    {
        Self {
            name,
            kind: TypeKind::Concrete,
            activator: Some(activate::<T> as ActivateFn),
        }
    }

    /// A type visible to the host that carries no capability.
    pub const fn opaque(name: &'static str, kind: TypeKind) -> Self {
        Self {
            name,
            kind,
            activator: None,
        }
    }

    pub fn implements_capability(&self) -> bool {
        self.activator.is_some()
    }

    pub fn is_concrete(&self) -> bool {
        self.kind == TypeKind::Concrete
    }
}

impl std::fmt::Debug for ExportedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportedType")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("capable", &self.implements_capability())
            .finish()
    }
}

fn activate<T>(services: &ServiceCollection) -> ServiceResult<Box<dyn EndpointDefinition>>
where
    T: EndpointDefinition + FromServices + 'static,
{
    Ok(Box::new(T::from_services(services)?))
}

/// Everything a module tells the host about itself.
///
/// `contract_version` and `build_fingerprint` lead the layout so a host can
/// check both before trusting the rest.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ModuleDeclaration {
    pub contract_version: &'static str,
    pub build_fingerprint: FingerprintFn,
    pub module_name: &'static str,
    pub exports: &'static [ExportedType],
}

impl ModuleDeclaration {
    pub const fn new(module_name: &'static str, exports: &'static [ExportedType]) -> Self {
        Self {
            contract_version: CONTRACT_VERSION,
            build_fingerprint,
            module_name,
            exports,
        }
    }

    pub fn is_compatible(&self) -> bool {
        self.contract_version == CONTRACT_VERSION && self.fingerprint() == build_fingerprint()
    }

    /// The fingerprint as computed by the image that declared the module.
    pub fn fingerprint(&self) -> u64 {
        (self.build_fingerprint)()
    }

    /// Index of the entry export, if the module has one.
    pub fn entry_index(&self) -> Option<usize> {
        self.exports
            .iter()
            .position(|export| export.name.eq_ignore_ascii_case(ENTRY_MARKER))
    }

    pub fn entry(&self) -> Option<&ExportedType> {
        self.entry_index().map(|index| &self.exports[index])
    }
}
