//! Capability Scanner: picks the exports of each entry module that can act as
//! endpoint definitions.

use crate::module::{EntryPoint, ModuleHandle};
use portico_plugin::{ActivateFn, ExportedType};
use std::sync::Arc;
use tracing::Span;

/// Type names containing this token (ASCII case-insensitive) are documentation
/// generators, never endpoint definitions.
pub const EXCLUSION_TOKEN: &str = "swagger";

pub fn is_excluded(name: &str) -> bool {
    name.to_ascii_lowercase().contains(EXCLUSION_TOKEN)
}

/// Concrete, capable, and not excluded.
pub fn qualifies(export: &ExportedType) -> bool {
    export.is_concrete() && export.implements_capability() && !is_excluded(export.name)
}

/// A qualifying export, together with the module that defines it.
#[derive(Debug, Clone)]
pub struct DefinitionType {
    module: Arc<ModuleHandle>,
    index: usize,
}

impl DefinitionType {
    pub fn module(&self) -> &Arc<ModuleHandle> {
        &self.module
    }

    pub fn export(&self) -> &ExportedType {
        &self.module.exports()[self.index]
    }

    pub fn name(&self) -> &str {
        self.export().name
    }

    pub(crate) fn activator(&self) -> Option<ActivateFn> {
        self.export().activator
    }
}

#[derive(Debug, Clone)]
pub struct CapabilityScanner {
    span: Span,
}

impl Default for CapabilityScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityScanner {
    pub fn new() -> Self {
        Self { span: Span::none() }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Qualifying exports in module order, then declaration order.
    pub fn scan(&self, entries: &[EntryPoint]) -> Vec<DefinitionType> {
        let _enter = self.span.enter();
        let mut found = Vec::new();
        for entry in entries {
            let module = entry.module();
            for (index, export) in module.exports().iter().enumerate() {
                if qualifies(export) {
                    found.push(DefinitionType {
                        module: Arc::clone(module),
                        index,
                    });
                } else if export.implements_capability() {
                    tracing::debug!(
                        "Skipping {} from module {}: excluded or not concrete",
                        export.name,
                        module.module_name()
                    );
                }
            }
        }
        tracing::info!(
            "Found {} endpoint definition(s) in {} module(s)",
            found.len(),
            entries.len()
        );
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleHandle;
    use portico_api::{HostEnvironment, ServiceCollection, ServiceResult, WebApplication};
    use portico_plugin::{
        BoxError, EndpointDefinition, FromServices, ModuleDeclaration, TypeKind,
    };

    struct Probe;

    impl EndpointDefinition for Probe {
        fn define_endpoints(
            &self,
            _app: &mut WebApplication,
            _env: &HostEnvironment,
        ) -> Result<(), BoxError> {
            Ok(())
        }
    }

    impl FromServices for Probe {
        fn from_services(_services: &ServiceCollection) -> ServiceResult<Self> {
            Ok(Probe)
        }
    }

    const EXPORTS: &[ExportedType] = &[
        ExportedType::marker("Program"),
        ExportedType::definition::<Probe>("OrderEndpoints"),
        ExportedType::definition::<Probe>("XSwaggerGenerator"),
        ExportedType::opaque("EndpointBase", TypeKind::Abstract),
        ExportedType::opaque("IRepository", TypeKind::Interface),
        ExportedType::definition::<Probe>("AuditEndpoints"),
    ];
    static MODULE: ModuleDeclaration = ModuleDeclaration::new("probe", EXPORTS);

    fn entry() -> EntryPoint {
        EntryPoint::new(ModuleHandle::from_static("probe", &MODULE).unwrap()).unwrap()
    }

    #[test]
    fn test_exclusion_is_case_insensitive_substring() {
        assert!(is_excluded("XSwaggerGenerator"));
        assert!(is_excluded("SWAGGERDoc"));
        assert!(!is_excluded("OrderEndpoints"));
        assert!(!is_excluded("Swag"));
    }

    #[test]
    fn test_scan_keeps_capable_concrete_types_in_order() {
        let found = CapabilityScanner::new().scan(&[entry()]);
        let names: Vec<_> = found.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["OrderEndpoints", "AuditEndpoints"]);
        assert!(found.iter().all(|d| d.module().module_name() == "probe"));
    }

    #[test]
    fn test_scan_follows_module_order() {
        let found = CapabilityScanner::new().scan(&[entry(), entry()]);
        assert_eq!(found.len(), 4);
        assert_eq!(found[2].name(), "OrderEndpoints");
    }
}
