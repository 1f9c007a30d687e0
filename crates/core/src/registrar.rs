//! Service Registrar: instantiates every discovered definition, lets it
//! register its services, and publishes the resulting registry.

use crate::error::ActivationError;
use crate::module::ModuleHandle;
use crate::scan::DefinitionType;
use crate::util::panic_message;
use portico_api::{ServiceCollection, ServiceError};
use portico_plugin::EndpointDefinition;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::Span;

/// One instantiated endpoint definition.
pub struct RegisteredDefinition {
    name: String,
    // Dropped before `module`, whose image holds the instance's code.
    instance: Box<dyn EndpointDefinition>,
    module: Arc<ModuleHandle>,
}

impl RegisteredDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module_name(&self) -> &str {
        self.module.module_name()
    }

    pub fn definition(&self) -> &dyn EndpointDefinition {
        self.instance.as_ref()
    }
}

impl std::fmt::Debug for RegisteredDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredDefinition")
            .field("name", &self.name)
            .field("module", &self.module_name())
            .finish()
    }
}

/// The ordered, immutable set of definitions published into the service
/// registry. Other components (route listings, API documentation) read it to
/// enumerate what was registered.
#[derive(Debug)]
pub struct EndpointRegistry {
    definitions: Vec<RegisteredDefinition>,
    activated: AtomicBool,
}

impl EndpointRegistry {
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RegisteredDefinition> {
        self.definitions.iter()
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.name.as_str()).collect()
    }

    /// Marks the registry activated. Returns `false` if it already was.
    pub(crate) fn begin_activation(&self) -> bool {
        !self.activated.swap(true, Ordering::AcqRel)
    }

    pub fn is_activated(&self) -> bool {
        self.activated.load(Ordering::Acquire)
    }
}

impl<'a> IntoIterator for &'a EndpointRegistry {
    type Item = &'a RegisteredDefinition;
    type IntoIter = std::slice::Iter<'a, RegisteredDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.definitions.iter()
    }
}

pub struct ServiceRegistrar {
    span: Span,
}

impl Default for ServiceRegistrar {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistrar {
    pub fn new() -> Self {
        Self { span: Span::none() }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Instantiate `definitions` in order against `services`, run each one's
    /// service registration, then publish the registry as a singleton.
    ///
    /// Stops at the first failure; nothing is published in that case.
    pub fn register(
        &self,
        services: &mut ServiceCollection,
        definitions: &[DefinitionType],
    ) -> Result<Arc<EndpointRegistry>, ActivationError> {
        let _enter = self.span.enter();
        if services.contains::<EndpointRegistry>() {
            return Err(ActivationError::AlreadyPublished);
        }

        let mut registered = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let name = definition.name().to_string();
            let activate = definition
                .activator()
                .ok_or_else(|| ActivationError::NotCapable {
                    definition: name.clone(),
                })?;

            let constructed = catch_unwind(AssertUnwindSafe(|| activate(&*services)));
            let instance = match constructed {
                Ok(Ok(instance)) => instance,
                Ok(Err(source @ ServiceError::Missing { .. })) => {
                    return Err(ActivationError::MissingDependency {
                        definition: name,
                        source,
                    });
                }
                Ok(Err(source)) => {
                    return Err(ActivationError::Construct {
                        definition: name,
                        source,
                    });
                }
                Err(payload) => {
                    return Err(ActivationError::Panicked {
                        definition: name,
                        phase: "construction",
                        message: panic_message(payload.as_ref()),
                    });
                }
            };
            // The instance's code lives in the module image from now on.
            definition.module().pin();

            let defined = catch_unwind(AssertUnwindSafe(|| instance.define_services(services)));
            match defined {
                Ok(Ok(())) => {}
                Ok(Err(source)) => {
                    return Err(ActivationError::DefineServices {
                        definition: name,
                        source,
                    });
                }
                Err(payload) => {
                    return Err(ActivationError::Panicked {
                        definition: name,
                        phase: "service registration",
                        message: panic_message(payload.as_ref()),
                    });
                }
            }

            tracing::debug!(
                "Registered services of {} from module {}",
                name,
                definition.module().module_name()
            );
            registered.push(RegisteredDefinition {
                name,
                instance,
                module: Arc::clone(definition.module()),
            });
        }

        let registry = Arc::new(EndpointRegistry {
            definitions: registered,
            activated: AtomicBool::new(false),
        });
        services.add_shared(Arc::clone(&registry));
        tracing::info!("Published {} endpoint definition(s)", registry.len());
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::EntryPoint;
    use crate::scan::CapabilityScanner;
    use portico_api::{HostEnvironment, ServiceResult, WebApplication};
    use portico_plugin::{BoxError, ExportedType, FromServices, ModuleDeclaration};

    struct Greeting(&'static str);
    struct Audit(Vec<&'static str>);

    struct Greeter {
        greeting: Arc<Greeting>,
    }

    impl EndpointDefinition for Greeter {
        fn define_services(&self, services: &mut ServiceCollection) -> Result<(), BoxError> {
            services.add_singleton(Audit(vec![self.greeting.0]));
            Ok(())
        }

        fn define_endpoints(
            &self,
            _app: &mut WebApplication,
            _env: &HostEnvironment,
        ) -> Result<(), BoxError> {
            Ok(())
        }
    }

    impl FromServices for Greeter {
        fn from_services(services: &ServiceCollection) -> ServiceResult<Self> {
            Ok(Greeter {
                greeting: services.require::<Greeting>()?,
            })
        }
    }

    struct Seeder;

    impl EndpointDefinition for Seeder {
        fn define_services(&self, services: &mut ServiceCollection) -> Result<(), BoxError> {
            services.add_singleton(Greeting("hello"));
            Ok(())
        }

        fn define_endpoints(
            &self,
            _app: &mut WebApplication,
            _env: &HostEnvironment,
        ) -> Result<(), BoxError> {
            Ok(())
        }
    }

    impl FromServices for Seeder {
        fn from_services(_services: &ServiceCollection) -> ServiceResult<Self> {
            Ok(Seeder)
        }
    }

    struct Refuser;

    impl EndpointDefinition for Refuser {
        fn define_services(&self, _services: &mut ServiceCollection) -> Result<(), BoxError> {
            Err("database unreachable".into())
        }

        fn define_endpoints(
            &self,
            _app: &mut WebApplication,
            _env: &HostEnvironment,
        ) -> Result<(), BoxError> {
            Ok(())
        }
    }

    impl FromServices for Refuser {
        fn from_services(_services: &ServiceCollection) -> ServiceResult<Self> {
            Ok(Refuser)
        }
    }

    struct Exploder;

    impl EndpointDefinition for Exploder {
        fn define_endpoints(
            &self,
            _app: &mut WebApplication,
            _env: &HostEnvironment,
        ) -> Result<(), BoxError> {
            Ok(())
        }
    }

    impl FromServices for Exploder {
        fn from_services(_services: &ServiceCollection) -> ServiceResult<Self> {
            panic!("constructor exploded")
        }
    }

    const SEEDED: &[ExportedType] = &[
        ExportedType::marker("Program"),
        ExportedType::definition::<Seeder>("Seeder"),
        ExportedType::definition::<Greeter>("Greeter"),
    ];
    const UNSEEDED: &[ExportedType] = &[
        ExportedType::marker("Program"),
        ExportedType::definition::<Greeter>("Greeter"),
    ];
    const REFUSING: &[ExportedType] = &[
        ExportedType::marker("Program"),
        ExportedType::definition::<Refuser>("Refuser"),
    ];
    const EXPLODING: &[ExportedType] = &[
        ExportedType::marker("Program"),
        ExportedType::definition::<Exploder>("Exploder"),
    ];
    static SEEDED_MODULE: ModuleDeclaration = ModuleDeclaration::new("seeded", SEEDED);
    static UNSEEDED_MODULE: ModuleDeclaration = ModuleDeclaration::new("unseeded", UNSEEDED);
    static REFUSING_MODULE: ModuleDeclaration = ModuleDeclaration::new("refusing", REFUSING);
    static EXPLODING_MODULE: ModuleDeclaration = ModuleDeclaration::new("exploding", EXPLODING);

    fn discover(declaration: &'static ModuleDeclaration) -> Vec<DefinitionType> {
        let handle = ModuleHandle::from_static(declaration.module_name, declaration).unwrap();
        CapabilityScanner::new().scan(&[EntryPoint::new(handle).unwrap()])
    }

    #[test]
    fn test_registers_in_order_and_publishes() {
        let definitions = discover(&SEEDED_MODULE);
        let mut services = ServiceCollection::new();
        let registry = ServiceRegistrar::new()
            .register(&mut services, &definitions)
            .unwrap();

        assert_eq!(registry.names(), vec!["Seeder", "Greeter"]);
        assert_eq!(registry.get("Greeter").unwrap().module_name(), "seeded");
        assert_eq!(services.require::<Audit>().unwrap().0, vec!["hello"]);
        let published = services.require::<EndpointRegistry>().unwrap();
        assert!(Arc::ptr_eq(&published, &registry));
        assert!(definitions.iter().all(|d| d.module().is_pinned()));
    }

    #[test]
    fn test_missing_dependency_stops_registration() {
        let definitions = discover(&UNSEEDED_MODULE);
        let mut services = ServiceCollection::new();
        let err = ServiceRegistrar::new()
            .register(&mut services, &definitions)
            .unwrap_err();

        assert!(matches!(
            &err,
            ActivationError::MissingDependency { definition, .. } if definition == "Greeter"
        ));
        assert!(!services.contains::<EndpointRegistry>());
    }

    #[test]
    fn test_define_services_error_is_reported() {
        let definitions = discover(&REFUSING_MODULE);
        let err = ServiceRegistrar::new()
            .register(&mut ServiceCollection::new(), &definitions)
            .unwrap_err();
        assert!(matches!(err, ActivationError::DefineServices { .. }));
        assert!(err.to_string().contains("Refuser"));
    }

    #[test]
    fn test_constructor_panic_is_caught() {
        let definitions = discover(&EXPLODING_MODULE);
        let err = ServiceRegistrar::new()
            .register(&mut ServiceCollection::new(), &definitions)
            .unwrap_err();
        match err {
            ActivationError::Panicked { definition, phase, message } => {
                assert_eq!(definition, "Exploder");
                assert_eq!(phase, "construction");
                assert_eq!(message, "constructor exploded");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!definitions[0].module().is_pinned());
    }

    #[test]
    fn test_registry_is_published_once() {
        let mut services = ServiceCollection::new();
        let registrar = ServiceRegistrar::new();
        registrar.register(&mut services, &[]).unwrap();
        let err = registrar
            .register(&mut services, &discover(&SEEDED_MODULE))
            .unwrap_err();
        assert!(matches!(err, ActivationError::AlreadyPublished));
        assert_eq!(services.get_all::<EndpointRegistry>().len(), 1);
    }
}
