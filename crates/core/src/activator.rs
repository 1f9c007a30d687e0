//! Endpoint Activator: asks every registered definition, in order, to attach
//! its routes to the built web application.

use crate::error::RouteAttachError;
use crate::registrar::EndpointRegistry;
use crate::util::panic_message;
use portico_api::WebApplication;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::Span;

pub struct EndpointActivator {
    span: Span,
}

impl Default for EndpointActivator {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointActivator {
    pub fn new() -> Self {
        Self { span: Span::none() }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Attach the routes of every published definition. Returns how many
    /// definitions were activated. The first failure aborts startup.
    pub fn activate(&self, app: &mut WebApplication) -> Result<usize, RouteAttachError> {
        let _enter = self.span.enter();
        let registry = app
            .services()
            .get::<EndpointRegistry>()
            .ok_or(RouteAttachError::RegistryMissing)?;
        if !registry.begin_activation() {
            return Err(RouteAttachError::AlreadyActivated);
        }

        let environment = app.environment().clone();
        for registered in registry.iter() {
            let before = app.routes().len();
            app.set_route_owner(Some(registered.name()));
            let result = catch_unwind(AssertUnwindSafe(|| {
                registered.definition().define_endpoints(app, &environment)
            }));
            app.set_route_owner(None);

            match result {
                Ok(Ok(())) => {
                    tracing::debug!(
                        "{} attached {} route(s)",
                        registered.name(),
                        app.routes().len() - before
                    );
                }
                Ok(Err(source)) => {
                    tracing::error!("{} failed to define endpoints: {}", registered.name(), source);
                    return Err(RouteAttachError::Failed {
                        definition: registered.name().to_string(),
                        source,
                    });
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!("{} panicked while defining endpoints: {}", registered.name(), message);
                    return Err(RouteAttachError::Panicked {
                        definition: registered.name().to_string(),
                        message,
                    });
                }
            }
        }

        tracing::info!(
            "Activated {} endpoint definition(s), {} route(s) attached",
            registry.len(),
            app.routes().len()
        );
        Ok(registry.len())
    }
}

/// Attach the routes of every published definition to `app`.
pub fn use_endpoint_definitions(app: &mut WebApplication) -> Result<usize, RouteAttachError> {
    EndpointActivator::new().activate(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{EntryPoint, ModuleHandle};
    use crate::registrar::ServiceRegistrar;
    use crate::scan::CapabilityScanner;
    use portico_api::{
        EnvironmentName, HostEnvironment, ServiceCollection, ServiceResult, WebApplication,
    };
    use portico_plugin::{
        BoxError, EndpointDefinition, ExportedType, FromServices, ModuleDeclaration,
    };

    struct First;
    struct Second;
    struct Broken;
    struct Conflicting;

    impl EndpointDefinition for First {
        fn define_endpoints(
            &self,
            app: &mut WebApplication,
            _env: &HostEnvironment,
        ) -> Result<(), BoxError> {
            app.map_get("/first", || async { "first" });
            Ok(())
        }
    }

    impl EndpointDefinition for Second {
        fn define_endpoints(
            &self,
            app: &mut WebApplication,
            env: &HostEnvironment,
        ) -> Result<(), BoxError> {
            app.map_get("/second", || async { "second" });
            if env.is_development() {
                app.map_get("/second/debug", || async { "debug" });
            }
            Ok(())
        }
    }

    impl EndpointDefinition for Broken {
        fn define_endpoints(
            &self,
            _app: &mut WebApplication,
            _env: &HostEnvironment,
        ) -> Result<(), BoxError> {
            Err("route table refused".into())
        }
    }

    impl EndpointDefinition for Conflicting {
        fn define_endpoints(
            &self,
            app: &mut WebApplication,
            _env: &HostEnvironment,
        ) -> Result<(), BoxError> {
            app.map_get("/first", || async { "again" });
            Ok(())
        }
    }

    macro_rules! unit_from_services {
        ($($ty:ident),*) => {
            $(impl FromServices for $ty {
                fn from_services(_services: &ServiceCollection) -> ServiceResult<Self> {
                    Ok($ty)
                }
            })*
        };
    }
    unit_from_services!(First, Second, Broken, Conflicting);

    const ORDERED: &[ExportedType] = &[
        ExportedType::marker("Program"),
        ExportedType::definition::<First>("First"),
        ExportedType::definition::<Second>("Second"),
    ];
    const FAILING: &[ExportedType] = &[
        ExportedType::marker("Program"),
        ExportedType::definition::<First>("First"),
        ExportedType::definition::<Broken>("Broken"),
        ExportedType::definition::<Second>("Second"),
    ];
    const CONFLICTING: &[ExportedType] = &[
        ExportedType::marker("Program"),
        ExportedType::definition::<First>("First"),
        ExportedType::definition::<Conflicting>("Conflicting"),
    ];
    static ORDERED_MODULE: ModuleDeclaration = ModuleDeclaration::new("ordered", ORDERED);
    static FAILING_MODULE: ModuleDeclaration = ModuleDeclaration::new("failing", FAILING);
    static CONFLICTING_MODULE: ModuleDeclaration =
        ModuleDeclaration::new("conflicting", CONFLICTING);

    fn application(declaration: &'static ModuleDeclaration, env: EnvironmentName) -> WebApplication {
        let handle = ModuleHandle::from_static(declaration.module_name, declaration).unwrap();
        let definitions = CapabilityScanner::new().scan(&[EntryPoint::new(handle).unwrap()]);
        let mut services = ServiceCollection::new();
        ServiceRegistrar::new()
            .register(&mut services, &definitions)
            .unwrap();
        WebApplication::new(services.build(), HostEnvironment::new("test", env, "."))
    }

    #[test]
    fn test_routes_attached_in_registry_order_with_owner() {
        let mut app = application(&ORDERED_MODULE, EnvironmentName::Development);
        assert_eq!(use_endpoint_definitions(&mut app).unwrap(), 2);

        let routes: Vec<_> = app
            .routes()
            .iter()
            .map(|r| (r.path.as_str(), r.owner.as_deref()))
            .collect();
        assert_eq!(
            routes,
            vec![
                ("/first", Some("First")),
                ("/second", Some("Second")),
                ("/second/debug", Some("Second")),
            ]
        );
    }

    #[test]
    fn test_environment_is_passed_through() {
        let mut app = application(&ORDERED_MODULE, EnvironmentName::Production);
        use_endpoint_definitions(&mut app).unwrap();
        assert!(app.routes().iter().all(|r| r.path != "/second/debug"));
    }

    #[test]
    fn test_failure_stops_activation() {
        let mut app = application(&FAILING_MODULE, EnvironmentName::Production);
        let err = use_endpoint_definitions(&mut app).unwrap_err();
        assert!(matches!(
            &err,
            RouteAttachError::Failed { definition, .. } if definition == "Broken"
        ));
        assert_eq!(app.routes().len(), 1);
    }

    #[test]
    fn test_conflicting_route_panic_is_reported() {
        let mut app = application(&CONFLICTING_MODULE, EnvironmentName::Production);
        let err = use_endpoint_definitions(&mut app).unwrap_err();
        assert!(matches!(
            err,
            RouteAttachError::Panicked { definition, .. } if definition == "Conflicting"
        ));
    }

    #[test]
    fn test_activation_happens_once() {
        let mut app = application(&ORDERED_MODULE, EnvironmentName::Production);
        use_endpoint_definitions(&mut app).unwrap();
        let err = use_endpoint_definitions(&mut app).unwrap_err();
        assert!(matches!(err, RouteAttachError::AlreadyActivated));
        assert_eq!(app.routes().len(), 2);
    }

    #[test]
    fn test_missing_registry() {
        let services = ServiceCollection::new().build();
        let mut app = WebApplication::new(
            services,
            HostEnvironment::new("test", EnvironmentName::Production, "."),
        );
        assert!(matches!(
            use_endpoint_definitions(&mut app),
            Err(RouteAttachError::RegistryMissing)
        ));
    }
}
