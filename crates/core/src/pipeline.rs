//! One discovery pipeline for every way plugins reach the host: package
//! archives, raw module files, and modules compiled into the host.

use crate::config::HostConfig;
use crate::error::{ConfigurationError, PorticoError};
use crate::module::{
    EntryPoint, LoadReport, ModuleBackend, ModuleFilter, ModuleHandle, ModuleLoader,
    default_parallelism,
};
use crate::package::{HostRuntime, PackageExtractor};
use crate::registrar::{EndpointRegistry, ServiceRegistrar};
use crate::scan::{CapabilityScanner, DefinitionType};
use portico_api::ServiceCollection;
use portico_plugin::ModuleDeclaration;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Span;

/// What happens when one archive or module of a source fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailurePolicy {
    /// Abort discovery with the first error.
    FailFast,
    /// Log the error, skip the item and continue.
    FailSoft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceKind {
    Archives,
    Modules,
    InProcess,
}

#[derive(Debug, Clone)]
enum Origin {
    Archives(PathBuf),
    Modules(PathBuf),
    InProcess(&'static ModuleDeclaration),
}

/// Where definitions come from, and how failures there are treated.
#[derive(Debug, Clone)]
pub struct PluginSource {
    origin: Origin,
    policy: FailurePolicy,
}

impl PluginSource {
    /// Package archives under `root`; extraction failures abort by default.
    /// Modules inside extracted packages always load fail-soft.
    pub fn archives(root: impl Into<PathBuf>) -> Self {
        Self {
            origin: Origin::Archives(root.into()),
            policy: FailurePolicy::FailFast,
        }
    }

    /// Module files directly under `root`; load failures are skipped by default.
    pub fn modules(root: impl Into<PathBuf>) -> Self {
        Self {
            origin: Origin::Modules(root.into()),
            policy: FailurePolicy::FailSoft,
        }
    }

    /// A module compiled into the host.
    pub fn in_process(declaration: &'static ModuleDeclaration) -> Self {
        Self {
            origin: Origin::InProcess(declaration),
            policy: FailurePolicy::FailFast,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Filesystem root of the source, if it has one.
    pub fn root(&self) -> Option<&Path> {
        match &self.origin {
            Origin::Archives(root) | Origin::Modules(root) => Some(root),
            Origin::InProcess(_) => None,
        }
    }

    pub fn kind(&self) -> SourceKind {
        match &self.origin {
            Origin::Archives(_) => SourceKind::Archives,
            Origin::Modules(_) => SourceKind::Modules,
            Origin::InProcess(_) => SourceKind::InProcess,
        }
    }
}

/// Counts gathered while discovering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    pub archives_extracted: usize,
    pub packages_without_payload: usize,
    pub archives_failed: usize,
    pub modules_loaded: usize,
    pub modules_failed: usize,
    pub modules_without_entry: usize,
    /// Names of the discovered definitions, in registration order.
    pub definitions: Vec<String>,
}

#[derive(Debug)]
pub struct Discovery {
    pub definitions: Vec<DefinitionType>,
    pub report: DiscoveryReport,
}

pub struct PluginPipeline {
    backend: Arc<dyn ModuleBackend>,
    host: HostRuntime,
    filter: ModuleFilter,
    parallelism: usize,
    sources: Vec<PluginSource>,
    span: Span,
}

impl PluginPipeline {
    pub fn new(backend: Arc<dyn ModuleBackend>) -> Self {
        Self {
            backend,
            host: HostRuntime::current(),
            filter: ModuleFilter::platform_default(),
            parallelism: default_parallelism(),
            sources: Vec::new(),
            span: Span::none(),
        }
    }

    /// A pipeline using the configured runtime and module extensions. Sources
    /// are not added.
    pub fn from_config(config: &HostConfig, backend: Arc<dyn ModuleBackend>) -> Self {
        Self::new(backend)
            .with_host_runtime(config.host_runtime.clone())
            .with_module_filter(config.module_filter.clone())
    }

    pub fn with_host_runtime(mut self, host: HostRuntime) -> Self {
        self.host = host;
        self
    }

    pub fn with_module_filter(mut self, filter: ModuleFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_parallelism(mut self, threads: usize) -> Self {
        self.parallelism = threads.max(1);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn with_source(mut self, source: PluginSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn add_source(&mut self, source: PluginSource) -> &mut Self {
        self.sources.push(source);
        self
    }

    pub fn sources(&self) -> &[PluginSource] {
        &self.sources
    }

    /// Every filesystem root must be an existing directory.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for root in self.sources.iter().filter_map(PluginSource::root) {
            if !root.is_dir() {
                return Err(ConfigurationError::PluginRootNotFound(root.to_path_buf()));
            }
        }
        Ok(())
    }

    /// Discover definitions from every source, in the order sources were added.
    pub fn discover(&self) -> crate::Result<Discovery> {
        let _enter = self.span.enter();
        self.validate()?;

        let mut report = DiscoveryReport::default();
        let mut entries: Vec<EntryPoint> = Vec::new();
        for source in &self.sources {
            entries.extend(self.discover_source(source, &mut report)?);
        }

        let definitions = CapabilityScanner::new()
            .with_span(self.span.clone())
            .scan(&entries);
        report.definitions = definitions.iter().map(|d| d.name().to_string()).collect();
        Ok(Discovery {
            definitions,
            report,
        })
    }

    /// Discover, then instantiate and publish every definition into `services`.
    pub fn register(
        &self,
        services: &mut ServiceCollection,
    ) -> crate::Result<(Arc<EndpointRegistry>, DiscoveryReport)> {
        let discovery = self.discover()?;
        let registry = ServiceRegistrar::new()
            .with_span(self.span.clone())
            .register(services, &discovery.definitions)?;
        Ok((registry, discovery.report))
    }

    fn loader(&self) -> ModuleLoader {
        ModuleLoader::new(Arc::clone(&self.backend), self.filter.clone())
            .with_parallelism(self.parallelism)
            .with_span(self.span.clone())
    }

    fn discover_source(
        &self,
        source: &PluginSource,
        report: &mut DiscoveryReport,
    ) -> crate::Result<Vec<EntryPoint>> {
        match &source.origin {
            Origin::Archives(root) => {
                tracing::info!("Discovering package archives under {}", root.display());
                let extracted = PackageExtractor::new(self.host.clone(), self.filter.clone())
                    .with_policy(source.policy)
                    .with_span(self.span.clone())
                    .extract_all(root)?;
                report.archives_extracted += extracted.packages.len();
                report.packages_without_payload += extracted.without_payload.len();
                report.archives_failed += extracted.failed.len();

                let loaded = self.loader().load(&extracted.directories())?;
                Self::collect(loaded, FailurePolicy::FailSoft, report)
            }
            Origin::Modules(root) => {
                tracing::info!("Discovering modules under {}", root.display());
                let loaded = self.loader().load(&[root.clone()])?;
                Self::collect(loaded, source.policy, report)
            }
            &Origin::InProcess(declaration) => {
                tracing::info!("Discovering in-process module {}", declaration.module_name);
                let handle = ModuleHandle::from_static(
                    format!("<in-process>/{}", declaration.module_name),
                    declaration,
                );
                match handle {
                    Ok(handle) => {
                        report.modules_loaded += 1;
                        match EntryPoint::new(handle) {
                            Some(entry) => Ok(vec![entry]),
                            None => {
                                report.modules_without_entry += 1;
                                Ok(Vec::new())
                            }
                        }
                    }
                    Err(err) if source.policy == FailurePolicy::FailSoft => {
                        tracing::error!("Skipping in-process module: {}", err);
                        report.modules_failed += 1;
                        Ok(Vec::new())
                    }
                    Err(err) => Err(err.into()),
                }
            }
        }
    }

    fn collect(
        loaded: LoadReport,
        policy: FailurePolicy,
        report: &mut DiscoveryReport,
    ) -> Result<Vec<EntryPoint>, PorticoError> {
        report.modules_failed += loaded.failures.len();
        report.modules_without_entry += loaded.without_entry.len();
        if policy == FailurePolicy::FailFast {
            if let Some(failure) = loaded.failures.into_iter().next() {
                return Err(failure.error.into());
            }
        }
        report.modules_loaded += loaded.entries.len();
        Ok(loaded.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::CatalogBackend;
    use portico_api::{HostEnvironment, ServiceResult, WebApplication};
    use portico_plugin::{BoxError, EndpointDefinition, ExportedType, FromServices};
    use std::fs;
    use tempfile::tempdir;

    struct Ping;

    impl EndpointDefinition for Ping {
        fn define_endpoints(
            &self,
            app: &mut WebApplication,
            _env: &HostEnvironment,
        ) -> Result<(), BoxError> {
            app.map_get("/ping", || async { "pong" });
            Ok(())
        }
    }

    impl FromServices for Ping {
        fn from_services(_services: &ServiceCollection) -> ServiceResult<Self> {
            Ok(Ping)
        }
    }

    const PING_EXPORTS: &[ExportedType] = &[
        ExportedType::marker("Program"),
        ExportedType::definition::<Ping>("Ping"),
    ];
    static PING: ModuleDeclaration = ModuleDeclaration::new("ping", PING_EXPORTS);

    fn pipeline() -> PluginPipeline {
        PluginPipeline::new(Arc::new(CatalogBackend::new().with_module(&PING)))
            .with_module_filter(ModuleFilter::new(["pmod"]))
            .with_parallelism(2)
    }

    #[test]
    fn test_missing_root_fails_before_discovery() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline()
            .with_source(PluginSource::in_process(&PING))
            .with_source(PluginSource::modules(dir.path().join("absent")));
        assert!(matches!(
            pipeline.discover(),
            Err(PorticoError::Configuration(ConfigurationError::PluginRootNotFound(_)))
        ));
    }

    #[test]
    fn test_sources_are_discovered_in_order() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("ping.pmod"),
            CatalogBackend::manifest_contents("ping"),
        )
        .unwrap();

        let discovery = pipeline()
            .with_source(PluginSource::in_process(&PING))
            .with_source(PluginSource::modules(dir.path()))
            .discover()
            .unwrap();
        assert_eq!(discovery.report.definitions, vec!["Ping", "Ping"]);
        assert_eq!(discovery.report.modules_loaded, 2);
        assert_eq!(discovery.definitions[0].module().path(), Path::new("<in-process>/ping"));
    }

    #[test]
    fn test_module_policy_controls_failures() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bad.pmod"), b"garbage").unwrap();
        fs::write(
            dir.path().join("good.pmod"),
            CatalogBackend::manifest_contents("ping"),
        )
        .unwrap();

        let soft = pipeline()
            .with_source(PluginSource::modules(dir.path()))
            .discover()
            .unwrap();
        assert_eq!(soft.report.modules_failed, 1);
        assert_eq!(soft.report.definitions, vec!["Ping"]);

        let strict = pipeline()
            .with_source(PluginSource::modules(dir.path()).with_policy(FailurePolicy::FailFast))
            .discover();
        assert!(matches!(strict, Err(PorticoError::ModuleLoad(_))));
    }

    #[test]
    fn test_register_publishes_one_registry_for_all_sources() {
        let mut services = ServiceCollection::new();
        let (registry, report) = pipeline()
            .with_source(PluginSource::in_process(&PING))
            .register(&mut services)
            .unwrap();
        assert_eq!(registry.names(), vec!["Ping"]);
        assert_eq!(report.definitions, vec!["Ping"]);
        assert!(services.contains::<EndpointRegistry>());
    }
}
