use super::backend::ModuleBackend;
use super::filter::ModuleFilter;
use super::handle::ModuleHandle;
use crate::error::{ModuleLoadError, PorticoError};
use portico_plugin::ExportedType;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Span;

/// A loaded module that exposes the entry marker.
#[derive(Debug, Clone)]
pub struct EntryPoint {
    module: Arc<ModuleHandle>,
    entry_index: usize,
}

impl EntryPoint {
    /// `None` when the module has no entry export.
    pub fn new(module: ModuleHandle) -> Option<Self> {
        let entry_index = module.declaration().entry_index()?;
        Some(Self {
            module: Arc::new(module),
            entry_index,
        })
    }

    pub fn module(&self) -> &Arc<ModuleHandle> {
        &self.module
    }

    pub fn entry(&self) -> &ExportedType {
        &self.module.exports()[self.entry_index]
    }
}

#[derive(Debug)]
pub struct ModuleFailure {
    pub path: PathBuf,
    pub error: ModuleLoadError,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    /// Modules with an entry export, in input order.
    pub entries: Vec<EntryPoint>,
    pub failures: Vec<ModuleFailure>,
    /// Files that loaded but declare no module or no entry export; already
    /// released.
    pub without_entry: Vec<PathBuf>,
}

/// Loads module files concurrently on a dedicated pool.
pub struct ModuleLoader {
    backend: Arc<dyn ModuleBackend>,
    filter: ModuleFilter,
    parallelism: usize,
    span: Span,
}

/// Worker count for loading: all cores but one, at least one.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

impl ModuleLoader {
    pub fn new(backend: Arc<dyn ModuleBackend>, filter: ModuleFilter) -> Self {
        Self {
            backend,
            filter,
            parallelism: default_parallelism(),
            span: Span::none(),
        }
    }

    pub fn with_parallelism(mut self, threads: usize) -> Self {
        self.parallelism = threads.max(1);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Flatten directories (non-recursive) and files into the module files to
    /// load. Each directory's files are sorted; unreadable directories are
    /// reported as failures.
    pub fn collect_module_files(&self, inputs: &[PathBuf]) -> (Vec<PathBuf>, Vec<ModuleFailure>) {
        let mut files = Vec::new();
        let mut failures = Vec::new();
        for input in inputs {
            if input.is_dir() {
                match list_directory(input) {
                    Ok(mut listed) => {
                        listed.retain(|path| path.is_file() && self.filter.accepts(path));
                        listed.sort();
                        files.extend(listed);
                    }
                    Err(source) => {
                        tracing::error!("Failed to list modules in {}: {}", input.display(), source);
                        failures.push(ModuleFailure {
                            path: input.clone(),
                            error: ModuleLoadError::Io {
                                path: input.clone(),
                                source,
                            },
                        });
                    }
                }
            } else if self.filter.accepts(input) {
                files.push(input.clone());
            }
        }
        (files, failures)
    }

    pub fn load(&self, inputs: &[PathBuf]) -> crate::Result<LoadReport> {
        let _enter = self.span.enter();
        let (files, failures) = self.collect_module_files(inputs);
        tracing::info!(
            "Loading {} module(s) with the {} backend on {} thread(s)",
            files.len(),
            self.backend.name(),
            self.parallelism
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallelism)
            .thread_name(|i| format!("portico-loader-{i}"))
            .build()
            .map_err(|e| PorticoError::WorkerPool(e.to_string()))?;

        let loaded: Vec<(PathBuf, Result<Option<ModuleHandle>, ModuleLoadError>)> = pool.install(|| {
            files
                .par_iter()
                .map(|path| {
                    let _enter = self.span.enter();
                    (path.clone(), self.backend.open(path))
                })
                .collect()
        });

        let mut report = LoadReport {
            failures,
            ..Default::default()
        };
        for (path, result) in loaded {
            match result {
                Ok(None) => {
                    tracing::debug!("{} declares no module, released", path.display());
                    report.without_entry.push(path);
                }
                Ok(Some(handle)) => match EntryPoint::new(handle) {
                    Some(entry) => {
                        tracing::debug!(
                            "Loaded module {} from {}",
                            entry.module().module_name(),
                            path.display()
                        );
                        report.entries.push(entry);
                    }
                    None => {
                        tracing::debug!("Module {} has no entry export, released", path.display());
                        report.without_entry.push(path);
                    }
                },
                Err(error) => {
                    tracing::error!("Failed to load module {}: {}", path.display(), error);
                    report.failures.push(ModuleFailure { path, error });
                }
            }
        }

        tracing::info!(
            "Loaded {} module(s), {} failed, {} without entry",
            report.entries.len(),
            report.failures.len(),
            report.without_entry.len()
        );
        Ok(report)
    }
}

fn list_directory(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect()
}
