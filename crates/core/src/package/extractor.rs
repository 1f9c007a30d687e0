use super::target::{HostRuntime, PayloadGroup, RuntimeTarget};
use crate::error::{ConfigurationError, ExtractionError};
use crate::module::ModuleFilter;
use crate::pipeline::FailurePolicy;
use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};
use tracing::Span;
use zip::ZipArchive;

/// Extension of package archives placed directly under the plugin root.
pub const PACKAGE_EXTENSION: &str = "ppkg";

/// Top-level archive directory holding one sub-directory per runtime target.
pub const PAYLOAD_ROOT: &str = "lib";

/// Result of extracting one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPackage {
    pub archive: PathBuf,
    pub directory: PathBuf,
    pub target: RuntimeTarget,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ExtractionReport {
    /// Extracted packages, in archive path order.
    pub packages: Vec<ExtractedPackage>,
    /// Archives without a payload compatible with the host.
    pub without_payload: Vec<PathBuf>,
    /// Archives skipped under [`FailurePolicy::FailSoft`].
    pub failed: Vec<(PathBuf, ExtractionError)>,
}

impl ExtractionReport {
    /// Directories to hand to the module loader.
    pub fn directories(&self) -> Vec<PathBuf> {
        self.packages
            .iter()
            .map(|package| package.directory.clone())
            .collect()
    }
}

enum Outcome {
    Extracted(ExtractedPackage),
    NoPayload,
    Failed(ExtractionError),
}

/// Unpacks the best-matching binary payload of each package archive into a
/// per-package directory next to the archive.
pub struct PackageExtractor {
    host: HostRuntime,
    filter: ModuleFilter,
    policy: FailurePolicy,
    span: Span,
}

impl PackageExtractor {
    pub fn new(host: HostRuntime, filter: ModuleFilter) -> Self {
        Self {
            host,
            filter,
            policy: FailurePolicy::FailFast,
            span: Span::none(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Package archives directly under `root`, sorted by path.
    pub fn find_packages(root: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
        let list_error = |source| ExtractionError::List {
            path: root.to_path_buf(),
            source,
        };
        let mut packages = Vec::new();
        for entry in fs::read_dir(root).map_err(list_error)? {
            let path = entry.map_err(list_error)?.path();
            let is_package = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(PACKAGE_EXTENSION));
            if is_package && path.is_file() {
                packages.push(path);
            }
        }
        packages.sort();
        Ok(packages)
    }

    pub fn extract_all(&self, root: &Path) -> crate::Result<ExtractionReport> {
        let _enter = self.span.enter();
        if !root.is_dir() {
            return Err(ConfigurationError::PluginRootNotFound(root.to_path_buf()).into());
        }

        let archives = Self::find_packages(root)?;
        tracing::info!(
            "Found {} package(s) under {}",
            archives.len(),
            root.display()
        );

        let outcomes: DashMap<usize, Outcome> = DashMap::new();
        let fail_fast = self.policy == FailurePolicy::FailFast;

        let first_error = archives.par_iter().enumerate().try_for_each(|(index, archive)| {
            let _enter = self.span.enter();
            match self.extract_package(archive, root) {
                Ok(Some(package)) => {
                    outcomes.insert(index, Outcome::Extracted(package));
                    Ok(())
                }
                Ok(None) => {
                    outcomes.insert(index, Outcome::NoPayload);
                    Ok(())
                }
                Err(err) if fail_fast => {
                    tracing::error!("Failed to extract {}: {}", archive.display(), err);
                    Err(err)
                }
                Err(err) => {
                    tracing::error!("Skipping {}: {}", archive.display(), err);
                    outcomes.insert(index, Outcome::Failed(err));
                    Ok(())
                }
            }
        });
        first_error?;

        let mut ordered: Vec<(usize, Outcome)> = outcomes.into_iter().collect();
        ordered.sort_by_key(|(index, _)| *index);

        let mut report = ExtractionReport::default();
        for (index, outcome) in ordered {
            let archive = archives[index].clone();
            match outcome {
                Outcome::Extracted(package) => report.packages.push(package),
                Outcome::NoPayload => report.without_payload.push(archive),
                Outcome::Failed(err) => report.failed.push((archive, err)),
            }
        }

        tracing::info!(
            "Extracted {} package(s), {} without a compatible payload, {} failed",
            report.packages.len(),
            report.without_payload.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Extract the selected payload of one archive into `<root>/<archive stem>/`.
    ///
    /// Returns `Ok(None)` when no payload group is compatible with the host.
    pub fn extract_package(
        &self,
        archive_path: &Path,
        root: &Path,
    ) -> Result<Option<ExtractedPackage>, ExtractionError> {
        let archive_error = |source| ExtractionError::Archive {
            archive: archive_path.to_path_buf(),
            source,
        };
        let file = File::open(archive_path).map_err(|source| ExtractionError::Io {
            archive: archive_path.to_path_buf(),
            entry: String::new(),
            source,
        })?;
        let mut archive = ZipArchive::new(file).map_err(archive_error)?;

        let groups = read_payload_groups(&mut archive, &self.filter).map_err(archive_error)?;
        let Some(group) = self.host.select(&groups) else {
            tracing::warn!(
                "{} has no payload for {} (minimum {})",
                archive_path.display(),
                self.host.target(),
                self.host.minimum()
            );
            return Ok(None);
        };

        let stem = archive_path
            .file_stem()
            .map(|stem| stem.to_os_string())
            .unwrap_or_default();
        let directory = root.join(stem);
        let directory_error = |source| ExtractionError::Io {
            archive: archive_path.to_path_buf(),
            entry: String::new(),
            source,
        };
        // The directory holds only this run's selected payload.
        if directory.is_dir() {
            fs::remove_dir_all(&directory).map_err(directory_error)?;
        }
        fs::create_dir_all(&directory).map_err(directory_error)?;

        let mut files = Vec::with_capacity(group.entries.len());
        let mut seen = HashSet::with_capacity(group.entries.len());
        for entry_name in &group.entries {
            let entry_error = |source| ExtractionError::Io {
                archive: archive_path.to_path_buf(),
                entry: entry_name.clone(),
                source,
            };
            let Some(file_name) = entry_file_name(entry_name) else {
                continue;
            };
            if !seen.insert(file_name.to_ascii_lowercase()) {
                return Err(ExtractionError::DuplicateFileName {
                    archive: archive_path.to_path_buf(),
                    file_name: file_name.to_string(),
                });
            }
            let destination = directory.join(file_name);

            let mut entry = archive.by_name(entry_name).map_err(archive_error)?;
            let mut output = File::create(&destination).map_err(entry_error)?;
            io::copy(&mut entry, &mut output).map_err(entry_error)?;
            files.push(destination);
        }

        tracing::debug!(
            "Extracted {} file(s) for {} from {}",
            files.len(),
            group.target,
            archive_path.display()
        );

        Ok(Some(ExtractedPackage {
            archive: archive_path.to_path_buf(),
            directory,
            target: group.target.clone(),
            files,
        }))
    }
}

/// Group module entries under `lib/<target>/` by target, in archive order.
/// Nested directories inside a group are accepted and flattened on extraction.
pub fn read_payload_groups<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    filter: &ModuleFilter,
) -> zip::result::ZipResult<Vec<PayloadGroup>> {
    let mut groups: Vec<PayloadGroup> = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().replace('\\', "/");

        let mut parts = name.splitn(3, '/');
        let (Some(top), Some(moniker), Some(rest)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        if !top.eq_ignore_ascii_case(PAYLOAD_ROOT) || !filter.accepts(Path::new(rest)) {
            continue;
        }
        let Ok(target) = moniker.parse::<RuntimeTarget>() else {
            tracing::debug!("Ignoring entry {} with unknown target {}", name, moniker);
            continue;
        };

        match groups.iter_mut().find(|group| group.target == target) {
            Some(group) => group.entries.push(entry.name().to_string()),
            None => groups.push(PayloadGroup {
                target,
                entries: vec![entry.name().to_string()],
            }),
        }
    }
    Ok(groups)
}

fn entry_file_name(entry_name: &str) -> Option<&str> {
    entry_name
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
}
