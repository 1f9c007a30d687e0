//! Host configuration: `appsettings.json`, then `PORTICO_*` environment
//! variables, then explicit overrides (command line), later layers winning.

use crate::error::ConfigurationError;
use crate::module::ModuleFilter;
use crate::package::{HostRuntime, RuntimeTarget};
use portico_api::{EnvironmentName, HostEnvironment};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_SETTINGS_FILE: &str = "appsettings.json";
pub const DEFAULT_PROTOCOL: &str = "http";
pub const DEFAULT_DOMAIN: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_APPLICATION_NAME: &str = "portico";
pub const ENV_PREFIX: &str = "PORTICO_";

/// A port given either as a JSON number or as a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PortSetting {
    Number(u16),
    Text(String),
}

/// One configuration layer. Unset keys fall through to earlier layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RawSettings {
    pub plugin_path: Option<PathBuf>,
    pub protocol: Option<String>,
    pub domain: Option<String>,
    pub port: Option<PortSetting>,
    pub environment: Option<String>,
    pub minimum_runtime: Option<String>,
    pub module_extensions: Option<Vec<String>>,
    pub application_name: Option<String>,
}

impl RawSettings {
    /// Overlay `other` on top of `self`.
    pub fn merge(&mut self, other: RawSettings) {
        macro_rules! overlay {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field;
                })*
            };
        }
        overlay!(
            plugin_path,
            protocol,
            domain,
            port,
            environment,
            minimum_runtime,
            module_extensions,
            application_name
        );
    }

    /// Read `PORTICO_*` variables. Underscores after the prefix are ignored, so
    /// `PORTICO_PLUGIN_PATH` and `PORTICO_PLUGINPATH` both set `PluginPath`.
    pub fn from_environment<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut settings = Self::default();
        for (key, value) in vars {
            let key = key.as_ref().to_ascii_uppercase();
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value: String = value.into();
            if value.is_empty() {
                continue;
            }
            match name.replace('_', "").as_str() {
                "PLUGINPATH" => settings.plugin_path = Some(PathBuf::from(value)),
                "PROTOCOL" => settings.protocol = Some(value),
                "DOMAIN" => settings.domain = Some(value),
                "PORT" => settings.port = Some(PortSetting::Text(value)),
                "ENVIRONMENT" => settings.environment = Some(value),
                "MINIMUMRUNTIME" => settings.minimum_runtime = Some(value),
                "MODULEEXTENSIONS" => {
                    settings.module_extensions =
                        Some(value.split(',').map(|ext| ext.trim().to_string()).collect())
                }
                "APPLICATIONNAME" => settings.application_name = Some(value),
                _ => {}
            }
        }
        settings
    }
}

/// Collects configuration layers in order and resolves them into a [`HostConfig`].
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    settings: RawSettings,
    content_root: Option<PathBuf>,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer a JSON settings file. The file's directory becomes the content root.
    pub fn with_json_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let layer: RawSettings =
            serde_json::from_str(&text).map_err(|source| ConfigurationError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!("Loaded settings from {}", path.display());
        self.settings.merge(layer);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.content_root = Some(parent.to_path_buf());
        }
        Ok(self)
    }

    /// Like [`with_json_file`](Self::with_json_file), but a missing file is skipped.
    pub fn with_optional_json_file(self, path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        if path.as_ref().is_file() {
            self.with_json_file(path)
        } else {
            Ok(self)
        }
    }

    pub fn with_environment<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        self.settings.merge(RawSettings::from_environment(vars));
        self
    }

    /// Layer the current process environment.
    pub fn with_process_environment(self) -> Self {
        self.with_environment(std::env::vars())
    }

    pub fn with_overrides(mut self, overrides: RawSettings) -> Self {
        self.settings.merge(overrides);
        self
    }

    pub fn with_content_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.content_root = Some(root.into());
        self
    }

    pub fn build(self) -> Result<HostConfig, ConfigurationError> {
        let settings = self.settings;
        let content_root = self
            .content_root
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let plugin_path = settings
            .plugin_path
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or(ConfigurationError::MissingPluginPath)?;
        let plugin_path = if plugin_path.is_relative() {
            content_root.join(plugin_path)
        } else {
            plugin_path
        };

        let protocol = settings
            .protocol
            .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string())
            .to_ascii_lowercase();
        if protocol != DEFAULT_PROTOCOL {
            return Err(ConfigurationError::InvalidValue {
                key: "Protocol",
                value: protocol,
            });
        }

        let port = match settings.port {
            None => DEFAULT_PORT,
            Some(PortSetting::Number(port)) => port,
            Some(PortSetting::Text(text)) => {
                text.trim()
                    .parse()
                    .map_err(|_| ConfigurationError::InvalidValue {
                        key: "Port",
                        value: text,
                    })?
            }
        };

        let host_runtime = match settings.minimum_runtime {
            None => HostRuntime::current(),
            Some(moniker) => {
                let minimum: RuntimeTarget =
                    moniker
                        .parse()
                        .map_err(|_| ConfigurationError::InvalidValue {
                            key: "MinimumRuntime",
                            value: moniker.clone(),
                        })?;
                HostRuntime::current().with_minimum(&minimum)
            }
        };

        let module_filter = match settings.module_extensions {
            Some(extensions) if extensions.iter().any(|ext| !ext.trim().is_empty()) => {
                ModuleFilter::new(extensions)
            }
            Some(extensions) => {
                return Err(ConfigurationError::InvalidValue {
                    key: "ModuleExtensions",
                    value: extensions.join(","),
                });
            }
            None => ModuleFilter::platform_default(),
        };

        Ok(HostConfig {
            plugin_path,
            protocol,
            domain: settings
                .domain
                .unwrap_or_else(|| DEFAULT_DOMAIN.to_string()),
            port,
            environment: settings
                .environment
                .map(EnvironmentName::from)
                .unwrap_or_default(),
            host_runtime,
            module_filter,
            application_name: settings
                .application_name
                .unwrap_or_else(|| DEFAULT_APPLICATION_NAME.to_string()),
            content_root,
        })
    }
}

/// Resolved host configuration.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub plugin_path: PathBuf,
    pub protocol: String,
    pub domain: String,
    pub port: u16,
    pub environment: EnvironmentName,
    pub host_runtime: HostRuntime,
    pub module_filter: ModuleFilter,
    pub application_name: String,
    pub content_root: PathBuf,
}

impl HostConfig {
    /// Resolve defaults only: the plugin root is the single required key.
    pub fn with_plugin_path(plugin_path: impl Into<PathBuf>) -> Result<Self, ConfigurationError> {
        SettingsBuilder::new()
            .with_overrides(RawSettings {
                plugin_path: Some(plugin_path.into()),
                ..Default::default()
            })
            .build()
    }

    /// `domain:port`, suitable for binding a listener.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.domain, self.port)
    }

    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.domain, self.port)
    }

    pub fn host_environment(&self) -> HostEnvironment {
        HostEnvironment::new(
            self.application_name.clone(),
            self.environment.clone(),
            self.content_root.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_missing_plugin_path_is_rejected() {
        let err = SettingsBuilder::new().build().unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingPluginPath));
    }

    #[test]
    fn test_defaults_apply() {
        let config = HostConfig::with_plugin_path("/srv/plugins").unwrap();
        assert_eq!(config.plugin_path, PathBuf::from("/srv/plugins"));
        assert_eq!(config.protocol, "http");
        assert_eq!(config.domain, "localhost");
        assert_eq!(config.port, 5000);
        assert_eq!(config.environment, EnvironmentName::Production);
        assert_eq!(config.application_name, "portico");
        assert_eq!(config.host_runtime, HostRuntime::current());
        assert_eq!(config.url(), "http://localhost:5000");
    }

    #[test]
    fn test_environment_and_overrides_win_over_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("appsettings.json");
        fs::write(
            &file,
            r#"{ "PluginPath": "plugins", "Port": 7000, "Domain": "0.0.0.0", "Environment": "Staging" }"#,
        )
        .unwrap();

        let config = SettingsBuilder::new()
            .with_json_file(&file)
            .unwrap()
            .with_environment([
                ("PORTICO_PORT", "7100"),
                ("PORTICO_ENVIRONMENT", "Development"),
                ("PORTICO_LOG_DIR", "/tmp/ignored"),
                ("OTHER_PORT", "1"),
            ])
            .with_overrides(RawSettings {
                port: Some(PortSetting::Number(7200)),
                ..Default::default()
            })
            .build()
            .unwrap();

        assert_eq!(config.plugin_path, dir.path().join("plugins"));
        assert_eq!(config.content_root, dir.path());
        assert_eq!(config.domain, "0.0.0.0");
        assert_eq!(config.port, 7200);
        assert_eq!(config.environment, EnvironmentName::Development);
    }

    #[test]
    fn test_environment_keys_ignore_underscores() {
        let settings = RawSettings::from_environment([
            ("PORTICO_PLUGIN_PATH", "/a"),
            ("portico_module_extensions", "so, pmod"),
        ]);
        assert_eq!(settings.plugin_path, Some(PathBuf::from("/a")));
        assert_eq!(
            settings.module_extensions,
            Some(vec!["so".to_string(), "pmod".to_string()])
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let base = || RawSettings {
            plugin_path: Some(PathBuf::from("/srv/plugins")),
            ..Default::default()
        };

        let err = SettingsBuilder::new()
            .with_overrides(RawSettings {
                protocol: Some("https".into()),
                ..base()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { key: "Protocol", .. }));

        let err = SettingsBuilder::new()
            .with_overrides(RawSettings {
                port: Some(PortSetting::Text("eighty".into())),
                ..base()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { key: "Port", .. }));

        let err = SettingsBuilder::new()
            .with_overrides(RawSettings {
                minimum_runtime: Some("0.1".into()),
                ..base()
            })
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::InvalidValue { key: "MinimumRuntime", .. }
        ));
    }

    #[test]
    fn test_malformed_file_reports_parse_error() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("appsettings.json");
        fs::write(&file, "{ not json").unwrap();
        let err = SettingsBuilder::new().with_json_file(&file).unwrap_err();
        assert!(matches!(err, ConfigurationError::Parse { .. }));

        let builder = SettingsBuilder::new()
            .with_optional_json_file(dir.path().join("missing.json"))
            .unwrap();
        assert!(matches!(
            builder.build().unwrap_err(),
            ConfigurationError::MissingPluginPath
        ));
    }
}
