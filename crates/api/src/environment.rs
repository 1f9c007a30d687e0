use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Name of the hosting environment. Comparison is ASCII case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EnvironmentName {
    Development,
    Staging,
    Production,
    Custom(String),
}

impl EnvironmentName {
    pub fn as_str(&self) -> &str {
        match self {
            EnvironmentName::Development => "Development",
            EnvironmentName::Staging => "Staging",
            EnvironmentName::Production => "Production",
            EnvironmentName::Custom(name) => name,
        }
    }
}

impl Default for EnvironmentName {
    fn default() -> Self {
        EnvironmentName::Production
    }
}

impl PartialEq for EnvironmentName {
    fn eq(&self, other: &Self) -> bool {
        self.as_str().eq_ignore_ascii_case(other.as_str())
    }
}

impl Eq for EnvironmentName {}

impl From<&str> for EnvironmentName {
    fn from(value: &str) -> Self {
        let value = value.trim();
        if value.eq_ignore_ascii_case("development") {
            EnvironmentName::Development
        } else if value.eq_ignore_ascii_case("staging") {
            EnvironmentName::Staging
        } else if value.eq_ignore_ascii_case("production") {
            EnvironmentName::Production
        } else {
            EnvironmentName::Custom(value.to_string())
        }
    }
}

impl From<String> for EnvironmentName {
    fn from(value: String) -> Self {
        EnvironmentName::from(value.as_str())
    }
}

impl From<EnvironmentName> for String {
    fn from(value: EnvironmentName) -> Self {
        value.as_str().to_string()
    }
}

impl FromStr for EnvironmentName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(EnvironmentName::from(s))
    }
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only description of where and how the host is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEnvironment {
    application_name: String,
    environment: EnvironmentName,
    content_root: PathBuf,
}

impl HostEnvironment {
    pub fn new(
        application_name: impl Into<String>,
        environment: EnvironmentName,
        content_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            application_name: application_name.into(),
            environment,
            content_root: content_root.into(),
        }
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    pub fn environment(&self) -> &EnvironmentName {
        &self.environment
    }

    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    pub fn is_development(&self) -> bool {
        self.environment == EnvironmentName::Development
    }

    pub fn is_staging(&self) -> bool {
        self.environment == EnvironmentName::Staging
    }

    pub fn is_production(&self) -> bool {
        self.environment == EnvironmentName::Production
    }

    pub fn is_environment(&self, name: &str) -> bool {
        self.environment.as_str().eq_ignore_ascii_case(name)
    }
}
