//! Runtime targets carried by package payload groups, and the host's
//! closest-match selection policy.

use portico_plugin::CONTRACT_VERSION;
use std::fmt;
use std::str::FromStr;

/// Identifier of the runtime this host implements.
pub const RUNTIME_IDENTIFIER: &str = "portico";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuntimeVersion {
    pub major: u32,
    pub minor: u32,
}

impl RuntimeVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Major and minor of a crate version such as `0.1.0`.
    pub fn from_contract(version: &str) -> Option<Self> {
        let mut parts = version.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().map_or(Some(0), |part| part.parse().ok())?;
        Some(Self { major, minor })
    }
}

impl FromStr for RuntimeVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = match s.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (s, "0"),
        };
        let major = major
            .parse()
            .map_err(|_| format!("invalid major version in `{s}`"))?;
        let minor = minor
            .parse()
            .map_err(|_| format!("invalid minor version in `{s}`"))?;
        Ok(Self { major, minor })
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A target moniker such as `portico0.1`: identifier followed by version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuntimeTarget {
    identifier: String,
    version: RuntimeVersion,
}

impl RuntimeTarget {
    pub fn new(identifier: impl Into<String>, version: RuntimeVersion) -> Self {
        Self {
            identifier: identifier.into().to_ascii_lowercase(),
            version,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn version(&self) -> RuntimeVersion {
        self.version
    }
}

impl FromStr for RuntimeTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| format!("target `{s}` has no version"))?;
        let (identifier, version) = s.split_at(split);
        if identifier.is_empty() {
            return Err(format!("target `{s}` has no identifier"));
        }
        Ok(Self::new(identifier, version.parse()?))
    }
}

impl fmt::Display for RuntimeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.identifier, self.version)
    }
}

/// Binary entries of a package for one runtime target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadGroup {
    pub target: RuntimeTarget,
    /// Archive entry names, in archive order.
    pub entries: Vec<String>,
}

/// The runtime this process provides, and the oldest target it still accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRuntime {
    identifier: String,
    minimum: RuntimeVersion,
    current: RuntimeVersion,
}

impl HostRuntime {
    pub fn new(identifier: impl Into<String>, minimum: RuntimeVersion, current: RuntimeVersion) -> Self {
        Self {
            identifier: identifier.into().to_ascii_lowercase(),
            minimum,
            current,
        }
    }

    /// The runtime implemented by this build: the plugin contract's major.minor,
    /// accepting nothing older.
    pub fn current() -> Self {
        let current = RuntimeVersion::from_contract(CONTRACT_VERSION).unwrap_or_default();
        Self::new(RUNTIME_IDENTIFIER, current, current)
    }

    /// Take identifier and minimum version from a configured target moniker.
    pub fn with_minimum(mut self, minimum: &RuntimeTarget) -> Self {
        self.identifier = minimum.identifier().to_string();
        self.minimum = minimum.version();
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn minimum(&self) -> RuntimeVersion {
        self.minimum
    }

    pub fn current_version(&self) -> RuntimeVersion {
        self.current
    }

    /// Moniker of the runtime this host implements.
    pub fn target(&self) -> RuntimeTarget {
        RuntimeTarget::new(self.identifier.clone(), self.current)
    }

    pub fn accepts(&self, target: &RuntimeTarget) -> bool {
        target.identifier().eq_ignore_ascii_case(&self.identifier)
            && target.version() >= self.minimum
            && target.version() <= self.current
    }

    /// Closest compatible group: the lowest accepted version, first one on ties.
    pub fn select<'a>(&self, groups: &'a [PayloadGroup]) -> Option<&'a PayloadGroup> {
        groups
            .iter()
            .filter(|group| self.accepts(&group.target))
            .min_by_key(|group| group.target.version())
    }
}

impl Default for HostRuntime {
    fn default() -> Self {
        Self::current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(target: &str) -> PayloadGroup {
        PayloadGroup {
            target: target.parse().unwrap(),
            entries: vec![format!("lib/{target}/module.so")],
        }
    }

    fn host(minimum: (u32, u32), current: (u32, u32)) -> HostRuntime {
        HostRuntime::new(
            RUNTIME_IDENTIFIER,
            RuntimeVersion::new(minimum.0, minimum.1),
            RuntimeVersion::new(current.0, current.1),
        )
    }

    #[test]
    fn test_parse_target_moniker() {
        let target: RuntimeTarget = "Portico1.2".parse().unwrap();
        assert_eq!(target.identifier(), "portico");
        assert_eq!(target.version(), RuntimeVersion::new(1, 2));
        assert_eq!(target.to_string(), "portico1.2");

        let target: RuntimeTarget = "portico2".parse().unwrap();
        assert_eq!(target.version(), RuntimeVersion::new(2, 0));

        assert!("portico".parse::<RuntimeTarget>().is_err());
        assert!("1.0".parse::<RuntimeTarget>().is_err());
        assert!("portico1.x".parse::<RuntimeTarget>().is_err());
    }

    #[test]
    fn test_select_lowest_qualifying_version() {
        let groups = vec![group("portico1.4"), group("portico1.1"), group("portico1.2")];
        let selected = host((1, 1), (1, 4)).select(&groups).unwrap();
        assert_eq!(selected.target.to_string(), "portico1.1");
    }

    #[test]
    fn test_select_none_below_minimum() {
        let groups = vec![group("portico0.9"), group("portico1.0")];
        assert!(host((1, 1), (1, 4)).select(&groups).is_none());
    }

    #[test]
    fn test_select_skips_newer_and_foreign_targets() {
        let groups = vec![group("portico2.0"), group("other1.2"), group("portico1.3")];
        let selected = host((1, 0), (1, 4)).select(&groups).unwrap();
        assert_eq!(selected.target.to_string(), "portico1.3");
    }

    #[test]
    fn test_current_host_accepts_its_own_target() {
        let host = HostRuntime::current();
        assert!(host.accepts(&host.target()));
        assert_eq!(
            RuntimeVersion::from_contract("3.7.1"),
            Some(RuntimeVersion::new(3, 7))
        );
    }
}
