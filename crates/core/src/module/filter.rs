use std::path::Path;

/// Which files count as plugin modules, by extension (ASCII case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleFilter {
    extensions: Vec<String>,
}

impl ModuleFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { extensions }
    }

    /// The dynamic library extension of the target platform (`so`, `dylib`, `dll`).
    pub fn platform_default() -> Self {
        Self::new([std::env::consts::DLL_EXTENSION])
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
    }
}

impl Default for ModuleFilter {
    fn default() -> Self {
        Self::platform_default()
    }
}
