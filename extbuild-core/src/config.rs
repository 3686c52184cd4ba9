// Process-wide build configuration, read once at the command boundary

/// Environment variable that replaces the standard extension suffix
pub const EXT_SUFFIX_ENV: &str = "EXTBUILD_EXT_SUFFIX";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildConfig {
    /// Suffix forced onto every non-stable-ABI extension
    pub override_suffix: Option<String>,
}

impl BuildConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // An empty value behaves like an unset one
        let override_suffix = lookup(EXT_SUFFIX_ENV).filter(|suffix| !suffix.is_empty());

        if let Some(suffix) = &override_suffix {
            log::info!("{} override active: {}", EXT_SUFFIX_ENV, suffix);
        }

        Self { override_suffix }
    }

    pub fn with_override_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.override_suffix = Some(suffix.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_in(vars: HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> {
        move |key: &str| vars.get(key).map(|v| v.to_string())
    }

    #[test]
    fn test_override_read() {
        let config = BuildConfig::from_lookup(lookup_in(HashMap::from([(
            EXT_SUFFIX_ENV,
            ".test-suffix",
        )])));
        assert_eq!(config.override_suffix.as_deref(), Some(".test-suffix"));
    }

    #[test]
    fn test_unset_and_empty() {
        assert_eq!(
            BuildConfig::from_lookup(lookup_in(HashMap::new())),
            BuildConfig::default()
        );
        assert_eq!(
            BuildConfig::from_lookup(lookup_in(HashMap::from([(EXT_SUFFIX_ENV, "")]))),
            BuildConfig::default()
        );
    }

    #[test]
    fn test_with_override_suffix() {
        let config = BuildConfig::default().with_override_suffix(".x");
        assert_eq!(config.override_suffix.as_deref(), Some(".x"));
    }
}
