//! Settings of the resolver itself.
//!
//! ## Environment Variables
//! - `LAYERCONF_DIR` - Config directory (default: `./config`)
//! - `LAYERCONF_ENV` - Environment tag (default: `development`)
//! - `LAYERCONF_FILE` - Explicit config file, loaded last
//! - `LAYERCONF_DISABLE` - Any truthy value disables resolution entirely

use super::overrides::coerce_bool;
use std::collections::HashMap;
use std::path::PathBuf;

pub const DIR_VAR: &str = "LAYERCONF_DIR";
pub const ENV_VAR: &str = "LAYERCONF_ENV";
pub const FILE_VAR: &str = "LAYERCONF_FILE";
pub const DISABLE_VAR: &str = "LAYERCONF_DISABLE";

pub const DEFAULT_CONFIG_DIR: &str = "config";
pub const DEFAULT_ENV_TAG: &str = "development";

/// Where to look for configuration and which environment to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverSettings {
    /// Directory scanned for `default.*` and `<env>.*`
    pub config_dir: PathBuf,
    /// Normalized environment tag
    pub env_tag: String,
    /// File loaded after the directory sources
    pub explicit_file: Option<PathBuf>,
    /// When set, nothing is resolved and an empty tree is published
    pub disabled: bool,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from_vars(std::iter::empty())
    }
}

impl ResolverSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Read settings from an explicit set of variables.
    ///
    /// Empty values count as unset.
    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .collect();

        Self {
            config_dir: vars
                .get(DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR)),
            env_tag: normalize_env_tag(vars.get(ENV_VAR).map(String::as_str).unwrap_or("")),
            explicit_file: vars.get(FILE_VAR).map(PathBuf::from),
            disabled: vars.get(DISABLE_VAR).is_some_and(|v| coerce_bool(v)),
        }
    }

    /// Defaults, with an explicit config directory.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn env_tag(mut self, tag: &str) -> Self {
        self.env_tag = normalize_env_tag(tag);
        self
    }

    pub fn explicit_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_file = Some(path.into());
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

/// Lower-case the tag and keep only `[0-9a-z_-]`; empty becomes `development`.
pub fn normalize_env_tag(raw: &str) -> String {
    let tag: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_digit() || c.is_ascii_lowercase() || *c == '_' || *c == '-')
        .collect();
    if tag.is_empty() {
        DEFAULT_ENV_TAG.to_string()
    } else {
        tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let settings = ResolverSettings::from_vars(vars(&[]));
        assert_eq!(settings.config_dir, PathBuf::from("config"));
        assert_eq!(settings.env_tag, "development");
        assert_eq!(settings.explicit_file, None);
        assert!(!settings.disabled);
    }

    #[test]
    fn test_from_vars() {
        let settings = ResolverSettings::from_vars(vars(&[
            (DIR_VAR, "/etc/app"),
            (ENV_VAR, "Production"),
            (FILE_VAR, "/tmp/extra.toml"),
            (DISABLE_VAR, "no"),
        ]));
        assert_eq!(settings.config_dir, PathBuf::from("/etc/app"));
        assert_eq!(settings.env_tag, "production");
        assert_eq!(settings.explicit_file, Some(PathBuf::from("/tmp/extra.toml")));
        assert!(!settings.disabled);
    }

    #[test]
    fn test_disable_switch() {
        assert!(ResolverSettings::from_vars(vars(&[(DISABLE_VAR, "1")])).disabled);
        assert!(ResolverSettings::from_vars(vars(&[(DISABLE_VAR, "true")])).disabled);
        assert!(!ResolverSettings::from_vars(vars(&[(DISABLE_VAR, "0")])).disabled);
        assert!(!ResolverSettings::from_vars(vars(&[(DISABLE_VAR, "")])).disabled);
    }

    #[test]
    fn test_normalize_env_tag() {
        assert_eq!(normalize_env_tag("Staging-EU_1"), "staging-eu_1");
        assert_eq!(normalize_env_tag("prod/../../etc"), "prodetc");
        assert_eq!(normalize_env_tag("  "), "development");
        assert_eq!(normalize_env_tag("ünïcode"), "ncode");
    }

    #[test]
    fn test_builders() {
        let settings = ResolverSettings::with_dir("/srv/conf")
            .env_tag("QA")
            .explicit_file("local.toml")
            .disabled(true);
        assert_eq!(settings.config_dir, PathBuf::from("/srv/conf"));
        assert_eq!(settings.env_tag, "qa");
        assert_eq!(settings.explicit_file, Some(PathBuf::from("local.toml")));
        assert!(settings.disabled);
    }
}
