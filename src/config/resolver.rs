//! The resolution pipeline: discover, load, merge, override.

use super::discover::{SourceDescriptor, discover_sources};
use super::loader::{LoadContext, load_source};
use super::merge::deep_merge_all;
use super::overrides::{Overrides, apply_overrides};
use super::settings::ResolverSettings;
use super::tree::ConfigTree;
use crate::error::{ConfigError, Result};
use std::path::PathBuf;
use tracing::{debug, info};

/// Output of one resolution pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub tree: ConfigTree,
    /// Files that contributed, in merge order
    pub sources: Vec<PathBuf>,
}

/// Runs the full pipeline for a fixed set of settings and overrides.
#[derive(Debug, Clone)]
pub struct Resolver {
    settings: ResolverSettings,
    overrides: Overrides,
}

impl Resolver {
    pub fn new(settings: ResolverSettings, overrides: Overrides) -> Self {
        Self {
            settings,
            overrides,
        }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    /// Sources the next pass would load, in merge order.
    pub fn sources(&self) -> Vec<SourceDescriptor> {
        discover_sources(
            &self.settings.config_dir,
            &self.settings.env_tag,
            self.settings.explicit_file.as_deref(),
        )
    }

    /// Run one resolution pass.
    ///
    /// Every file-level failure is returned as-is; the only condition recovered
    /// silently is an unreadable config directory.
    pub fn resolve(&self) -> Result<Resolution> {
        let ctx = LoadContext::new(self.settings.env_tag.clone());
        let mut trees = Vec::new();
        let mut sources = Vec::new();

        for source in self.sources() {
            let Some(tree) = load_source(&source, &ctx)? else {
                continue;
            };
            if !tree.is_object() {
                return Err(ConfigError::parse(
                    &source.location,
                    "top-level value must be a mapping",
                ));
            }
            debug!(
                "Loaded source #{} {} ({})",
                source.priority,
                source.location.display(),
                source.format
            );
            trees.push(tree);
            sources.push(source.location);
        }

        let mut tree = deep_merge_all(trees);
        let applied = apply_overrides(&mut tree, &self.overrides);

        info!(
            "Resolved configuration for '{}' from {} file(s), {} override(s) applied",
            self.settings.env_tag,
            sources.len(),
            applied
        );
        Ok(Resolution { tree, sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_env_file_overrides_default() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("default.toml"),
            "[server]\nport = 8080\nhost = \"localhost\"\n",
        )
        .unwrap();
        std::fs::write(temp.path().join("staging.json"), r#"{"server": {"port": 81}}"#).unwrap();

        let settings = ResolverSettings::with_dir(temp.path()).env_tag("staging");
        let resolution = Resolver::new(settings, Overrides::new()).resolve().unwrap();
        assert_eq!(
            resolution.tree,
            json!({"server": {"port": 81, "host": "localhost"}})
        );
        assert_eq!(resolution.sources.len(), 2);
    }

    #[test]
    fn test_no_sources_is_empty_mapping() {
        let temp = TempDir::new().unwrap();
        let settings = ResolverSettings::with_dir(temp.path().join("nope"));
        let resolution = Resolver::new(settings, Overrides::new()).resolve().unwrap();
        assert_eq!(resolution.tree, json!({}));
        assert!(resolution.sources.is_empty());
    }

    #[test]
    fn test_missing_explicit_file_is_fatal() {
        let temp = TempDir::new().unwrap();
        let settings =
            ResolverSettings::with_dir(temp.path()).explicit_file(temp.path().join("x.toml"));
        let err = Resolver::new(settings, Overrides::new()).resolve().unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingFile);
    }

    #[test]
    fn test_top_level_sequence_rejected() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("default.json"), "[1, 2]").unwrap();
        let settings = ResolverSettings::with_dir(temp.path());
        let err = Resolver::new(settings, Overrides::new()).resolve().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
    }
}
