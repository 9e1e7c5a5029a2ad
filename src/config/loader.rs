//! File loading with format dispatch.
//!
//! Turns one path into a parsed tree. Structured text goes through include
//! expansion, JSON and YAML are parsed directly, and scripts run in the
//! sandbox from [`super::script`].

use super::discover::{SourceDescriptor, SourceFormat};
use super::include::{self, MAX_INCLUDE_DEPTH};
use super::script;
use super::tree::{ConfigTree, empty_tree};
use crate::error::{ConfigError, Result};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// State carried through one (possibly recursive) load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadContext {
    /// Normalized environment tag, substituted for `{env}` in include paths
    pub env_tag: String,
    /// Include nesting depth; top-level sources load at 0
    pub depth: usize,
}

impl LoadContext {
    pub fn new(env_tag: impl Into<String>) -> Self {
        Self {
            env_tag: env_tag.into(),
            depth: 0,
        }
    }

    /// Context for a file included from the current one.
    pub fn descend(&self) -> Self {
        Self {
            env_tag: self.env_tag.clone(),
            depth: self.depth + 1,
        }
    }
}

/// Load a discovered source using its recorded format.
pub fn load_source(source: &SourceDescriptor, ctx: &LoadContext) -> Result<Option<ConfigTree>> {
    load_with_format(
        &source.location,
        source.format,
        source.ignore_missing(),
        ctx,
    )
}

/// Load a file, choosing the format from its extension.
///
/// Unknown extensions are read as structured text. Returns `Ok(None)` only
/// when the file is absent and `ignore_missing` is set.
pub fn load_file(path: &Path, ignore_missing: bool, ctx: &LoadContext) -> Result<Option<ConfigTree>> {
    let format = SourceFormat::from_path(path).unwrap_or(SourceFormat::Toml);
    load_with_format(path, format, ignore_missing, ctx)
}

fn load_with_format(
    path: &Path,
    format: SourceFormat,
    ignore_missing: bool,
    ctx: &LoadContext,
) -> Result<Option<ConfigTree>> {
    if ctx.depth >= MAX_INCLUDE_DEPTH {
        return Err(ConfigError::nesting_too_deep(path, ctx.depth));
    }

    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && ignore_missing => {
            debug!("Optional config file {} not found, skipping", path.display());
            return Ok(None);
        }
        Err(e) => return Err(ConfigError::io(path, &e)),
    };
    if !metadata.is_file() {
        return Err(ConfigError::wrong_file_type(path));
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, &e))?;
    debug!(
        "Loading {} config {} (depth {})",
        format,
        path.display(),
        ctx.depth
    );
    parse_content(path, format, &content, ctx).map(Some)
}

/// Parse already-read text according to `format`.
pub fn parse_content(
    path: &Path,
    format: SourceFormat,
    content: &str,
    ctx: &LoadContext,
) -> Result<ConfigTree> {
    if !format.supports_includes() {
        return parse_plain(path, format, content);
    }

    let marked = include::mark_includes(content, base_dir(path));
    let table: toml::Table = match toml::from_str(&marked.text) {
        Ok(table) => table,
        Err(e) => {
            // Markers only break the parse when a directive sits inside a
            // multi-line value; point at the directive, not the marker
            if let Some(first) = marked.directives.first()
                && toml::from_str::<toml::Table>(content).is_ok()
            {
                return Err(include::not_at_table_level(path, first));
            }
            return Err(ConfigError::parse(path, e));
        }
    };
    let mut tree = toml_to_tree(toml::Value::Table(table));
    include::expand_includes(&mut tree, &marked.directives, path, ctx)?;
    Ok(tree)
}

/// Parse a format that has no include support.
fn parse_plain(path: &Path, format: SourceFormat, content: &str) -> Result<ConfigTree> {
    match format {
        SourceFormat::Json => serde_json::from_str(content).map_err(|e| ConfigError::parse(path, e)),
        SourceFormat::Yaml => {
            if content.trim().is_empty() {
                return Ok(empty_tree());
            }
            serde_yaml::from_str::<Value>(content).map_err(|e| ConfigError::parse(path, e))
        }
        SourceFormat::Script => script::evaluate(path, content),
        SourceFormat::Toml => {
            let table: toml::Table =
                toml::from_str(content).map_err(|e| ConfigError::parse(path, e))?;
            Ok(toml_to_tree(toml::Value::Table(table)))
        }
    }
}

/// Directory that relative includes of `path` resolve against.
fn base_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Convert a parsed TOML value into a tree. Datetimes become strings.
pub(crate) fn toml_to_tree(value: toml::Value) -> ConfigTree {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_tree).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(key, value)| (key, toml_to_tree(value)))
                .collect(),
        ),
    }
}
