//! Include directives for structured-text config files.
//!
//! A line of the form
//!
//! ```toml
//! # @include "path/to/file.toml"
//! ```
//!
//! splices the parsed content of another file into the table that is open at
//! that point. Expansion happens in two steps:
//!
//! 1. [`mark_includes`] rewrites each directive line into a uniquely keyed
//!    marker entry, so the parser places it in the enclosing table.
//! 2. [`expand_includes`] walks the parsed tree, removes the markers and
//!    splices in the included trees.
//!
//! Paths are relative to the including file, `{env}` is replaced by the
//! environment tag, and `*`, `?` or `[` make the path a glob. Included files
//! go through the regular file loader one level deeper; loading at depth
//! [`MAX_INCLUDE_DEPTH`] fails, which is what stops include cycles.

use super::loader::{LoadContext, load_file};
use super::tree::ConfigTree;
use crate::error::{ConfigError, Result};
use regex_lite::{Captures, Regex};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Loads at this depth or deeper fail with a nesting error.
pub const MAX_INCLUDE_DEPTH: usize = 100;

/// Placeholder replaced by the environment tag in include paths.
pub const ENV_PLACEHOLDER: &str = "{env}";

const MARKER_PREFIX: &str = "@include:";

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*#[ \t]*@include[ \t]+"([^"]*)"[ \t]*\r?$"#)
        .expect("include directive pattern is valid")
});

/// An include found in one file, pending resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDirective {
    /// Directory of the including file
    pub base_dir: PathBuf,
    /// Target as written, possibly with wildcards and `{env}`
    pub pattern: String,
    /// 1-based line of the directive
    pub line: usize,
}

/// Text with directives replaced by markers, plus the directive side table.
#[derive(Debug, Clone)]
pub struct MarkedText {
    pub text: String,
    pub directives: Vec<IncludeDirective>,
}

/// Replace every directive line with a marker entry.
///
/// The marker for the n-th directive is `"@include:n" = n`.
pub fn mark_includes(text: &str, base_dir: &Path) -> MarkedText {
    let mut directives = Vec::new();
    let marked = DIRECTIVE.replace_all(text, |caps: &Captures| {
        let index = directives.len();
        let start = caps.get(0).map_or(0, |m| m.start());
        directives.push(IncludeDirective {
            base_dir: base_dir.to_path_buf(),
            pattern: caps[1].to_string(),
            line: text[..start].matches('\n').count() + 1,
        });
        format!("\"{}{}\" = {}", MARKER_PREFIX, index, index)
    });

    MarkedText {
        text: marked.into_owned(),
        directives,
    }
}

impl IncludeDirective {
    /// Resolve the directive to the files it names.
    ///
    /// A plain path yields itself whether or not it exists; the loader reports
    /// a missing file. A glob yields its matches in sorted order, each of which
    /// must be a regular file.
    pub fn resolve_paths(&self, env_tag: &str, origin: &Path) -> Result<Vec<PathBuf>> {
        let target = self.pattern.replace(ENV_PLACEHOLDER, env_tag);

        if !has_wildcard(&target) {
            return Ok(vec![self.base_dir.join(&target)]);
        }

        let pattern = if Path::new(&target).is_absolute() {
            target.clone()
        } else {
            let base = glob::Pattern::escape(&self.base_dir.to_string_lossy());
            Path::new(&base).join(&target).to_string_lossy().into_owned()
        };

        let entries = glob::glob(&pattern).map_err(|e| {
            ConfigError::parse(
                origin,
                format!("line {}: invalid include pattern \"{}\": {}", self.line, target, e),
            )
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| ConfigError::io(e.path(), e.error()))?;
            if !path.is_file() {
                return Err(ConfigError::wrong_file_type(&path));
            }
            paths.push(path);
        }
        paths.sort();

        debug!(
            "Include \"{}\" in {} matched {} file(s)",
            target,
            origin.display(),
            paths.len()
        );
        Ok(paths)
    }
}

fn has_wildcard(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

fn marker_index(key: &str) -> Option<usize> {
    key.strip_prefix(MARKER_PREFIX)?.parse().ok()
}

/// Resolve all markers left in `tree` by [`mark_includes`].
///
/// `origin` is the file the tree was parsed from.
pub fn expand_includes(
    tree: &mut ConfigTree,
    directives: &[IncludeDirective],
    origin: &Path,
    ctx: &LoadContext,
) -> Result<()> {
    if directives.is_empty() {
        return Ok(());
    }
    let mut consumed = vec![false; directives.len()];
    expand_node(tree, directives, &mut consumed, origin, ctx)?;

    // A directive whose marker never reached a table sat inside a string or
    // an inline value
    if let Some(missed) = consumed
        .iter()
        .position(|seen| !seen)
        .and_then(|index| directives.get(index))
    {
        return Err(not_at_table_level(origin, missed));
    }
    Ok(())
}

/// Error for a directive that was written where no table entry can go.
pub(crate) fn not_at_table_level(origin: &Path, directive: &IncludeDirective) -> ConfigError {
    ConfigError::parse(
        origin,
        format!(
            "line {}: include directive is not at table level",
            directive.line
        ),
    )
}

fn expand_node(
    node: &mut ConfigTree,
    directives: &[IncludeDirective],
    consumed: &mut [bool],
    origin: &Path,
    ctx: &LoadContext,
) -> Result<()> {
    // Children first, so markers only ever come from this file
    let pending = match node {
        Value::Array(items) => {
            for item in items.iter_mut() {
                expand_node(item, directives, consumed, origin, ctx)?;
            }
            return Ok(());
        }
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if marker_index(key).is_none() {
                    expand_node(child, directives, consumed, origin, ctx)?;
                }
            }

            let mut markers: Vec<(usize, String)> = map
                .keys()
                .filter_map(|key| marker_index(key).map(|index| (index, key.clone())))
                .collect();
            markers.sort();
            for (_, key) in &markers {
                map.remove(key);
            }
            markers
        }
        _ => return Ok(()),
    };

    for (index, _) in pending {
        let Some(directive) = directives.get(index) else {
            continue;
        };
        if let Some(seen) = consumed.get_mut(index) {
            *seen = true;
        }
        for path in directive.resolve_paths(&ctx.env_tag, origin)? {
            if let Some(included) = load_file(&path, false, &ctx.descend())? {
                splice(node, included, &path, origin);
            }
        }
    }
    Ok(())
}

/// Merge one included tree into the including node.
fn splice(node: &mut ConfigTree, included: ConfigTree, from: &Path, origin: &Path) {
    match (node, included) {
        (Value::Object(map), Value::Object(entries)) => {
            for (key, value) in entries {
                map.insert(key, value);
            }
        }
        (node, Value::Array(items)) if node.as_object().is_some_and(|m| m.is_empty()) => {
            *node = Value::Array(items);
        }
        (_, included) => {
            let shape = match included {
                Value::Array(_) => "a sequence into a non-empty node",
                Value::Object(_) => "a mapping into a sequence",
                _ => "a scalar",
            };
            warn!(
                "Include of {} from {} splices {}; ignored",
                from.display(),
                origin.display(),
                shape
            );
        }
    }
}
