//! Source discovery in the configuration directory.
//!
//! A directory contributes at most the `default.<ext>` and `<env>.<ext>` files,
//! with every default-named file ahead of every environment-named one. The
//! explicit file, when given, is appended last.

use std::path::{Path, PathBuf};
use tracing::debug;

/// File formats understood by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    /// Structured text with `# @include` support
    Toml,
    Json,
    Yaml,
    /// Sandboxed rhai script
    Script,
}

impl SourceFormat {
    /// Map a file extension to a format, case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "toml" => Some(SourceFormat::Toml),
            "json" => Some(SourceFormat::Json),
            "yaml" | "yml" => Some(SourceFormat::Yaml),
            "rhai" => Some(SourceFormat::Script),
            _ => None,
        }
    }

    /// Format of a path, if its extension is supported.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Whether include directives are honoured for this format.
    pub fn supports_includes(&self) -> bool {
        matches!(self, SourceFormat::Toml)
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFormat::Toml => write!(f, "toml"),
            SourceFormat::Json => write!(f, "json"),
            SourceFormat::Yaml => write!(f, "yaml"),
            SourceFormat::Script => write!(f, "script"),
        }
    }
}

/// Where a source came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOrigin {
    /// Found by scanning the config directory
    Directory,
    /// Named by `--config` or `LAYERCONF_FILE`
    Explicit,
}

/// One source to load, in merge order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub location: PathBuf,
    pub format: SourceFormat,
    /// Position in the merge order; higher wins.
    pub priority: usize,
    pub is_default: bool,
    pub origin: SourceOrigin,
}

impl SourceDescriptor {
    /// Directory sources may be absent; the explicit file may not.
    pub fn ignore_missing(&self) -> bool {
        self.origin == SourceOrigin::Directory
    }
}

/// Produce the ordered list of sources for one resolution pass.
///
/// A directory that cannot be listed yields no directory sources.
pub fn discover_sources(
    dir: &Path,
    env_tag: &str,
    explicit: Option<&Path>,
) -> Vec<SourceDescriptor> {
    let mut found: Vec<(bool, PathBuf, SourceFormat)> = Vec::new();

    match std::fs::read_dir(dir) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let path = entry.path();
                let Some(format) = SourceFormat::from_path(&path) else {
                    continue;
                };
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let stem = stem.to_ascii_lowercase();
                if stem == "default" {
                    found.push((true, path, format));
                } else if stem == env_tag {
                    found.push((false, path, format));
                }
            }
        }
        Err(e) => {
            debug!("Config directory {} not listed: {}", dir.display(), e);
        }
    }

    // Defaults first, then by path
    found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let mut sources: Vec<SourceDescriptor> = found
        .into_iter()
        .enumerate()
        .map(|(priority, (is_default, location, format))| SourceDescriptor {
            location,
            format,
            priority,
            is_default,
            origin: SourceOrigin::Directory,
        })
        .collect();

    if let Some(path) = explicit {
        sources.push(SourceDescriptor {
            location: path.to_path_buf(),
            format: SourceFormat::from_path(path).unwrap_or(SourceFormat::Toml),
            priority: sources.len(),
            is_default: false,
            origin: SourceOrigin::Explicit,
        });
    }

    debug!(
        "Discovered {} config source(s) in {}",
        sources.len(),
        dir.display()
    );
    sources
}
