//! Output formatting for resolved trees.

use crate::config::{ConfigTree, Snapshot};
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde_json::{Value, json};

/// Output format for printed configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
    Toml,
}

impl OutputFormat {
    /// Render a value in this format.
    ///
    /// TOML can only represent mappings; any other value is rendered as JSON.
    pub fn render(&self, value: &Value) -> Result<String> {
        match self {
            OutputFormat::Json => {
                serde_json::to_string_pretty(value).context("failed to render JSON")
            }
            OutputFormat::Yaml => {
                let text = serde_yaml::to_string(value).context("failed to render YAML")?;
                Ok(text.trim_end().to_string())
            }
            OutputFormat::Toml if value.is_object() => {
                let text = toml::to_string_pretty(value).context("failed to render TOML")?;
                Ok(text.trim_end().to_string())
            }
            OutputFormat::Toml => OutputFormat::Json.render(value),
        }
    }
}

/// The snapshot's tree together with where and when it was loaded.
pub fn snapshot_with_meta(snapshot: &Snapshot) -> Value {
    let sources: Vec<String> = snapshot
        .sources
        .iter()
        .map(|path| path.display().to_string())
        .collect();
    json!({
        "generation": snapshot.generation,
        "loaded_at": snapshot.loaded_at.to_rfc3339(),
        "sources": sources,
        "config": ConfigTree::clone(&snapshot.tree),
    })
}

/// Render a snapshot, optionally wrapped with its metadata.
pub fn render_snapshot(snapshot: &Snapshot, format: OutputFormat, meta: bool) -> Result<String> {
    if meta {
        format.render(&snapshot_with_meta(snapshot))
    } else {
        format.render(&snapshot.tree)
    }
}
