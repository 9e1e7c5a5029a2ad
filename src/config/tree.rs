//! The untyped configuration tree and path helpers.

use serde_json::{Map, Value};

/// A resolved configuration tree: scalars, sequences, and string-keyed mappings.
pub type ConfigTree = Value;

/// An empty mapping, the starting point of every merge.
pub fn empty_tree() -> ConfigTree {
    Value::Object(Map::new())
}

/// Split a dotted key path into segments.
///
/// Runs of dots collapse and leading/trailing dots are dropped, so
/// `"..server..port."` names the same path as `"server.port"`.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('.')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Look up a dotted path, descending only through mappings.
///
/// An empty path returns the whole tree.
pub fn get_path<'a>(tree: &'a ConfigTree, path: &str) -> Option<&'a ConfigTree> {
    split_path(path)
        .iter()
        .try_fold(tree, |node, segment| node.as_object()?.get(segment))
}
