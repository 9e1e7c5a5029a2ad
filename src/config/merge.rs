//! Layering of source trees.
//!
//! Sources are applied in discovery order onto an empty mapping. A mapping
//! in a later layer is merged key by key into the mapping below it; any other
//! value in a later layer (scalar, sequence, null) takes the slot as-is, so
//! sequences are never concatenated and a layer can replace a whole table
//! with a scalar.

use super::tree::{ConfigTree, empty_tree};
use serde_json::Value;

/// Apply `layer` on top of `target` in place.
pub fn merge_into(target: &mut ConfigTree, layer: ConfigTree) {
    match (target, layer) {
        (Value::Object(below), Value::Object(above)) => {
            for (key, value) in above {
                match below.get_mut(&key) {
                    Some(slot) => merge_into(slot, value),
                    None => {
                        below.insert(key, value);
                    }
                }
            }
        }
        (slot, layer) => *slot = layer,
    }
}

/// `overlay` layered on top of `base`.
///
/// ```
/// use serde_json::json;
/// use layerconf::config::deep_merge;
///
/// let default = json!({"db": {"host": "localhost", "replicas": ["a", "b"]}});
/// let production = json!({"db": {"replicas": ["c"]}});
/// assert_eq!(
///     deep_merge(default, production),
///     json!({"db": {"host": "localhost", "replicas": ["c"]}})
/// );
/// ```
pub fn deep_merge(mut base: ConfigTree, overlay: ConfigTree) -> ConfigTree {
    merge_into(&mut base, overlay);
    base
}

/// Layer every tree in order onto an empty mapping.
///
/// With no trees the result is `{}`, never null.
pub fn deep_merge_all(trees: impl IntoIterator<Item = ConfigTree>) -> ConfigTree {
    let mut merged = empty_tree();
    for tree in trees {
        merge_into(&mut merged, tree);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_layers_is_empty_mapping() {
        assert_eq!(deep_merge_all(Vec::new()), json!({}));
    }

    #[test]
    fn test_default_then_environment_layer() {
        let default = json!({"server": {"port": 8080, "debug": false}, "name": "svc"});
        let production = json!({"server": {"port": 9090}});
        assert_eq!(
            deep_merge_all(vec![default, production]),
            json!({"server": {"port": 9090, "debug": false}, "name": "svc"})
        );
    }

    #[test]
    fn test_each_leaf_comes_from_last_layer_defining_it() {
        let layers = vec![
            json!({"log": {"level": "info", "file": "a.log", "rotate": true}}),
            json!({"log": {"level": "debug"}}),
            json!({"log": {"file": "c.log"}}),
        ];
        assert_eq!(
            deep_merge_all(layers),
            json!({"log": {"level": "debug", "file": "c.log", "rotate": true}})
        );
    }

    #[test]
    fn test_sequences_and_nulls_take_the_slot() {
        let mut tree = json!({"hosts": ["a", "b"], "token": "secret", "pool": {"size": 4}});
        merge_into(
            &mut tree,
            json!({"hosts": ["c"], "token": null, "pool": {"size": null}}),
        );
        assert_eq!(
            tree,
            json!({"hosts": ["c"], "token": null, "pool": {"size": null}})
        );
    }

    #[test]
    fn test_shape_changes_between_layers() {
        let mut tree = json!({"cache": {"ttl": 60}, "limit": 10});
        merge_into(&mut tree, json!({"cache": false, "limit": {"soft": 5}}));
        assert_eq!(tree, json!({"cache": false, "limit": {"soft": 5}}));
    }

    #[test]
    fn test_layer_does_not_touch_its_input() {
        let base = json!({"a": {"b": 1}});
        let merged = deep_merge(base.clone(), json!({"a": {"c": 2}}));
        assert_eq!(merged, json!({"a": {"b": 1, "c": 2}}));
        assert_eq!(base, json!({"a": {"b": 1}}));
    }
}
