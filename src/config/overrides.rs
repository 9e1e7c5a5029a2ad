//! Command-line and environment overrides.
//!
//! Overrides are dotted key paths with raw string values, e.g.
//! `--server.port=9090` or `LAYERCONF__server__port=9090`. They are applied to
//! the merged tree after all files, and they can only change keys that already
//! exist. The raw string is coerced to the type of the value it replaces:
//!
//! | existing value | result |
//! |----------------|--------|
//! | number         | parsed number, or the raw string if it does not parse |
//! | boolean        | `false` for `0`, `false`, `no`, `null`, `undefined`, empty; else `true` |
//! | sequence       | raw string split on `,`, elements trimmed |
//! | mapping        | only a nested override group applies, recursively |
//! | string, null   | the raw string |

use super::tree::{ConfigTree, split_path};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Argument keys that never become overrides.
pub const RESERVED_KEYS: [&str; 3] = ["_", "config", "c"];

/// Environment variables with this prefix are overrides; `__` separates segments.
pub const ENV_OVERRIDE_PREFIX: &str = "LAYERCONF__";

/// Lower-cased raw values that coerce a boolean to `false`.
const FALSY: [&str; 6] = ["false", "null", "undefined", "no", "0", ""];

/// The value side of an override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideValue {
    /// A single raw string
    Raw(String),
    /// A flag given more than once, in order
    List(Vec<String>),
    /// Overrides grouped under a common path prefix
    Map(BTreeMap<String, OverrideValue>),
}

/// One override: a key path and its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideEntry {
    pub path: Vec<String>,
    pub value: OverrideValue,
}

impl OverrideEntry {
    /// The path joined back with dots.
    pub fn dotted(&self) -> String {
        self.path.join(".")
    }
}

/// An ordered set of overrides; for the same path, later entries win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    entries: Vec<OverrideEntry>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw override for a dotted path. Empty paths are ignored.
    pub fn insert(&mut self, path: &str, value: impl Into<String>) {
        let path = split_path(path);
        if !path.is_empty() {
            self.entries.push(OverrideEntry {
                path,
                value: OverrideValue::Raw(value.into()),
            });
        }
    }

    /// Append `other`, whose entries take precedence.
    pub fn extend(&mut self, other: Overrides) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[OverrideEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Parse override flags from command-line arguments.
    ///
    /// Accepts `--key=value`, `--key value`, `--key` (true), `--no-key`
    /// (false), `-k value` and `-abc` (each true). Positional arguments and
    /// everything after `--` are not overrides. A key given more than once
    /// collects its values in order.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();
        let mut flags: Vec<(String, String)> = Vec::new();

        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];
            let next_value = args
                .get(i + 1)
                .filter(|next| !next.starts_with('-'))
                .cloned();

            if arg == "--" {
                break;
            } else if let Some(body) = arg.strip_prefix("--") {
                if let Some((key, value)) = body.split_once('=') {
                    flags.push((key.to_string(), value.to_string()));
                } else if let Some(key) = body.strip_prefix("no-") {
                    flags.push((key.to_string(), "false".to_string()));
                } else if let Some(value) = next_value {
                    flags.push((body.to_string(), value));
                    i += 1;
                } else {
                    flags.push((body.to_string(), "true".to_string()));
                }
            } else if let Some(body) = arg.strip_prefix('-')
                && !body.is_empty()
                && body.parse::<f64>().is_err()
            {
                if let Some((key, value)) = body.split_once('=') {
                    flags.push((key.to_string(), value.to_string()));
                } else if let Some((last, rest)) = body.chars().collect::<Vec<_>>().split_last() {
                    for letter in rest {
                        flags.push((letter.to_string(), "true".to_string()));
                    }
                    if let Some(value) = next_value {
                        flags.push((last.to_string(), value));
                        i += 1;
                    } else {
                        flags.push((last.to_string(), "true".to_string()));
                    }
                }
            }
            // Anything else is positional
            i += 1;
        }

        let mut overrides = Overrides::new();
        for (key, value) in flags {
            // `--config.x` is still the reserved `config` flag
            let path = split_path(&key);
            match path.first() {
                None => continue,
                Some(root) if RESERVED_KEYS.contains(&root.as_str()) => continue,
                Some(_) => {}
            }
            overrides.push_accumulating(path, value);
        }
        overrides
    }

    /// Parse overrides from `LAYERCONF__a__b=value` environment variables.
    ///
    /// Variables are taken in name order so the result does not depend on the
    /// environment's iteration order.
    pub fn from_env_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut matching: Vec<(Vec<String>, String)> = vars
            .into_iter()
            .filter_map(|(name, value)| {
                let rest = name.strip_prefix(ENV_OVERRIDE_PREFIX)?;
                let path: Vec<String> = rest
                    .split("__")
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_string)
                    .collect();
                (!path.is_empty()).then_some((path, value))
            })
            .collect();
        matching.sort();

        let mut overrides = Overrides::new();
        for (path, value) in matching {
            overrides.entries.push(OverrideEntry {
                path,
                value: OverrideValue::Raw(value),
            });
        }
        overrides
    }

    fn push_accumulating(&mut self, path: Vec<String>, value: String) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.path == path) {
            entry.value = match std::mem::replace(&mut entry.value, OverrideValue::List(Vec::new())) {
                OverrideValue::Raw(first) => OverrideValue::List(vec![first, value]),
                OverrideValue::List(mut items) => {
                    items.push(value);
                    OverrideValue::List(items)
                }
                OverrideValue::Map(_) => OverrideValue::Raw(value),
            };
            return;
        }
        self.entries.push(OverrideEntry {
            path,
            value: OverrideValue::Raw(value),
        });
    }

    /// Group entries by path prefix into nested maps; later entries win.
    pub fn grouped(&self) -> BTreeMap<String, OverrideValue> {
        let mut root: BTreeMap<String, OverrideValue> = BTreeMap::new();
        for entry in &self.entries {
            let Some((leaf, parents)) = entry.path.split_last() else {
                continue;
            };
            let mut level = &mut root;
            for segment in parents {
                let slot = level
                    .entry(segment.clone())
                    .or_insert_with(|| OverrideValue::Map(BTreeMap::new()));
                if !matches!(slot, OverrideValue::Map(_)) {
                    *slot = OverrideValue::Map(BTreeMap::new());
                }
                let OverrideValue::Map(next) = slot else {
                    unreachable!("slot was just made a map");
                };
                level = next;
            }
            level.insert(leaf.clone(), entry.value.clone());
        }
        root
    }
}

/// Apply overrides to `tree` in place and return how many leaves changed.
///
/// Overrides whose path does not exist in the tree, or that would have to walk
/// through a non-mapping, are dropped.
pub fn apply_overrides(tree: &mut ConfigTree, overrides: &Overrides) -> usize {
    if overrides.is_empty() {
        return 0;
    }
    let Value::Object(root) = tree else {
        debug!("Configuration root is not a mapping; overrides dropped");
        return 0;
    };
    let mut applied = 0;
    apply_group(root, &overrides.grouped(), "", &mut applied);
    debug!("Applied {} of {} override(s)", applied, overrides.len());
    applied
}

fn apply_group(
    node: &mut Map<String, Value>,
    group: &BTreeMap<String, OverrideValue>,
    prefix: &str,
    applied: &mut usize,
) {
    for (key, value) in group {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        let Some(existing) = node.get_mut(key) else {
            debug!("Override {} does not name an existing key; dropped", path);
            continue;
        };

        match (existing, value) {
            (Value::Object(children), OverrideValue::Map(nested)) => {
                apply_group(children, nested, &path, applied);
            }
            (existing, value) => match coerce(existing, value) {
                Some(coerced) => {
                    if existing.is_number() && coerced.is_string() {
                        warn!(
                            "Override {} is not a number; replacing numeric value with a string",
                            path
                        );
                    }
                    *existing = coerced;
                    *applied += 1;
                }
                None => {
                    debug!("Override {} does not fit the shape of the existing value; dropped", path);
                }
            },
        }
    }
}

/// Coerce an override to the variant of the value it replaces.
///
/// Returns `None` when the override cannot apply: a mapping can only take a
/// nested group, and a nested group only applies to a mapping.
pub fn coerce(existing: &Value, value: &OverrideValue) -> Option<Value> {
    match (existing, value) {
        (_, OverrideValue::Map(_)) => None,
        (Value::Array(_), OverrideValue::List(items)) => Some(Value::Array(
            items.iter().cloned().map(Value::String).collect(),
        )),
        (_, OverrideValue::List(items)) => coerce_raw(existing, items.last()?),
        (_, OverrideValue::Raw(raw)) => coerce_raw(existing, raw),
    }
}

/// Coerce one raw string by the existing value's variant.
pub fn coerce_raw(existing: &Value, raw: &str) -> Option<Value> {
    match existing {
        Value::Number(current) => {
            Some(coerce_number(current, raw).unwrap_or_else(|| Value::String(raw.to_string())))
        }
        Value::Bool(_) => Some(Value::Bool(coerce_bool(raw))),
        Value::Array(_) => Some(split_list(raw)),
        Value::String(_) | Value::Null => Some(Value::String(raw.to_string())),
        Value::Object(_) => None,
    }
}

/// Parse `raw` as a number, keeping integers integral when `current` is one.
///
/// Accepts what [`parse_numeric`] accepts; infinities do not fit a tree and
/// are rejected.
pub fn coerce_number(current: &Number, raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if !current.is_f64() {
        if let Ok(i) = trimmed.parse::<i64>() {
            return Some(Value::from(i));
        }
        if let Ok(u) = trimmed.parse::<u64>() {
            return Some(Value::from(u));
        }
    }
    let n = parse_numeric(trimmed).filter(|f| f.is_finite())?;
    if !current.is_f64() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Some(Value::from(n as i64));
    }
    Some(Value::from(n))
}

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Read a raw string as a number the way a loosely typed command line does.
///
/// Blank text is zero, `0x`/`0o`/`0b` prefixes select a radix, and
/// `Infinity` is accepted with an optional sign. Anything else must be a
/// plain decimal literal.
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return Some(0.0);
    }
    match s {
        "Infinity" | "+Infinity" => return Some(f64::INFINITY),
        "-Infinity" => return Some(f64::NEG_INFINITY),
        _ => {}
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = s.strip_prefix(prefix) {
            if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
                return None;
            }
            return u64::from_str_radix(digits, radix).ok().map(|n| n as f64);
        }
    }
    // Rust also reads "inf" and "NaN"; those stay strings
    if s.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return None;
    }
    s.parse::<f64>().ok()
}

/// Interpret a raw string as a boolean.
///
/// Numeric strings (see [`parse_numeric`]) are false only when zero; other
/// strings are false only when they are in the falsy set, compared
/// case-insensitively.
pub fn coerce_bool(raw: &str) -> bool {
    if let Some(n) = parse_numeric(raw) {
        return n != 0.0;
    }
    !FALSY.contains(&raw.trim().to_lowercase().as_str())
}

/// Split a comma-separated raw string into a sequence of trimmed strings.
pub fn split_list(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Array(Vec::new());
    }
    Value::Array(
        raw.split(',')
            .map(|item| Value::String(item.trim().to_string()))
            .collect(),
    )
}
