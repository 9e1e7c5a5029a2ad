//! Sandboxed evaluation of config-as-code files.
//!
//! Scripts are [rhai](https://rhai.rs) programs run in a fresh engine with a
//! minimal scope:
//!
//! - `exports`: an empty object map the script fills in
//! - `__filename`, `__dirname`: constants naming the script's own location
//!
//! Module imports and `eval` are unavailable, and operation count, call depth
//! and expression depth are bounded. Nothing from the loader is visible to the
//! script. A non-unit final value replaces `exports` as the result.
//!
//! ```rhai
//! exports.server = #{ port: 8080, root: __dirname + "/www" };
//! ```

use super::tree::{ConfigTree, empty_tree};
use crate::error::{ConfigError, Result};
use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Dynamic, Engine, Map, Scope};
use std::path::Path;
use tracing::{debug, info};

const MAX_OPERATIONS: u64 = 1_000_000;
const MAX_CALL_LEVELS: usize = 32;
const MAX_EXPR_DEPTH: usize = 64;

/// Build an engine with no ambient capabilities.
fn sandboxed_engine(path: &Path) -> Engine {
    let mut engine = Engine::new();
    engine.set_module_resolver(DummyModuleResolver::new());
    engine.disable_symbol("eval");
    engine.set_max_operations(MAX_OPERATIONS);
    engine.set_max_call_levels(MAX_CALL_LEVELS);
    engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_EXPR_DEPTH);

    let origin = path.display().to_string();
    engine.on_print(move |text| info!(script = %origin, "{}", text));
    let origin = path.display().to_string();
    engine.on_debug(move |text, _source, pos| debug!(script = %origin, "{} {}", pos, text));
    engine
}

/// Run a script and convert its exported value into a tree.
pub fn evaluate(path: &Path, source: &str) -> Result<ConfigTree> {
    let engine = sandboxed_engine(path);
    let ast = engine
        .compile(source)
        .map_err(|e| ConfigError::parse(path, e))?;

    let file_name = path.display().to_string();
    let dir_name = path
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_default();

    let mut scope = Scope::new();
    scope.push("exports", Map::new());
    scope.push_constant("__filename", file_name);
    scope.push_constant("__dirname", dir_name);

    let value: Dynamic = engine
        .eval_ast_with_scope(&mut scope, &ast)
        .map_err(|e| ConfigError::isolation(path, e))?;

    let exported = if value.is_unit() {
        scope
            .get_value::<Dynamic>("exports")
            .unwrap_or(Dynamic::UNIT)
    } else {
        value
    };
    if exported.is_unit() {
        return Ok(empty_tree());
    }

    rhai::serde::from_dynamic::<ConfigTree>(&exported).map_err(|e| ConfigError::isolation(path, e))
}
