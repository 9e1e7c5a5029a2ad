//! Layered configuration resolution.
//!
//! A resolution pass turns a directory of config files into one tree:
//! 1. **Discover** - `default.*` then `<env>.*` in the config directory, plus
//!    an optional explicit file loaded last
//! 2. **Load** - each file is parsed by its extension (TOML, JSON, YAML or a
//!    sandboxed script); TOML files may pull in other files with
//!    `# @include "path"`
//! 3. **Merge** - mappings merge recursively, everything else is replaced
//! 4. **Override** - `LAYERCONF__a__b` variables, then command-line flags,
//!    rewrite values that already exist in the tree
//!
//! [`ConfigService`] publishes the result and re-runs the pass on reload.
//!
//! ## Environment Variables
//! - `LAYERCONF_DIR` - Config directory (default: `./config`)
//! - `LAYERCONF_ENV` - Environment tag (default: `development`)
//! - `LAYERCONF_FILE` - Explicit config file, loaded last
//! - `LAYERCONF_DISABLE` - Any truthy value disables resolution entirely
//! - `LAYERCONF__<path>` - Override for an existing value, `__` separates keys

mod discover;
mod include;
mod loader;
mod merge;
mod overrides;
mod publisher;
mod resolver;
mod script;
mod settings;
mod tree;
mod watcher;

pub use discover::{SourceDescriptor, SourceFormat, SourceOrigin, discover_sources};
pub use include::{ENV_PLACEHOLDER, MAX_INCLUDE_DEPTH};
pub use loader::{LoadContext, load_file, load_source, parse_content};
pub use merge::{deep_merge, deep_merge_all, merge_into};
pub use overrides::{
    ENV_OVERRIDE_PREFIX, OverrideEntry, OverrideValue, Overrides, RESERVED_KEYS, apply_overrides,
    coerce_bool, parse_numeric,
};
pub use publisher::{ConfigService, Snapshot, SubscriptionId};
pub use resolver::{Resolution, Resolver};
pub use settings::{
    DEFAULT_CONFIG_DIR, DEFAULT_ENV_TAG, DIR_VAR, DISABLE_VAR, ENV_VAR, FILE_VAR,
    ResolverSettings, normalize_env_tag,
};
pub use tree::{ConfigTree, empty_tree, get_path, split_path};
pub use watcher::{
    ConfigWatcherHandle, ReloadQueue, ReloadTrigger, ReloadWorker, WatcherConfig, reload_queue,
    spawn_signal_listener, start_config_watcher,
};
