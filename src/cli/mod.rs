//! CLI command definitions for layerconf
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.
//!
//! Configuration overrides are not declared as flags. Anything after the
//! subcommand's own options is collected verbatim and handed to
//! [`Overrides::from_args`](crate::config::Overrides::from_args), so
//! `layerconf show --server.port=9090 --no-debug` works for any key. The
//! subcommand's own options must come first: once the first override is
//! seen, every later argument is taken as part of the overrides, so
//! `show --a.b 1 --format yaml` reads `--format yaml` as an override too.

use crate::format::OutputFormat;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Resolve layered configuration and print it
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Explicit config file, loaded after the directory sources
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Config directory (overrides LAYERCONF_DIR)
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    /// Environment tag (overrides LAYERCONF_ENV)
    #[arg(long, global = true)]
    pub env: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the resolved configuration (default if no subcommand given)
    Show(ShowArgs),

    /// Print the value at a dotted path
    Get(GetArgs),

    /// Print the configuration, then again after every reload
    Watch(WatchArgs),
}

impl Default for Command {
    fn default() -> Self {
        Command::Show(ShowArgs::default())
    }
}

impl Command {
    /// Raw override arguments given to the subcommand.
    pub fn overrides(&self) -> &[String] {
        match self {
            Command::Show(args) => &args.overrides,
            Command::Get(args) => &args.overrides,
            Command::Watch(args) => &args.overrides,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ShowArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,

    /// Include generation, load time and source files
    #[arg(long)]
    pub meta: bool,

    /// Overrides such as --server.port=9090. Must come after this command's
    /// own options, since everything from the first override on is an override
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "OVERRIDES")]
    pub overrides: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct GetArgs {
    /// Dotted path, e.g. server.port
    pub path: String,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,

    /// Overrides such as --server.port=9090. Must come after this command's
    /// own options, since everything from the first override on is an override
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "OVERRIDES")]
    pub overrides: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Also reload when files in the config directory change
    #[arg(long)]
    pub files: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,

    /// Overrides such as --server.port=9090. Must come after this command's
    /// own options, since everything from the first override on is an override
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "OVERRIDES")]
    pub overrides: Vec<String>,
}
