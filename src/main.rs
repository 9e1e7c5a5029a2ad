//! layerconf
//!
//! Resolves a layered configuration directory and prints the result, once or
//! on every reload.

use anyhow::Result;
use clap::Parser;
use layerconf::cli::{Cli, Command};
use layerconf::config::{
    ConfigService, Overrides, Resolver, ResolverSettings, WatcherConfig, reload_queue,
    spawn_signal_listener, start_config_watcher,
};
use layerconf::error::ConfigError;
use layerconf::format::{OutputFormat, render_snapshot};
use layerconf::logging::{LogTarget, init_logging};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Report a configuration error and exit. No partial configuration is
/// ever printed after one.
fn fail(err: ConfigError) -> ! {
    eprintln!("{err}");
    std::process::exit(1);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&LogTarget::parse(&cli.log), cli.verbose)?;

    let command = cli.command.clone().unwrap_or_default();

    // CLI flags win over LAYERCONF_* variables
    let mut settings = ResolverSettings::from_env();
    if let Some(dir) = &cli.dir {
        settings.config_dir = dir.clone();
    }
    if let Some(env) = &cli.env {
        settings = settings.env_tag(env);
    }
    if let Some(file) = &cli.config {
        settings = settings.explicit_file(file);
    }

    // Command-line overrides are applied after environment overrides
    let mut overrides = Overrides::from_env_vars(std::env::vars());
    overrides.extend(Overrides::from_args(command.overrides()));

    let service = ConfigService::new(Resolver::new(settings, overrides)).unwrap_or_else(|e| fail(e));

    match command {
        Command::Show(args) => {
            println!("{}", render_snapshot(&service.snapshot(), args.format, args.meta)?);
        }
        Command::Get(args) => match service.get(&args.path) {
            Some(value) => println!("{}", args.format.render(&value)?),
            None => {
                eprintln!("{}: not set", args.path);
                std::process::exit(2);
            }
        },
        Command::Watch(args) => watch(service, args.format, args.files).await?,
    }

    Ok(())
}

/// Print the configuration, then reprint it after every reload until Ctrl-C.
async fn watch(service: Arc<ConfigService>, format: OutputFormat, files: bool) -> Result<()> {
    println!("{}", render_snapshot(&service.snapshot(), format, true)?);

    service.on_reload(move |snapshot| match render_snapshot(snapshot, format, true) {
        Ok(text) => println!("{text}"),
        Err(e) => error!("Failed to render configuration: {}", e),
    });

    let (queue, worker) = reload_queue();
    let _signal_listener = spawn_signal_listener(queue.clone())?;

    let _file_watcher = if files {
        let config_dir = &service.resolver().settings().config_dir;
        match start_config_watcher(config_dir, WatcherConfig::default(), queue.clone()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(
                    "Failed to watch config directory {}: {}",
                    config_dir.display(),
                    e
                );
                None
            }
        }
    } else {
        None
    };

    tokio::select! {
        result = worker.run(Arc::clone(&service)) => {
            if let Err(e) = result {
                fail(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, exiting");
        }
    }

    drop(queue);
    Ok(())
}
